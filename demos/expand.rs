//! Decompresses the input from stdin and writes the result to stdout.

use std::io::{self, BufWriter};

fn main() {
    match (|| -> io::Result<()> {
        let policy = match std::env::args().nth(1) {
            Some(token) => token
                .parse()
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, &*format!("{}", err)))?,
            None => alzw::Policy::Freeze,
        };
        let mut decoder = alzw::decode::Decoder::new(policy);
        let stdout = io::stdout();
        let stdout = BufWriter::new(stdout.lock());
        let stdin = io::stdin();
        let stdin = stdin.lock();
        decoder.into_stream(stdout).decode_all(stdin).status?;
        Ok(())
    })() {
        Ok(()) => (),
        Err(err) => eprintln!("{}", err),
    }
}
