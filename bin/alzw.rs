#![forbid(unsafe_code)]
use std::path::{Path, PathBuf};
use std::{env, ffi, fs, io, process};

use alzw::{decode, encode, Policy};

fn main() -> CodingResult {
    CodingResult::catch_panic(|| {
        env_logger::init();
        let flags = Flags::from_args(env::args_os()).unwrap_or_else(|ParamError| explain());
        run_coding(flags)
    })
}

fn run_coding(flags: Flags) -> Result<(), io::Error> {
    let out = io::stdout();
    let out = out.lock();

    match flags.operation {
        Operation::Compress => {
            let policy = flags.policy.ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "compressing requires a codebook policy (-p n|r|m)",
                )
            })?;
            // Persist the choice for the later expand invocation before any
            // input is consumed.
            fs::write(&flags.policy_file, policy.token())?;

            let mut encoder = encode::Encoder::new(policy);
            match flags.input {
                Input::File(file) => {
                    let data = fs::File::open(file)?;
                    let file = io::BufReader::with_capacity(1 << 20, data);
                    encoder.into_stream(out).encode_all(file).status
                }
                Input::Stdin => {
                    let input = io::BufReader::with_capacity(1 << 20, io::stdin());
                    encoder.into_stream(out).encode_all(input).status
                }
            }
        }
        Operation::Expand => {
            let policy = match flags.policy {
                Some(policy) => policy,
                None => read_policy_file(&flags.policy_file)?,
            };

            let mut decoder = decode::Decoder::new(policy);
            match flags.input {
                Input::File(file) => {
                    let data = fs::File::open(file)?;
                    let file = io::BufReader::with_capacity(1 << 20, data);
                    decoder.into_stream(out).decode_all(file).status
                }
                Input::Stdin => {
                    let input = io::BufReader::with_capacity(1 << 20, io::stdin());
                    decoder.into_stream(out).decode_all(input).status
                }
            }
        }
    }
}

fn read_policy_file(path: &Path) -> Result<Policy, io::Error> {
    let token = fs::read_to_string(path)?;
    token
        .trim()
        .parse()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, &*format!("{}", err)))
}

struct Flags {
    input: Input,
    operation: Operation,
    policy: Option<Policy>,
    policy_file: PathBuf,
}

struct ParamError;

#[derive(Debug)]
enum Input {
    File(PathBuf),
    Stdin,
}

#[derive(Debug)]
enum Operation {
    Compress,
    Expand,
}

fn explain<T>() -> T {
    println!(
        "Usage: alzw [-c|-x] [-p n|r|m] [-f <path>] <file>\n\
        Arguments:\n\
        -c\t operation compress\n\
        -x\t operation expand\n\
        -p\t codebook policy: n (freeze), r (reset), m (monitor)\n\
        -f\t policy sidecar file (default: lzw.policy)\n\
        <file>\tfilepath or '-' for stdin"
    );
    process::exit(1);
}

fn command() -> clap::Command<'static> {
    clap::Command::new("alzw")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Compress and expand adaptive LZW streams")
        .arg(
            clap::Arg::new("compress")
                .short('c')
                .long("--compress")
                .takes_value(false),
        )
        .arg(
            clap::Arg::new("expand")
                .short('x')
                .long("--expand")
                .takes_value(false),
        )
        .group(
            clap::ArgGroup::new("operation")
                .args(&["compress", "expand"])
                .multiple(false)
                .required(true),
        )
        .arg(
            clap::Arg::new("policy")
                .short('p')
                .long("--policy")
                .takes_value(true)
                .value_parser(["n", "r", "m"]),
        )
        .arg(
            clap::Arg::new("policy_file")
                .short('f')
                .long("--policy-file")
                .takes_value(true)
                .default_value("lzw.policy")
                .value_parser(clap::builder::ValueParser::path_buf()),
        )
        .arg(
            clap::Arg::new("file")
                .default_value("-")
                .value_parser(clap::builder::ValueParser::path_buf()),
        )
}

impl Flags {
    fn from_args(mut args: impl Iterator<Item = ffi::OsString>) -> Result<Self, ParamError> {
        let matches = command().get_matches_from(args.by_ref());

        let operation = if matches.contains_id("expand") {
            Operation::Expand
        } else {
            Operation::Compress
        };

        let policy = match matches.get_one::<String>("policy").map(String::as_str) {
            Some("n") => Some(Policy::Freeze),
            Some("r") => Some(Policy::Reset),
            Some("m") => Some(Policy::Monitor),
            Some(_) => unreachable!("unparsed policy token"),
            None => None,
        };

        let policy_file = matches
            .get_one::<PathBuf>("policy_file")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("lzw.policy"));

        let input = match matches.get_one::<PathBuf>("file") {
            None => Input::Stdin,
            Some(p) if *p == PathBuf::from("-") => Input::Stdin,
            Some(p) => Input::File(p.clone()),
        };

        Ok(Flags {
            input,
            operation,
            policy,
            policy_file,
        })
    }
}

enum CodingResult {
    Ok,
    Err(io::Error),
    Panic,
}

impl CodingResult {
    fn catch_panic(op: fn() -> Result<(), io::Error>) -> Self {
        std::panic::catch_unwind(|| match op() {
            Ok(()) => CodingResult::Ok,
            Err(err) => CodingResult::Err(err),
        })
        .unwrap_or(CodingResult::Panic)
    }
}

impl std::process::Termination for CodingResult {
    fn report(self) -> std::process::ExitCode {
        match self {
            CodingResult::Ok => std::process::ExitCode::SUCCESS,
            CodingResult::Err(err) => {
                eprintln!("{}", err);
                std::process::ExitCode::FAILURE
            }
            CodingResult::Panic => {
                eprintln!(
                    "The process failed irrecoverably! This should never happen and is a bug."
                );
                std::process::ExitCode::from(128)
            }
        }
    }
}
