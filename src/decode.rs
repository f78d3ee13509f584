//! A module for all decoding needs.
use crate::policy::{Policy, RatioTrend};
use crate::{Code, EOF_CODE, MAX_CODESIZE, MAX_ENTRIES, MIN_CODESIZE};

use log::info;
use std::io::{self, BufRead, Write};

/// The decoding engine, reconstructing bytes from a code stream.
///
/// Must be constructed with the same [`Policy`] the stream was encoded with;
/// the codebooks silently diverge otherwise.
pub struct Decoder {
    state: Box<DecodeState>,
}

/// A decoding stream sink.
///
/// See [`Decoder::into_stream`] on how to create this type.
///
/// [`Decoder::into_stream`]: struct.Decoder.html#method.into_stream
pub struct IntoStream<'d, W> {
    decoder: &'d mut Decoder,
    writer: W,
}

/// One codebook entry: its predecessor code and the appended byte.
#[derive(Clone)]
struct Link {
    prev: Code,
    byte: u8,
}

struct DecodeState {
    /// The table of decoded codes.
    table: Table,

    /// The buffer of decoded data.
    buffer: Buffer,

    /// The code the previous string was resolved from, if any.
    last: Option<Code>,

    /// The saturation policy for this run.
    policy: Policy,

    /// Ratio bookkeeping, mirrored with the encoder.
    trend: RatioTrend,

    /// The current code size.
    code_size: u8,

    has_ended: bool,

    bit_buffer: u64,
    bits: u8,
}

struct Buffer {
    bytes: Box<[u8]>,
    read_mark: usize,
    write_mark: usize,
}

struct Table {
    inner: Vec<Link>,
    depths: Vec<u16>,
}

pub struct StreamResult {
    /// The total number of bytes consumed from the input slice.
    pub consumed_in: usize,
    /// The total number of bytes written into the output slice.
    pub consumed_out: usize,
    pub status: Result<LzwStatus, LzwError>,
}

pub struct AllResult {
    /// The total number of bytes consumed from the reader.
    pub bytes_read: usize,
    /// The total number of bytes written into the writer.
    pub bytes_written: usize,
    pub status: std::io::Result<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LzwStatus {
    Ok,
    NoProgress,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LzwError {
    #[error("invalid code in compressed stream")]
    InvalidCode,
}

impl Decoder {
    pub fn new(policy: Policy) -> Self {
        Decoder {
            state: Box::new(DecodeState::new(policy)),
        }
    }

    /// Decode some bytes from `inp` into `out`.
    ///
    /// See [`into_stream`] for a high-level interface.
    ///
    /// [`into_stream`]: #method.into_stream
    pub fn decode_bytes(&mut self, inp: &[u8], out: &mut [u8]) -> StreamResult {
        self.state.advance(inp, out)
    }

    /// Construct a decoder into a writer.
    pub fn into_stream<W: Write>(&mut self, writer: W) -> IntoStream<'_, W> {
        IntoStream {
            decoder: self,
            writer,
        }
    }

    /// Whether the end-of-stream code has been read.
    pub fn has_ended(&self) -> bool {
        self.state.has_ended
    }
}

impl<W: Write> IntoStream<'_, W> {
    /// Decode the full stream from a reader, up to the end-of-stream code.
    pub fn decode_all(mut self, mut read: impl BufRead) -> AllResult {
        enum Progress {
            Ok,
            Done,
        }

        let IntoStream { decoder, writer } = &mut self;

        let mut bytes_read = 0;
        let mut bytes_written = 0;

        let read_bytes = &mut bytes_read;
        let write_bytes = &mut bytes_written;

        let mut outbuf = vec![0; 1 << 20];
        let once = move || {
            let data = read.fill_buf()?;

            let result = decoder.decode_bytes(data, &mut outbuf[..]);
            *read_bytes += result.consumed_in;
            *write_bytes += result.consumed_out;
            read.consume(result.consumed_in);

            let done = result.status.map_err(|err| {
                io::Error::new(io::ErrorKind::InvalidData, &*format!("{}", err))
            })?;

            if let LzwStatus::Done = done {
                writer.write_all(&outbuf[..result.consumed_out])?;
                return Ok(Progress::Done);
            }

            if let LzwStatus::NoProgress = done {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "No more data but no end marker detected",
                ));
            }

            writer.write_all(&outbuf[..result.consumed_out])?;
            Ok(Progress::Ok)
        };

        let status = core::iter::repeat_with(once)
            // scan+fuse can be replaced with map_while
            .scan((), |(), result| match result {
                Ok(Progress::Ok) => Some(Ok(())),
                Err(err) => Some(Err(err)),
                Ok(Progress::Done) => None,
            })
            .fuse()
            .collect();
        AllResult {
            bytes_read,
            bytes_written,
            status,
        }
    }
}

impl DecodeState {
    fn new(policy: Policy) -> Self {
        let mut table = Table::new();
        table.clear();
        DecodeState {
            table,
            buffer: Buffer::new(),
            last: None,
            policy,
            trend: RatioTrend::default(),
            code_size: MIN_CODESIZE,
            has_ended: false,
            bit_buffer: 0,
            bits: 0,
        }
    }

    fn reset_tables(&mut self) {
        info!("resetting codebook after {} entries", self.table.len());
        self.code_size = MIN_CODESIZE;
        self.table.clear();
        self.trend.restart();
        // The next code is handled like the first of a stream: the encoder
        // dropped the entry pending at reset time, so no link is derived.
        self.last = None;
    }

    fn advance(&mut self, mut inp: &[u8], mut out: &mut [u8]) -> StreamResult {
        let o_in = inp.len();
        let o_out = out.len();
        let mut status = Ok(LzwStatus::Ok);

        loop {
            // Move out whatever is reconstructed but not yet written.
            let remain = self.buffer.buffer();
            if remain.len() > out.len() {
                if out.is_empty() {
                    status = Ok(LzwStatus::NoProgress);
                } else {
                    let len = out.len();
                    out.copy_from_slice(&remain[..len]);
                    self.buffer.consume(len);
                    out = &mut [];
                }
                break;
            }
            let consumed = remain.len();
            out[..consumed].copy_from_slice(remain);
            self.buffer.consume(consumed);
            out = &mut out[consumed..];

            if self.has_ended {
                status = Ok(LzwStatus::Done);
                break;
            }

            let code = match self.next_symbol(&mut inp) {
                Some(code) => code,
                None => {
                    status = Ok(LzwStatus::NoProgress);
                    break;
                }
            };

            if code == EOF_CODE {
                self.has_ended = true;
                status = Ok(LzwStatus::Done);
                break;
            }

            match self.last {
                // The first code of the stream, or the first after a reset.
                // It resolves directly and derives nothing.
                None => {
                    if usize::from(code) >= self.table.len() {
                        status = Err(LzwError::InvalidCode);
                        break;
                    }
                    let depth = self.table.depth(code);
                    self.trend.record(self.code_size, usize::from(depth));
                    self.buffer.reconstruct_low(&self.table, code);
                    self.last = Some(code);
                }
                Some(prev) => {
                    let next = self.table.len();
                    let first_byte;
                    let depth;
                    if usize::from(code) < next {
                        depth = self.table.depth(code);
                        first_byte = self.buffer.reconstruct_low(&self.table, code);
                    } else if usize::from(code) == next && next < MAX_ENTRIES {
                        // The classic self-reference: the code stands for the
                        // entry this very step derives, so the string is the
                        // previous one extended by its own first byte.
                        depth = self.table.depth(prev) + 1;
                        first_byte = self.buffer.reconstruct_high();
                    } else {
                        status = Err(LzwError::InvalidCode);
                        break;
                    }
                    self.trend.record(self.code_size, usize::from(depth));

                    // Each code derives one entry based on the preceding one.
                    // The decoder runs one derivation behind the encoder, so
                    // the width grows while deriving entry `capacity - 1`.
                    let capacity = 1usize << self.code_size;
                    if next < capacity - 1 {
                        self.table.derive(prev, first_byte);
                        self.last = Some(code);
                    } else if self.code_size < MAX_CODESIZE {
                        self.code_size += 1;
                        self.table.derive(prev, first_byte);
                        self.last = Some(code);
                    } else {
                        if next < MAX_ENTRIES {
                            self.table.derive(prev, first_byte);
                        }
                        if self.policy.on_saturated(&mut self.trend) {
                            self.reset_tables();
                        } else {
                            self.last = Some(code);
                        }
                    }
                }
            }
        }

        if o_in > inp.len() {
            if let Ok(LzwStatus::NoProgress) = status {
                status = Ok(LzwStatus::Ok);
            }
        }

        StreamResult {
            consumed_in: o_in.wrapping_sub(inp.len()),
            consumed_out: o_out.wrapping_sub(out.len()),
            status,
        }
    }

    fn next_symbol(&mut self, inp: &mut &[u8]) -> Option<Code> {
        if self.bits < self.code_size {
            self.refill_bits(inp);
        }

        self.get_bits()
    }

    fn refill_bits(&mut self, inp: &mut &[u8]) {
        let wish_count = (64 - self.bits) / 8;
        let mut buffer = [0u8; 8];
        let new_bits = match inp.get(..usize::from(wish_count)) {
            Some(bytes) => {
                buffer[..usize::from(wish_count)].copy_from_slice(bytes);
                *inp = &inp[usize::from(wish_count)..];
                wish_count * 8
            }
            None => {
                let new_bits = inp.len() * 8;
                buffer[..inp.len()].copy_from_slice(inp);
                *inp = &[];
                new_bits as u8
            }
        };
        self.bit_buffer |= u64::from_be_bytes(buffer) >> self.bits;
        self.bits += new_bits;
    }

    fn get_bits(&mut self) -> Option<Code> {
        if self.bits < self.code_size {
            return None;
        }

        let mask = (1 << self.code_size) - 1;
        let rotbuf = self.bit_buffer.rotate_left(self.code_size.into());
        self.bit_buffer = rotbuf & !mask;
        self.bits -= self.code_size;
        Some((rotbuf & mask) as u16)
    }
}

impl Buffer {
    fn new() -> Self {
        Buffer {
            bytes: vec![0; MAX_ENTRIES + 1].into_boxed_slice(),
            read_mark: 0,
            write_mark: 0,
        }
    }

    /// Append the first byte of the retained string to itself, for the
    /// self-reference case. The previous string is still in the buffer.
    fn reconstruct_high(&mut self) -> u8 {
        self.bytes[self.write_mark] = self.bytes[0];
        self.write_mark += 1;
        self.read_mark = 0;
        self.bytes[0]
    }

    fn reconstruct_low(&mut self, table: &Table, code: Code) -> u8 {
        self.read_mark = 0;
        let depth = table.depth(code);
        let mut memory = core::mem::take(&mut self.bytes);

        let out = &mut memory[..usize::from(depth)];
        let last = table.reconstruct(code, out);

        self.bytes = memory;
        self.write_mark = usize::from(depth);
        last
    }

    fn buffer(&self) -> &[u8] {
        &self.bytes[self.read_mark..self.write_mark]
    }

    fn consume(&mut self, amt: usize) {
        self.read_mark += amt;
    }
}

impl Table {
    fn new() -> Self {
        Table {
            inner: Vec::with_capacity(MAX_ENTRIES),
            depths: Vec::with_capacity(MAX_ENTRIES),
        }
    }

    /// Rebuild the seed alphabet: one entry per byte, and a zero-depth
    /// placeholder occupying the end-of-stream code so that entry indices
    /// line up with the encoder's code assignment.
    fn clear(&mut self) {
        self.inner.clear();
        self.depths.clear();
        for i in 0..u16::from(u8::max_value()) + 1 {
            self.inner.push(Link {
                prev: i,
                byte: i as u8,
            });
            self.depths.push(1);
        }
        self.inner.push(Link { prev: 0, byte: 0 });
        self.depths.push(0);
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn depth(&self, code: Code) -> u16 {
        self.depths[usize::from(code)]
    }

    fn derive(&mut self, prev: Code, byte: u8) {
        let depth = self.depths[usize::from(prev)] + 1;
        self.inner.push(Link { prev, byte });
        self.depths.push(depth);
    }

    /// Write the string for `code` into `out` back-to-front, returning its
    /// first byte. `out` must have exactly the entry's depth.
    fn reconstruct(&self, code: Code, out: &mut [u8]) -> u8 {
        let mut code_iter = code;
        for ch in out.iter_mut().rev() {
            let entry = &self.inner[usize::from(code_iter)];
            *ch = entry.byte;
            code_iter = entry.prev;
        }
        out[0]
    }
}
