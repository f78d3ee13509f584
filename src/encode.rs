//! A module for all encoding needs.
use crate::decode::{AllResult, LzwStatus, StreamResult};
use crate::policy::{Policy, RatioTrend};
use crate::{Code, EOF_CODE, MAX_CODESIZE, MIN_CODESIZE};

use log::info;
use std::io::{self, BufRead, Write};

/// The encoding engine, turning bytes into a code stream.
pub struct Encoder {
    state: Box<EncodeState>,
}

/// An encoding stream sink.
///
/// See [`Encoder::into_stream`] on how to create this type.
///
/// [`Encoder::into_stream`]: struct.Encoder.html#method.into_stream
pub struct IntoStream<'d, W> {
    encoder: &'d mut Encoder,
    writer: W,
}

struct EncodeState {
    /// The current encoding symbol tree.
    tree: Tree,
    /// The saturation policy for this run.
    policy: Policy,
    /// Ratio bookkeeping, mirrored with the decoder.
    trend: RatioTrend,
    /// If the input has been marked as complete.
    has_ended: bool,
    /// If the end-of-stream code has been buffered.
    eof_buffered: bool,
    /// The code corresponding to the currently read characters.
    current_code: Code,
    /// How many bytes the current phrase covers.
    phrase_len: usize,
    /// The bit buffer for encoding.
    buffer: MsbBuffer,
}

struct MsbBuffer {
    /// The current code length.
    code_size: u8,
    /// The buffer bits.
    buffer: u64,
    /// The number of valid buffer bits.
    bits_in_buffer: u8,
}

/// One tree node for at most each code.
/// To avoid using too much memory we keep nodes with few successors in
/// optimized form. This form doesn't offer lookup by indexing but instead
/// does a linear search.
#[derive(Default)]
struct Tree {
    simples: Vec<Simple>,
    complex: Vec<Full>,
    keys: Vec<CompressedKey>,
}

#[derive(Clone, Copy)]
enum FullKey {
    NoSuccessor,
    Simple(u32),
    Full(u32),
}

#[derive(Clone, Copy)]
struct CompressedKey(u32);

const SHORT: usize = 16;

#[derive(Clone, Copy)]
struct Simple {
    codes: [Code; SHORT],
    chars: [u8; SHORT],
    count: u8,
}

#[derive(Clone, Copy)]
struct Full {
    char_continuation: [Code; 256],
}

impl Encoder {
    pub fn new(policy: Policy) -> Self {
        Encoder {
            state: Box::new(EncodeState::new(policy)),
        }
    }

    /// Encode some bytes from `inp` into `out`.
    ///
    /// See [`into_stream`] for a high-level interface and [`finish`] for
    /// marking the input data as complete.
    ///
    /// [`into_stream`]: #method.into_stream
    /// [`finish`]: #method.finish
    pub fn encode_bytes(&mut self, inp: &[u8], out: &mut [u8]) -> StreamResult {
        self.state.advance(inp, out)
    }

    /// Construct an encoder into a writer.
    pub fn into_stream<W: Write>(&mut self, writer: W) -> IntoStream<'_, W> {
        IntoStream {
            encoder: self,
            writer,
        }
    }

    /// Mark the encoding as finished.
    ///
    /// In following calls to `encode_bytes` the encoder will emit the final
    /// phrase and the end-of-stream code after encoding all of `inp`.
    pub fn finish(&mut self) {
        self.state.mark_ended();
    }
}

impl<W: Write> IntoStream<'_, W> {
    /// Encode data from a reader.
    ///
    /// This will drain the supplied reader. It will not encode an end marker
    /// after all data has been processed.
    pub fn encode(&mut self, read: impl BufRead) -> AllResult {
        self.encode_part(read, false)
    }

    /// Encode data from a reader and an end marker.
    pub fn encode_all(mut self, read: impl BufRead) -> AllResult {
        self.encode_part(read, true)
    }

    fn encode_part(&mut self, mut read: impl BufRead, finish: bool) -> AllResult {
        let IntoStream { encoder, writer } = self;
        enum Progress {
            Ok,
            Done,
        }

        let mut bytes_read = 0;
        let mut bytes_written = 0;

        let read_bytes = &mut bytes_read;
        let write_bytes = &mut bytes_written;

        let mut outbuf = vec![0; 1 << 20];
        let once = move || {
            let data = read.fill_buf()?;

            if data.is_empty() {
                if finish {
                    encoder.finish();
                } else {
                    return Ok(Progress::Done);
                }
            }

            let result = encoder.encode_bytes(data, &mut outbuf[..]);
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

impl EncodeState {
    fn new(policy: Policy) -> Self {
        let mut tree = Tree::default();
        tree.init();
        EncodeState {
            tree,
            policy,
            trend: RatioTrend::default(),
            has_ended: false,
            eof_buffered: false,
            current_code: EOF_CODE,
            phrase_len: 0,
            buffer: MsbBuffer::new(),
        }
    }

    fn advance(&mut self, mut inp: &[u8], mut out: &mut [u8]) -> StreamResult {
        let c_in = inp.len();
        let c_out = out.len();

        loop {
            if self.buffer.push_out(&mut out) {
                break;
            }

            if inp.is_empty() && self.has_ended {
                if !self.eof_buffered {
                    if self.current_code != EOF_CODE {
                        self.emit_phrase();
                        // The decoder widens or consults the policy after
                        // its final derivation; match it so both sides agree
                        // on the width of the end code.
                        if self.tree.len() == 1usize << self.buffer.code_size {
                            if self.buffer.code_size < MAX_CODESIZE {
                                self.buffer.bump_code_size();
                            } else if self.policy.on_saturated(&mut self.trend) {
                                self.reset_codebook();
                            }
                        }
                    }
                    self.buffer.buffer_code(EOF_CODE);
                    self.buffer.buffer_pad();
                    self.eof_buffered = true;
                }
                break;
            }

            let mut pending = None;
            let mut bytes = inp.iter();
            while let Some(&byte) = bytes.next() {
                inp = bytes.as_slice();
                match self.tree.at_key(self.current_code, byte) {
                    Some(code) => {
                        self.current_code = code;
                        self.phrase_len += 1;
                    }
                    None => {
                        pending = Some(byte);
                        break;
                    }
                }
            }

            match pending {
                // No more bytes, no code produced.
                None => break,
                Some(byte) => {
                    self.emit_phrase();
                    self.extend_codebook(byte);
                    self.current_code = Code::from(byte);
                    self.phrase_len = 1;
                }
            }
        }

        let mut status = Ok(LzwStatus::Ok);
        if inp.is_empty() && self.eof_buffered {
            if !self.buffer.flush_out(&mut out) {
                status = Ok(LzwStatus::Done);
            }
        }

        StreamResult {
            consumed_in: c_in - inp.len(),
            consumed_out: c_out - out.len(),
            status,
        }
    }

    fn mark_ended(&mut self) -> bool {
        core::mem::replace(&mut self.has_ended, true)
    }

    /// Write the code of the current phrase at the current width and account
    /// it in the ratio trend.
    fn emit_phrase(&mut self) {
        self.trend.record(self.buffer.code_size, self.phrase_len);
        self.buffer.buffer_code(self.current_code);
    }

    /// Grow the codebook by the phrase extended with the miss byte, widening
    /// the code first when the capacity is exhausted, or run the saturation
    /// policy at maximum width. A reset drops the pending entry.
    fn extend_codebook(&mut self, byte: u8) {
        let capacity = 1usize << self.buffer.code_size;
        if self.tree.len() < capacity {
            self.tree.append(self.current_code, byte);
        } else if self.buffer.code_size < MAX_CODESIZE {
            self.buffer.bump_code_size();
            self.tree.append(self.current_code, byte);
        } else if self.policy.on_saturated(&mut self.trend) {
            self.reset_codebook();
        }
    }

    fn reset_codebook(&mut self) {
        info!("resetting codebook after {} entries", self.tree.len());
        self.tree.reset();
        self.buffer.reset();
        self.trend.restart();
    }
}

impl MsbBuffer {
    fn new() -> Self {
        MsbBuffer {
            code_size: MIN_CODESIZE,
            buffer: 0,
            bits_in_buffer: 0,
        }
    }

    fn reset(&mut self) {
        self.code_size = MIN_CODESIZE;
    }

    fn buffer_code(&mut self, code: Code) {
        let shift = 64 - self.bits_in_buffer - self.code_size;
        self.buffer |= u64::from(code) << shift;
        self.bits_in_buffer += self.code_size;
    }

    /// Push bytes if the buffer space is getting small.
    fn push_out(&mut self, out: &mut &mut [u8]) -> bool {
        if self.bits_in_buffer + 2 * self.code_size < 64 {
            return false;
        }

        self.flush_out(out)
    }

    /// Flush all full bytes, returning if at least one more byte remains.
    fn flush_out(&mut self, out: &mut &mut [u8]) -> bool {
        let want = usize::from(self.bits_in_buffer / 8);
        let count = want.min((*out).len());
        let (bytes, tail) = core::mem::replace(out, &mut []).split_at_mut(count);
        *out = tail;

        for b in bytes {
            *b = ((self.buffer & 0xff00_0000_0000_0000) >> 56) as u8;
            self.buffer <<= 8;
            self.bits_in_buffer -= 8;
        }

        count < want
    }

    /// Pad the buffer to a full byte.
    fn buffer_pad(&mut self) {
        let to_byte = self.bits_in_buffer.wrapping_neg() & 0x7;
        self.bits_in_buffer += to_byte;
    }

    fn bump_code_size(&mut self) {
        self.code_size += 1;
    }
}

impl Tree {
    /// Seed the tree. The end-of-stream code is never a codebook entry, so
    /// its key slot can root the empty phrase: one complex mapping that leads
    /// to the one-byte base codes.
    fn init(&mut self) {
        self.keys
            .resize(usize::from(EOF_CODE) + 1, FullKey::NoSuccessor.into());
        self.complex.push(Full {
            char_continuation: [0; 256],
        });
        let map_of_begin = self.complex.last_mut().unwrap();
        for ch in 0u16..256 {
            map_of_begin.char_continuation[usize::from(ch)] = ch;
        }
        self.keys[usize::from(EOF_CODE)] = FullKey::Full(0).into();
    }

    fn reset(&mut self) {
        self.simples.clear();
        // Keep the entry rooting the empty phrase.
        self.complex.truncate(1);
        self.keys.truncate(usize::from(EOF_CODE) + 1);
        for k in self.keys[..usize::from(EOF_CODE)].iter_mut() {
            *k = FullKey::NoSuccessor.into();
        }
    }

    /// The next code to be assigned.
    fn len(&self) -> usize {
        self.keys.len()
    }

    fn at_key(&self, code: Code, ch: u8) -> Option<Code> {
        let key = self.keys[usize::from(code)];
        match FullKey::from(key) {
            FullKey::NoSuccessor => None,
            FullKey::Simple(idx) => {
                let nexts = &self.simples[idx as usize];
                let successors = nexts
                    .codes
                    .iter()
                    .zip(nexts.chars.iter())
                    .take(usize::from(nexts.count));
                for (&scode, &sch) in successors {
                    if sch == ch {
                        return Some(scode);
                    }
                }

                None
            }
            FullKey::Full(idx) => {
                let full = &self.complex[idx as usize];
                let precode = full.char_continuation[usize::from(ch)];
                if precode != EOF_CODE {
                    Some(precode)
                } else {
                    None
                }
            }
        }
    }

    fn append(&mut self, code: Code, ch: u8) -> Code {
        let next: Code = self.keys.len() as u16;
        let key = self.keys[usize::from(code)];
        match FullKey::from(key) {
            FullKey::NoSuccessor => {
                let new_key = FullKey::Simple(self.simples.len() as u32);
                self.simples.push(Simple::default());
                let simples = self.simples.last_mut().unwrap();
                simples.codes[0] = next;
                simples.chars[0] = ch;
                simples.count = 1;
                self.keys[usize::from(code)] = new_key.into();
            }
            FullKey::Simple(idx) if usize::from(self.simples[idx as usize].count) < SHORT => {
                let nexts = &mut self.simples[idx as usize];
                let nidx = usize::from(nexts.count);
                nexts.chars[nidx] = ch;
                nexts.codes[nidx] = next;
                nexts.count += 1;
            }
            FullKey::Simple(idx) => {
                let new_key = FullKey::Full(self.complex.len() as u32);
                let simples = &self.simples[idx as usize];
                self.complex.push(Full {
                    // The end-of-stream code marks absent successors.
                    char_continuation: [EOF_CODE; 256],
                });
                let full = self.complex.last_mut().unwrap();
                for (&pch, &pcont) in simples.chars.iter().zip(simples.codes.iter()) {
                    full.char_continuation[usize::from(pch)] = pcont;
                }
                full.char_continuation[usize::from(ch)] = next;
                self.keys[usize::from(code)] = new_key.into();
            }
            FullKey::Full(idx) => {
                let full = &mut self.complex[idx as usize];
                full.char_continuation[usize::from(ch)] = next;
            }
        }
        self.keys.push(FullKey::NoSuccessor.into());
        next
    }
}

impl Default for FullKey {
    fn default() -> Self {
        FullKey::NoSuccessor
    }
}

impl Default for Simple {
    fn default() -> Self {
        Simple {
            codes: [0; SHORT],
            chars: [0; SHORT],
            count: 0,
        }
    }
}

impl From<CompressedKey> for FullKey {
    fn from(CompressedKey(key): CompressedKey) -> Self {
        match key >> 30 {
            0 => FullKey::Full(key & 0x3fff_ffff),
            1 => FullKey::Simple(key & 0x3fff_ffff),
            _ => FullKey::NoSuccessor,
        }
    }
}

impl From<FullKey> for CompressedKey {
    fn from(full: FullKey) -> Self {
        CompressedKey(match full {
            FullKey::NoSuccessor => 0x8000_0000,
            FullKey::Simple(idx) => 0x4000_0000 | idx,
            FullKey::Full(idx) => idx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Encoder, LzwStatus};
    use crate::Policy;

    #[test]
    fn empty_input_emits_only_the_sentinel() {
        let ref mut target = [0u8; 8];
        let mut encoder = Encoder::new(Policy::Freeze);

        encoder.finish();
        let result = encoder.encode_bytes(&[], target);
        assert_eq!(result.status.unwrap(), LzwStatus::Done);
        assert_eq!(result.consumed_out, 2);
        assert_eq!(&target[..2], &[0x80, 0x00]);
    }

    #[test]
    fn single_literal() {
        let ref mut target = [0u8; 8];
        let mut encoder = Encoder::new(Policy::Freeze);

        encoder.finish();
        let first = encoder.encode_bytes(b"A", target);
        assert_eq!(first.consumed_in, 1);
        // The final phrase is only flushed once the input is known empty.
        let second = encoder.encode_bytes(&[], &mut target[first.consumed_out..]);
        assert_eq!(second.status.unwrap(), LzwStatus::Done);
        // Code 65 and the sentinel, 9 bits each, padded to three bytes.
        assert_eq!(first.consumed_out + second.consumed_out, 3);
        assert_eq!(&target[..3], &[0x20, 0xC0, 0x00]);
    }
}
