//! # Adaptive LZW encoder and decoder
//!
//! This crate provides an [`encode::Encoder`] and a [`decode::Decoder`] for an
//! adaptive LZW variant over the full byte alphabet. Code words are written to
//! the stream most significant bit first, starting at 9 bits and widening as
//! the codebook fills, up to a maximum of 16 bits. The stream ends with a
//! dedicated end-of-stream code.
//!
//! What happens once the codebook saturates at 16 bits is governed by a
//! [`Policy`] chosen per run: the codebook can freeze, be rebuilt from the
//! seed alphabet, or be rebuilt only when the observed compression ratio has
//! drifted. Encoder and decoder apply the chosen policy at the same points of
//! the code stream, so their codebooks never diverge and the policy is never
//! signalled in-band.
//!
//! Exemplary use of the encoder:
//!
//! ```
//! use alzw::{encode::Encoder, Policy};
//! let data = b"TOBEORNOTTOBEORTOBEORNOT";
//! let mut compressed = vec![];
//!
//! let mut enc = Encoder::new(Policy::Freeze);
//! let result = enc.into_stream(&mut compressed).encode_all(&data[..]);
//! result.status.unwrap();
//! ```
/// The code width every stream starts with, and returns to after a reset.
pub(crate) const MIN_CODESIZE: u8 = 9;
pub(crate) const MAX_CODESIZE: u8 = 16;
pub(crate) const MAX_ENTRIES: usize = 1 << MAX_CODESIZE as usize;

/// Code marking the end of the stream. Never assigned to a codebook entry.
pub(crate) const EOF_CODE: Code = 256;

/// Alias for a LZW code point
pub(crate) type Code = u16;

pub mod decode;
pub mod encode;
mod policy;

pub use self::policy::{ParsePolicyError, Policy};
