//! The shared saturation policy and its ratio bookkeeping.
use std::fmt;
use std::str::FromStr;

use log::{debug, info};

/// A reset fires once the baseline ratio exceeds the current one by 10%.
const RATIO_DRIFT_LIMIT: f64 = 1.1;

/// What to do with the codebook once it is full at the maximum code width.
///
/// The same policy must be used for encoding and decoding a stream; it is
/// never transmitted in-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Keep the codebook as-is. No further entries are added.
    Freeze,
    /// Discard all entries beyond the seed alphabet and start over at 9 bits.
    Reset,
    /// Track the compression ratio and reset only when it has degraded by
    /// more than 10% relative to the ratio at the first saturation.
    Monitor,
}

impl Policy {
    /// The one-character token used to persist the choice between the
    /// compress and expand invocations of a pipeline.
    pub fn token(self) -> &'static str {
        match self {
            Policy::Freeze => "n",
            Policy::Reset => "r",
            Policy::Monitor => "m",
        }
    }

    /// Decide whether a full codebook should be rebuilt.
    ///
    /// Called at the structurally identical point on the encode and decode
    /// sides, with identical trend state, whenever the codebook holds all
    /// 65536 entries.
    pub(crate) fn on_saturated(self, trend: &mut RatioTrend) -> bool {
        match self {
            Policy::Freeze => false,
            Policy::Reset => true,
            Policy::Monitor => trend.has_degraded(),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Policy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, ParsePolicyError> {
        match s {
            "n" => Ok(Policy::Freeze),
            "r" => Ok(Policy::Reset),
            "m" => Ok(Policy::Monitor),
            other => Err(ParsePolicyError(other.to_owned())),
        }
    }
}

/// The error returned when a policy token is not one of `n`, `r`, `m`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown codebook policy `{0}`, expected one of `n`, `r`, `m`")]
pub struct ParsePolicyError(String);

/// Running compression-ratio state for [`Policy::Monitor`].
///
/// Both engines account every code at the same width and every phrase at the
/// same byte length, so the two copies of this state evolve identically. The
/// bit counters span the whole run; only the baseline is dropped on a reset.
#[derive(Default)]
pub(crate) struct RatioTrend {
    uncompressed_bits: f64,
    compressed_bits: f64,
    baseline: Option<f64>,
}

impl RatioTrend {
    /// Account one code of `code_size` bits standing for `phrase_bytes` bytes.
    pub(crate) fn record(&mut self, code_size: u8, phrase_bytes: usize) {
        self.compressed_bits += f64::from(code_size);
        self.uncompressed_bits += 8.0 * phrase_bytes as f64;
    }

    /// Capture a baseline on the first call after a (re)start, afterwards
    /// compare against it. The baseline is not slid forward on a miss.
    fn has_degraded(&mut self) -> bool {
        let current = self.uncompressed_bits / self.compressed_bits;
        match self.baseline {
            None => {
                debug!("captured compression baseline {:.3}", current);
                self.baseline = Some(current);
                false
            }
            Some(first) => {
                let drift = first / current;
                if drift > RATIO_DRIFT_LIMIT {
                    info!("compression ratio drifted by {:.3}", drift);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub(crate) fn restart(&mut self) {
        self.baseline = None;
    }
}
