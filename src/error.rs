//! Top-level error for attack resolution, synthesis and output.

use crate::capture::CaptureError;
use crate::ports::PortTableError;
use crate::stats::StatsError;
use crate::timing::TimingError;

/// Error from any stage of a port-scan attack.
///
/// Resolution errors abort before a packet is built. Synthesis and output
/// errors discard the partial packet sequence.
#[derive(Debug, thiserror::Error)]
pub enum AttackError {
    #[error("invalid address: no valid IPv4 destination after {attempts} attempts (last candidate '{last}')")]
    InvalidAddress { attempts: usize, last: String },

    #[error("invalid parameter {name}: '{value}' ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("missing statistic: {what}")]
    MissingStatistic { what: String },

    #[error("no packets generated")]
    EmptyResult,

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    PortTable(#[from] PortTableError),

    #[error(transparent)]
    Timing(#[from] TimingError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl AttackError {
    pub(crate) fn invalid(name: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
