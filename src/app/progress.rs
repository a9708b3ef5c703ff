//! Acknowledgment state machine.
//!
//! Every accepted operation walks a fixed path, one step per asset tick,
//! and each step renders the acknowledgment line the platform expects:
//!
//! ```text
//!            ┌───────── 501 ─────────┐         ┌───── 503 ─────┐
//!   Idle ──▶ BeforeExecuting ──────▶ Executing ───────────────▶ Idle
//!     │            │ (restart)
//!     │            └──── 501 ────▶ Blocking  (until reset)
//!     │
//!     ├──▶ BeforeFailed ── 501 ──▶ Failed ── 502 ──▶ Idle
//!     │
//!     ├──▶ ImmediateCmd    ── 501, 503, c8y_CommandEvent ──▶ Idle
//!     └──▶ ImmediateButton ── 501, 503, c8y_ButtonEvent  ──▶ Idle
//! ```
//!
//! [`CommandProgress::advance`] is pure: it renders into a caller-provided
//! sink and returns the next state. The caller commits the new state only
//! if the rendered lines made it into the asset buffer, so a lost lock
//! never skips an acknowledgment.

use crate::error::BufferError;
use crate::protocol::command::OperationType;
use crate::protocol::{self, LineSink};

pub const COMMAND_EVENT: &str = "c8y_CommandEvent";
pub const BUTTON_EVENT: &str = "c8y_ButtonEvent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandProgress {
    /// Waiting for the next operation.
    #[default]
    Idle,
    /// Accepted; `501` goes out on the next tick. `restart` sends the
    /// machine into [`Blocking`](Self::Blocking) instead of completing.
    BeforeExecuting { op: OperationType, restart: bool },
    /// `501` sent; `503` goes out on the next tick.
    Executing { op: OperationType },
    /// Rejected; `501` goes out on the next tick.
    BeforeFailed { op: OperationType, reason: &'static str },
    /// `501` sent; `502` with `reason` goes out on the next tick.
    Failed { op: OperationType, reason: &'static str },
    /// Completed synchronously; the whole triad goes out in one tick.
    ImmediateCmd { op: OperationType, verb: &'static str },
    /// Same as `ImmediateCmd`, attributed to a button gesture.
    ImmediateButton { op: OperationType, verb: &'static str },
    /// Restart acknowledged; nothing executes until the device resets.
    Blocking,
}

impl CommandProgress {
    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }

    pub fn is_blocking(self) -> bool {
        self == Self::Blocking
    }

    /// Render this step's acknowledgments and return the following state.
    pub fn advance(self, out: &mut impl LineSink) -> Result<Self, BufferError> {
        match self {
            Self::Idle => Ok(Self::Idle),
            Self::BeforeExecuting { op, restart } => {
                protocol::ack_executing(out, op)?;
                Ok(if restart { Self::Blocking } else { Self::Executing { op } })
            }
            Self::Executing { op } => {
                protocol::ack_successful(out, op)?;
                Ok(Self::Idle)
            }
            Self::BeforeFailed { op, reason } => {
                protocol::ack_executing(out, op)?;
                Ok(Self::Failed { op, reason })
            }
            Self::Failed { op, reason } => {
                protocol::ack_failed(out, op, reason)?;
                Ok(Self::Idle)
            }
            Self::ImmediateCmd { op, verb } => {
                protocol::ack_executing(out, op)?;
                protocol::ack_successful(out, op)?;
                protocol::event(out, COMMAND_EVENT, format_args!("Executed {verb}"))?;
                Ok(Self::Idle)
            }
            Self::ImmediateButton { op, verb } => {
                protocol::ack_executing(out, op)?;
                protocol::ack_successful(out, op)?;
                protocol::event(out, BUTTON_EVENT, format_args!("{verb} by button"))?;
                Ok(Self::Idle)
            }
            Self::Blocking => Ok(Self::Blocking),
        }
    }
}
