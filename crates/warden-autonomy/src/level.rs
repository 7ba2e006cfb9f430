use serde::{Deserialize, Serialize};
use std::fmt;

/// Six autonomy levels for the control plane:
///
/// - **A0 (Manual)**: Nothing runs automatically; operator writes need approval.
/// - **A1 (Assisted)**: Same gating as A0, but the scheduler may plan and queue goals.
/// - **A2 (Supervised)**: Automatic dispatch allowed, dry-run only.
/// - **A3 (Conditional)**: Writes allowed; medium risk and above needs approval.
/// - **A4 (High)**: Writes allowed; high and critical risk need approval.
/// - **A5 (Full)**: Writes allowed; only critical risk needs approval.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum AutonomyLevel {
    A0 = 0,
    A1 = 1,
    #[default]
    A2 = 2,
    A3 = 3,
    A4 = 4,
    A5 = 5,
}

impl AutonomyLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::A0,
            1 => Self::A1,
            2 => Self::A2,
            3 => Self::A3,
            4 => Self::A4,
            5 => Self::A5,
            _ => Self::A1, // safe default
        }
    }

    /// A0 and A1 never execute on their own.
    pub fn is_manual(&self) -> bool {
        *self <= Self::A1
    }

    /// Whether this level may perform real (non-dry-run) writes at all.
    pub fn allows_writes(&self) -> bool {
        *self != Self::A2
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::A0 => "Manual: every write needs an operator and approval",
            Self::A1 => "Assisted: plans and queues goals, executes nothing by itself",
            Self::A2 => "Supervised: dispatches automatically in dry-run mode only",
            Self::A3 => "Conditional: writes allowed, medium risk and above needs approval",
            Self::A4 => "High: writes allowed, high and critical risk need approval",
            Self::A5 => "Full: writes allowed, only critical risk needs approval",
        }
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", *self as u8)
    }
}
