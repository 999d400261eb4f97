use serde::{Deserialize, Serialize};

/// Wallet-side status of an unspent output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStatus {
    Unspent = 0,
    /// Spent by a transaction waiting in the mempool
    PendingSpend = 1,
    /// Excluded from coin selection by `lock_unspent`
    Locked = 2,
}

impl From<u32> for OutputStatus {
    fn from(value: u32) -> Self {
        match value {
            1 => OutputStatus::PendingSpend,
            2 => OutputStatus::Locked,
            _ => OutputStatus::Unspent,
        }
    }
}

impl From<OutputStatus> for u32 {
    fn from(status: OutputStatus) -> Self {
        status as u32
    }
}

impl OutputStatus {
    pub fn is_selectable(&self) -> bool {
        *self == OutputStatus::Unspent
    }
}
