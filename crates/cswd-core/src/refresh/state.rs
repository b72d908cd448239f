use serde::{Deserialize, Serialize};
use time::Date;

/// Synchronization state of one entity within a refresh batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    NeverFetched,
    Fetching,
    UpToDate,
    Stale,
    Failed,
}

impl RefreshState {
    /// State of an entity before a batch touches it.
    pub fn classify(last_stored: Option<Date>, last_trading_date: Date) -> Self {
        match last_stored {
            None => Self::NeverFetched,
            Some(last) if last >= last_trading_date => Self::UpToDate,
            Some(_) => Self::Stale,
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NeverFetched | Self::Stale | Self::Failed, Self::Fetching)
                | (Self::Fetching, Self::UpToDate | Self::Failed)
                | (Self::UpToDate, Self::Stale)
        )
    }
}
