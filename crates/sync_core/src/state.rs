use chrono::{DateTime, Utc};

/// Record of the most recent failed fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub message: String,
    pub at: DateTime<Utc>,
}

impl FetchFailure {
    pub(crate) fn from_error(err: &anyhow::Error) -> Self {
        Self {
            message: format!("{err:#}"),
            at: Utc::now(),
        }
    }
}

/// Snapshot of one periodically fetched data source.
///
/// `data` holds the last successful payload and is never cleared by a failed
/// refresh; a consumer showing `data` alongside a non-empty `last_error` is
/// showing stale-but-present data.
#[derive(Debug, Clone)]
pub struct FetchState<T> {
    pub data: Option<T>,
    /// True only until the first attempt (success or failure) settles.
    pub is_initial_loading: bool,
    /// True while a post-initial attempt is in flight. Never true during the
    /// initial load.
    pub is_background_refreshing: bool,
    pub last_error: Option<FetchFailure>,
    /// Wall-clock time of the most recent successful fetch.
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl<T> FetchState<T> {
    pub fn initial() -> Self {
        Self {
            data: None,
            is_initial_loading: true,
            is_background_refreshing: false,
            last_error: None,
            last_updated_at: None,
        }
    }

    /// Data is present but the latest attempt failed.
    pub fn is_stale(&self) -> bool {
        self.data.is_some() && self.last_error.is_some()
    }
}
