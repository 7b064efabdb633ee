//! Client-side live data synchronization for the civic-issue app.
//!
//! Three controllers keep list and dashboard views fresh against the REST
//! backend: [`PeriodicFetcher`] polls a single source on an interval,
//! [`IssueQueryController`] owns the filter/search/sort/page state of the
//! issue list, and [`MultiSourceFetcher`] merges several stat sources into
//! one view-model. All of them publish snapshots through a `tokio::watch`
//! channel and never blank previously displayed data on a failed refresh.

use std::time::Duration;

use thiserror::Error;

pub mod aggregate;
pub mod periodic;
pub mod query;
mod schedule;
pub mod state;
mod ticket;

pub use aggregate::MultiSourceFetcher;
pub use periodic::{FetchSource, PeriodicFetcher};
pub use query::{FilterUpdate, IssueQueryController, ListState, PageSource, QuerySpec};
pub use state::{FetchFailure, FetchState};

/// Quiet period between the last search keystroke and the committed fetch.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("poll interval must be greater than zero")]
    InvalidInterval,
    #[error("page size must be greater than zero")]
    InvalidPageSize,
    #[error("page numbers start at 1")]
    InvalidPage,
    #[error("at least one fetch source is required")]
    NoSources,
}
