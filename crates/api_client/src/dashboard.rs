//! Stat sources for the analytics dashboard, merged by
//! [`sync_core::MultiSourceFetcher`] on one shared timer.

use std::sync::Arc;

use async_trait::async_trait;
use shared::protocol::{IssueStatsSummary, PlatformStats};
use sync_core::FetchSource;

use crate::IssueApiClient;

#[derive(Debug, Clone)]
pub enum StatsSnapshot {
    Issues(IssueStatsSummary),
    Platform(PlatformStats),
}

struct IssueStatsSource {
    client: Arc<IssueApiClient>,
}

#[async_trait]
impl FetchSource<StatsSnapshot> for IssueStatsSource {
    async fn fetch(&self) -> anyhow::Result<StatsSnapshot> {
        Ok(StatsSnapshot::Issues(self.client.issue_stats().await?))
    }
}

struct PlatformStatsSource {
    client: Arc<IssueApiClient>,
}

#[async_trait]
impl FetchSource<StatsSnapshot> for PlatformStatsSource {
    async fn fetch(&self) -> anyhow::Result<StatsSnapshot> {
        Ok(StatsSnapshot::Platform(self.client.platform_stats().await?))
    }
}

/// The two stat endpoints the dashboard screen polls together.
pub fn dashboard_sources(client: &Arc<IssueApiClient>) -> Vec<Arc<dyn FetchSource<StatsSnapshot>>> {
    vec![
        Arc::new(IssueStatsSource {
            client: Arc::clone(client),
        }),
        Arc::new(PlatformStatsSource {
            client: Arc::clone(client),
        }),
    ]
}

/// Typed projection of the aggregator's merged slots. A `None` field means
/// that source has never succeeded.
#[derive(Debug, Clone, Default)]
pub struct DashboardModel {
    pub issues: Option<IssueStatsSummary>,
    pub platform: Option<PlatformStats>,
}

impl DashboardModel {
    pub fn from_slots(slots: &[Option<StatsSnapshot>]) -> Self {
        let mut model = Self::default();
        for slot in slots.iter().flatten() {
            match slot {
                StatsSnapshot::Issues(stats) => model.issues = Some(stats.clone()),
                StatsSnapshot::Platform(stats) => model.platform = Some(stats.clone()),
            }
        }
        model
    }
}
