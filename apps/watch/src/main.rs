use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use api_client::{
    dashboard::{dashboard_sources, DashboardModel},
    load_settings, IssueApiClient,
};
use clap::Parser;
use shared::{
    domain::{IssueStatus, SortOrder},
    protocol::IssueSummary,
};
use sync_core::{IssueQueryController, ListState, MultiSourceFetcher, PageSource, QuerySpec};
use tracing::info;

/// Tails a live, filtered view of reported civic issues plus the stats
/// dashboard to stdout.
#[derive(Parser, Debug)]
struct Args {
    /// Backend base URL; falls back to watch.toml / CIVIC_API_URL.
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    category: Option<String>,
    /// pending | in_progress | resolved | closed
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    search: Option<String>,
    /// newest | oldest | upvotes | priority
    #[arg(long, default_value = "newest")]
    sort: String,
    /// Print the first settled snapshot and exit.
    #[arg(long)]
    once: bool,
}

fn parse_sort(value: &str) -> Result<SortOrder> {
    Ok(match value {
        "newest" => SortOrder::Newest,
        "oldest" => SortOrder::Oldest,
        "upvotes" => SortOrder::MostUpvoted,
        "priority" => SortOrder::HighestPriority,
        other => bail!("unknown sort order: {other}"),
    })
}

fn print_issues(state: &ListState<IssueSummary>) {
    if state.is_initial_loading {
        return;
    }
    println!("-- issues (page {}, more: {}) --", state.page, state.has_more);
    for issue in &state.items {
        println!(
            "  [{}] {} ({} upvotes, {})",
            issue.status.as_str(),
            issue.title,
            issue.upvotes,
            issue.category
        );
    }
    if let Some(failure) = &state.last_error {
        println!("  ! showing stale data: {}", failure.message);
    }
}

fn print_dashboard(model: &DashboardModel) {
    println!("-- dashboard --");
    match &model.issues {
        Some(stats) => println!(
            "  issues: {} total, {} pending, {} in progress, {} resolved ({} this week)",
            stats.total_issues, stats.pending, stats.in_progress, stats.resolved, stats.recent_week
        ),
        None => println!("  issue stats unavailable"),
    }
    match &model.platform {
        Some(stats) => println!(
            "  platform: {} users, {} officials",
            stats.total_users, stats.total_officials
        ),
        None => println!("  platform stats unavailable"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(url) = args.api_url {
        settings.base_url = url;
    }
    info!(base_url = %settings.base_url, "starting issue watcher");

    let client = Arc::new(IssueApiClient::new(&settings)?);

    let spec = QuerySpec {
        category: args.category,
        status: match args.status.as_deref() {
            Some(raw) => match IssueStatus::parse(raw) {
                Some(status) => Some(status),
                None => bail!("unknown status: {raw}"),
            },
            None => None,
        },
        search: args.search.unwrap_or_default(),
        sort_by: parse_sort(&args.sort)?,
        page: 1,
    };

    let issues = IssueQueryController::new_with_spec(
        Arc::clone(&client) as Arc<dyn PageSource<IssueSummary>>,
        spec,
        settings.page_size,
        Duration::from_secs(settings.list_refresh_secs),
    )?;
    let stats = MultiSourceFetcher::new(
        dashboard_sources(&client),
        Duration::from_secs(settings.stats_refresh_secs),
    )?;

    let mut issues_rx = issues.subscribe();
    let mut stats_rx = stats.subscribe();
    issues.start();
    stats.start();

    // Wait until both controllers have settled their first fetch.
    while issues_rx.borrow().is_initial_loading {
        issues_rx.changed().await?;
    }
    while stats_rx.borrow().is_initial_loading {
        stats_rx.changed().await?;
    }
    print_issues(&issues.current());
    print_dashboard(&DashboardModel::from_slots(
        stats.current().data.as_deref().unwrap_or(&[]),
    ));

    if !args.once {
        loop {
            tokio::select! {
                changed = issues_rx.changed() => {
                    changed?;
                    print_issues(&issues.current());
                }
                changed = stats_rx.changed() => {
                    changed?;
                    print_dashboard(&DashboardModel::from_slots(
                        stats.current().data.as_deref().unwrap_or(&[]),
                    ));
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    }

    issues.stop();
    stats.stop();
    Ok(())
}
