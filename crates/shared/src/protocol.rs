use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CommentId, IssueId, IssueStatus, OfficialId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentPayload {
    pub id: CommentId,
    pub user_id: UserId,
    pub user_name: String,
    pub text: String,
    #[serde(default)]
    pub is_official: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub official_designation: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One issue as the list endpoint returns it. The backend sends the full
/// document; fields the client never renders are simply not modeled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueSummary {
    pub id: IssueId,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    pub status: IssueStatus,
    #[serde(default)]
    pub upvotes: u64,
    #[serde(default)]
    pub comments: Vec<CommentPayload>,
    #[serde(default)]
    pub priority_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_official_id: Option<OfficialId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_official_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopIssue {
    pub id: IssueId,
    pub title: String,
    pub upvotes: u64,
    pub category: String,
    pub status: IssueStatus,
}

/// Response of `GET /api/v1/issues/stats/summary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueStatsSummary {
    pub total_issues: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub resolved: u64,
    pub recent_week: u64,
    #[serde(default)]
    pub categories: Vec<CategoryCount>,
    #[serde(default)]
    pub top_issues: Vec<TopIssue>,
}

/// Response of `GET /api/stats` (platform-wide counters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformStats {
    pub total_issues: u64,
    pub pending_issues: u64,
    pub resolved_issues: u64,
    pub total_users: u64,
    pub total_officials: u64,
    #[serde(default)]
    pub categories: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sub_categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoriesResponse {
    pub categories: Vec<CategoryInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_summary_decodes_backend_shape() {
        let raw = serde_json::json!({
            "id": "6a1f",
            "user_id": "u-9",
            "title": "Streetlight out on Elm Road",
            "description": "Dark for a week now",
            "category": "electricity",
            "status": "in_progress",
            "upvotes": 14,
            "priority_score": 62.5,
            "comments": [],
            "photos": ["..."],
            "created_at": "2026-02-01T08:30:00Z",
            "updated_at": "2026-02-03T10:00:00Z"
        });
        let issue: IssueSummary = serde_json::from_value(raw).expect("decode issue");
        assert_eq!(issue.status, IssueStatus::InProgress);
        assert_eq!(issue.upvotes, 14);
        assert!(issue.sub_category.is_none());
    }

    #[test]
    fn platform_stats_decodes_category_map() {
        let raw = serde_json::json!({
            "total_issues": 120,
            "pending_issues": 50,
            "resolved_issues": 60,
            "total_users": 300,
            "total_officials": 12,
            "categories": { "roads": 40, "water": 25 }
        });
        let stats: PlatformStats = serde_json::from_value(raw).expect("decode stats");
        assert_eq!(stats.categories.get("roads"), Some(&40));
    }
}
