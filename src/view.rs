use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::models::{short_sha, HealthColor, PipelineInfo, ProjectStatus};

/// Dashboard times are shown in UTC+8.
const DISPLAY_OFFSET_SECS: i32 = 8 * 3600;
const SHORT_MESSAGE_CHARS: usize = 14;

/// Per-project row served to the dashboard, raw values next to display ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub id: u64,
    pub name: String,
    pub intro: String,
    pub branch: String,
    pub status_color: HealthColor,

    pub commit_sha: String,
    pub commit_short_sha: String,
    pub commit_author: String,
    pub commit_time_fmt: String,
    pub commit_message: String,
    pub commit_short_msg: String,
    pub ci: PipelineInfo,

    pub release_sha: String,
    pub release_short_sha: String,
    pub release_author: String,
    pub release_time_fmt: String,
    pub release_message: String,
    pub release_short_msg: String,
    pub release_ci: PipelineInfo,
}

impl From<&ProjectStatus> for StatusView {
    fn from(status: &ProjectStatus) -> Self {
        let dev = &status.development;
        let rel = &status.release;

        Self {
            id: status.id,
            name: status.name.clone(),
            intro: status.intro.clone(),
            branch: status.branch.clone(),
            status_color: status.status_color,

            commit_sha: dev.commit.sha.clone(),
            commit_short_sha: short_sha(&dev.commit.sha).to_string(),
            commit_author: dev.commit.author.clone(),
            commit_time_fmt: format_time(&dev.commit.created_at),
            commit_message: dev.commit.message.clone(),
            commit_short_msg: short_message(&dev.commit.message),
            ci: dev.pipeline.clone(),

            release_sha: rel.commit.sha.clone(),
            release_short_sha: short_sha(&rel.commit.sha).to_string(),
            release_author: rel.commit.author.clone(),
            release_time_fmt: format_time(&rel.commit.created_at),
            release_message: rel.commit.message.clone(),
            release_short_msg: short_message(&rel.commit.message),
            release_ci: rel.pipeline.clone(),
        }
    }
}

pub fn group_views(
    grouped: &BTreeMap<String, Vec<ProjectStatus>>,
) -> BTreeMap<String, Vec<StatusView>> {
    grouped
        .iter()
        .map(|(group, statuses)| (group.clone(), statuses.iter().map(StatusView::from).collect()))
        .collect()
}

/// RFC 3339 timestamp rendered as `YYYY-MM-DD HH:MM:SS` in the display zone.
/// Empty input renders as `-`, unparsable input is returned untouched.
pub fn format_time(raw: &str) -> String {
    if raw.is_empty() {
        return "-".to_string();
    }

    let Some(offset) = FixedOffset::east_opt(DISPLAY_OFFSET_SECS) else {
        return raw.to_string();
    };

    match DateTime::parse_from_rfc3339(raw) {
        Ok(time) => time
            .with_timezone(&offset)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Commit title cut to a fixed number of characters, never inside a
/// multi-byte character.
pub fn short_message(message: &str) -> String {
    match message.char_indices().nth(SHORT_MESSAGE_CHARS) {
        Some((end, _)) => format!("{}...", &message[..end]),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BranchStatus, CommitInfo};

    #[test]
    fn test_format_time_converts_to_display_zone() {
        assert_eq!(format_time("2024-05-01T08:00:00Z"), "2024-05-01 16:00:00");
        assert_eq!(
            format_time("2024-05-01T20:30:15+02:00"),
            "2024-05-02 02:30:15"
        );
    }

    #[test]
    fn test_format_time_empty_and_invalid() {
        assert_eq!(format_time(""), "-");
        assert_eq!(format_time("yesterday"), "yesterday");
    }

    #[test]
    fn test_short_message() {
        assert_eq!(short_message("short"), "short");
        assert_eq!(short_message("exactly 14 chr"), "exactly 14 chr");
        assert_eq!(
            short_message("fix rounding in invoice totals"),
            "fix rounding i..."
        );
    }

    #[test]
    fn test_short_message_multibyte() {
        let message = "修复发票合计金额的四舍五入问题并补充测试";

        assert_eq!(short_message(message), "修复发票合计金额的四舍五入问...");
    }

    #[test]
    fn test_view_from_status() {
        let status = ProjectStatus {
            id: 7,
            name: "billing".to_string(),
            status_color: HealthColor::Red,
            development: BranchStatus {
                commit: CommitInfo {
                    sha: "ffffffffffffffff".to_string(),
                    created_at: "2024-05-01T08:00:00Z".to_string(),
                    message: "fix rounding in invoice totals".to_string(),
                    ..CommitInfo::default()
                },
                pipeline: PipelineInfo {
                    id: 3,
                    status: "failed".to_string(),
                },
            },
            ..ProjectStatus::default()
        };

        let view = StatusView::from(&status);

        assert_eq!(view.commit_short_sha, "ffffffff");
        assert_eq!(view.commit_time_fmt, "2024-05-01 16:00:00");
        assert_eq!(view.commit_short_msg, "fix rounding i...");
        assert_eq!(view.ci.status, "failed");
        assert_eq!(view.release_time_fmt, "-");
        assert_eq!(view.release_short_sha, "");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status_color"], "red");
        assert_eq!(json["ci"]["id"], 3);
    }
}
