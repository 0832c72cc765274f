// Audiocine - Audio description cinema for mobile
// Copyright (C) 2025 Audiocine contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Downloads list as shown in the UI: one group per content item

use crate::content::ContentType;
use crate::storage::{DownloadRecord, DownloadStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadGroup {
    pub content_id: String,
    pub content_type: ContentType,
    /// Series title for series, otherwise the item title
    pub title: String,
    /// Ordered by (part, episode)
    pub tasks: Vec<DownloadRecord>,
}

impl DownloadGroup {
    /// Status of the group as a whole
    ///
    /// Active work wins over failures, failures over completion.
    pub fn status(&self) -> DownloadStatus {
        let any = |status: DownloadStatus| self.tasks.iter().any(|t| t.status == status);
        if any(DownloadStatus::Downloading) {
            DownloadStatus::Downloading
        } else if any(DownloadStatus::Queued) {
            DownloadStatus::Queued
        } else if any(DownloadStatus::Failed) {
            DownloadStatus::Failed
        } else {
            DownloadStatus::Complete
        }
    }

    pub fn total_size_mb(&self) -> f64 {
        self.tasks.iter().map(|t| t.total_size_mb).sum()
    }

    pub fn completed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == DownloadStatus::Complete)
            .count()
    }
}

/// Group records by content id, keeping the order groups first appear in
pub fn group_tasks(records: Vec<DownloadRecord>) -> Vec<DownloadGroup> {
    let mut groups: Vec<DownloadGroup> = Vec::new();

    for record in records {
        match groups
            .iter_mut()
            .find(|g| g.content_id == record.content.content_id)
        {
            Some(group) => group.tasks.push(record),
            None => {
                let title = match record.content.content_type {
                    ContentType::Series => record
                        .series_title
                        .clone()
                        .unwrap_or_else(|| record.title.clone()),
                    _ => record.title.clone(),
                };
                groups.push(DownloadGroup {
                    content_id: record.content.content_id.clone(),
                    content_type: record.content.content_type,
                    title,
                    tasks: vec![record],
                });
            }
        }
    }

    for group in &mut groups {
        group
            .tasks
            .sort_by_key(|t| (t.content.part_index, t.content.episode_index));
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentRef;
    use chrono::Utc;

    fn record(content: ContentRef, title: &str, series: Option<&str>, status: DownloadStatus) -> DownloadRecord {
        DownloadRecord {
            content,
            title: title.to_string(),
            series_title: series.map(str::to_string),
            source_url: "https://cdn.example.com/x.mp3".to_string(),
            status,
            file_path: None,
            downloaded_at: None,
            total_size_mb: 1.5,
            duration_ms: 0,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_series_grouped_with_nested_episodes() {
        let groups = group_tasks(vec![
            record(ContentRef::episode("s1", 1, 0), "S2 E1", Some("Show"), DownloadStatus::Complete),
            record(ContentRef::movie_part("m1", 0), "Film", None, DownloadStatus::Complete),
            record(ContentRef::episode("s1", 0, 1), "S1 E2", Some("Show"), DownloadStatus::Queued),
            record(ContentRef::episode("s1", 0, 0), "S1 E1", Some("Show"), DownloadStatus::Failed),
        ]);

        assert_eq!(groups.len(), 2);
        let series = &groups[0];
        assert_eq!(series.title, "Show");
        let order: Vec<&str> = series.tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(order, vec!["S1 E1", "S1 E2", "S2 E1"]);
        assert_eq!(series.status(), DownloadStatus::Queued);
        assert_eq!(series.completed_count(), 1);
        assert_eq!(series.total_size_mb(), 4.5);

        assert_eq!(groups[1].title, "Film");
        assert_eq!(groups[1].status(), DownloadStatus::Complete);
    }
}
