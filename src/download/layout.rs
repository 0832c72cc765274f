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


//! On-disk layout of downloaded media
//!
//! ```text
//! <root>/Movies/<title> - Part 2.mp3
//! <root>/Series/<series title>/S01E03 - <episode title>.mp3
//! <root>/Documentaries/<title>.mp3
//! <root>/ShortFilms/<title>.m4a
//! ```

use crate::content::{ContentType, NO_INDEX};
use crate::storage::DownloadRequest;
use regex::Regex;
use std::path::{Path, PathBuf};

const DEFAULT_EXTENSION: &str = "mp3";
const MAX_COMPONENT_CHARS: usize = 120;
const PARTIAL_SUFFIX: &str = "part";

lazy_static::lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r#"[/\\:*?"<>|\x00-\x1F\x7F]"#).expect("valid regex");
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").expect("valid regex");
}

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder for a content type; series are nested under their title
    pub fn directory_for(&self, content_type: ContentType, series_title: Option<&str>) -> PathBuf {
        let dir = self.root.join(content_type.folder_name());
        match (content_type, series_title) {
            (ContentType::Series, Some(title)) => dir.join(sanitize_component(title)),
            _ => dir,
        }
    }

    /// Final location of a downloaded unit
    pub fn file_path_for(&self, request: &DownloadRequest) -> PathBuf {
        let content = &request.content;
        let stem = match content.content_type {
            ContentType::Movie if content.part_index != NO_INDEX => {
                format!("{} - Part {}", request.title, content.part_index + 1)
            }
            ContentType::Series if content.part_index != NO_INDEX && content.episode_index != NO_INDEX => {
                format!(
                    "S{:02}E{:02} - {}",
                    content.part_index + 1,
                    content.episode_index + 1,
                    request.title
                )
            }
            _ => request.title.clone(),
        };

        let file_name = format!("{}.{}", sanitize_component(&stem), extension_from_url(&request.url));
        self.directory_for(content.content_type, request.series_title.as_deref())
            .join(file_name)
    }

    /// Where bytes are written until the transfer succeeds
    pub fn partial_path(final_path: &Path) -> PathBuf {
        let mut name = final_path.as_os_str().to_os_string();
        name.push(".");
        name.push(PARTIAL_SUFFIX);
        PathBuf::from(name)
    }
}

/// Make a single path component safe on every platform
///
/// Whitespace runs (tabs and newlines included) become one space before
/// `/ \ : * ? " < > |` and the remaining control characters are stripped.
/// Dots and spaces are trimmed at the ends. Never returns an empty string.
pub fn sanitize_component(name: &str) -> String {
    let spaced = WHITESPACE_RUN.replace_all(name, " ");
    let stripped = UNSAFE_CHARS.replace_all(&spaced, "");
    let collapsed = WHITESPACE_RUN.replace_all(&stripped, " ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c.is_whitespace());

    let truncated: String = trimmed.chars().take(MAX_COMPONENT_CHARS).collect();
    let truncated = truncated.trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated.to_string()
    }
}

/// File extension of the URL path, lowercase, `mp3` when absent or odd
pub fn extension_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .and_then(|last| {
            Path::new(&last)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase)
        })
        .filter(|ext| (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
