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


//! Playlist construction
//!
//! Every item carries its [`ContentRef`] in `extras`, so the unit identity
//! survives the trip through the platform player and comes back on each
//! media item transition.

use crate::content::{CatalogItem, ContentRef, ContentType, MediaLink};
use crate::error::Result;
use crate::net::Credentials;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPlaylistItem {
    pub uri: String,
    pub mime_type: String,
    pub title: String,
    pub subtitle: Option<String>,
    /// Player metadata bundle; holds the embedded ContentRef
    pub extras: HashMap<String, String>,
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
}

impl MediaPlaylistItem {
    pub fn new(uri: impl Into<String>, title: impl Into<String>, content: &ContentRef) -> Self {
        let uri = uri.into();
        Self {
            mime_type: guess_mime_type(&uri).to_string(),
            uri,
            title: title.into(),
            subtitle: None,
            extras: content.to_extras(),
            request_headers: HashMap::new(),
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_authorization(mut self, credentials: &Credentials) -> Self {
        self.request_headers
            .insert(AUTHORIZATION.as_str().to_string(), credentials.authorization_header());
        self
    }

    pub fn content_ref(&self) -> Result<ContentRef> {
        ContentRef::from_extras(&self.extras)
    }
}

/// Ordered playlist for one catalog entry
///
/// Movies yield one item per part, series one item per episode ordered by
/// season then episode, documentaries and short films a single item.
pub fn build_playlist(item: &CatalogItem) -> Vec<MediaPlaylistItem> {
    match item {
        CatalogItem::Movie(movie) => movie
            .parts
            .iter()
            .enumerate()
            .map(|(index, part)| {
                let content = ContentRef::movie_part(&movie.id, index as i32);
                let mut playlist_item = link_item(part, &movie.title, &content);
                if movie.parts.len() > 1 {
                    playlist_item = playlist_item.with_subtitle(format!("Part {}", index + 1));
                }
                playlist_item
            })
            .collect(),
        CatalogItem::Series(series) => series
            .ordered_seasons()
            .into_iter()
            .enumerate()
            .flat_map(|(season_index, (season_key, episodes))| {
                episodes.iter().enumerate().map(move |(episode_index, episode)| {
                    let content = ContentRef::episode(&series.id, season_index as i32, episode_index as i32);
                    MediaPlaylistItem::new(&episode.url, &episode.title, &content)
                        .with_subtitle(format!("T{}:E{}", season_key, episode_index + 1))
                })
            })
            .collect(),
        CatalogItem::Documentary(doc) => {
            let content = ContentRef::single(&doc.id, ContentType::Documentary);
            vec![link_item(&doc.link, &doc.title, &content)]
        }
        CatalogItem::ShortFilm(short) => {
            let content = ContentRef::single(&short.id, ContentType::ShortFilm);
            vec![link_item(&short.link, &short.title, &content)]
        }
    }
}

/// Same as [`build_playlist`], with the Basic auth header on every item
pub fn build_authorized_playlist(item: &CatalogItem, credentials: Option<&Credentials>) -> Vec<MediaPlaylistItem> {
    let playlist = build_playlist(item);
    match credentials {
        Some(credentials) => playlist
            .into_iter()
            .map(|entry| entry.with_authorization(credentials))
            .collect(),
        None => playlist,
    }
}

fn link_item(link: &MediaLink, fallback_title: &str, content: &ContentRef) -> MediaPlaylistItem {
    let title = link.title.as_deref().unwrap_or(fallback_title);
    let item = MediaPlaylistItem::new(&link.url, title, content);
    match &link.mime_type {
        Some(mime_type) => item.with_mime_type(mime_type),
        None => item,
    }
}

/// Index of the requested unit in the playlist
///
/// Non-series content falls back to `part_index` as a plain position when no
/// item matches; anything else starts from the first item.
pub fn resolve_start_index(
    items: &[MediaPlaylistItem],
    content_type: ContentType,
    part_index: i32,
    episode_index: i32,
) -> usize {
    let matched = items.iter().position(|item| {
        item.content_ref()
            .map(|c| c.part_index == part_index && c.episode_index == episode_index)
            .unwrap_or(false)
    });

    matched.unwrap_or_else(|| match content_type {
        ContentType::Series => 0,
        _ => usize::try_from(part_index)
            .ok()
            .filter(|index| *index < items.len())
            .unwrap_or(0),
    })
}

/// MIME type from the URL's file extension; MP3 when unknown
pub fn guess_mime_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("m4a") | Some("mp4") | Some("aac") => "audio/mp4",
        Some("ogg") | Some("oga") | Some("opus") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("m3u8") => "application/x-mpegURL",
        _ => "audio/mpeg",
    }
}
