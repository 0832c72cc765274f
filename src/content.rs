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


//! Content identity and catalog model
//!
//! A catalog item is one of four closed kinds. Every playable unit inside an
//! item is addressed by a [`ContentRef`]:
//!
//! | Kind        | part_index                        | episode_index       |
//! |-------------|-----------------------------------|---------------------|
//! | Movie       | segment index (0-based)           | -1                  |
//! | Series      | season position, ascending (0-based) | episode position (0-based) |
//! | Documentary | -1                                | -1                  |
//! | ShortFilm   | -1                                | -1                  |
//!
//! The catalog itself is fetched and parsed elsewhere; this module only
//! defines the shape the core consumes through [`CatalogRepository`].

use crate::error::{AudiocineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Sentinel for "index does not apply to this kind"
pub const NO_INDEX: i32 = -1;

pub mod extras_keys {
    pub const CONTENT_ID: &str = "contentId";
    pub const CONTENT_TYPE: &str = "contentType";
    pub const PART_INDEX: &str = "partIndex";
    pub const EPISODE_INDEX: &str = "episodeIndex";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Series,
    Documentary,
    ShortFilm,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Series => "series",
            ContentType::Documentary => "documentary",
            ContentType::ShortFilm => "shortfilm",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Some(ContentType::Movie),
            "series" => Some(ContentType::Series),
            "documentary" => Some(ContentType::Documentary),
            "shortfilm" | "short_film" => Some(ContentType::ShortFilm),
            _ => None,
        }
    }

    /// Sub-folder name under the download root
    pub fn folder_name(&self) -> &'static str {
        match self {
            ContentType::Movie => "Movies",
            ContentType::Series => "Series",
            ContentType::Documentary => "Documentaries",
            ContentType::ShortFilm => "ShortFilms",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one playable unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub content_id: String,
    pub content_type: ContentType,
    pub part_index: i32,
    pub episode_index: i32,
}

/// Composite key (content_id, part_index, episode_index)
pub type UnitKey = (String, i32, i32);

impl ContentRef {
    pub fn new(content_id: impl Into<String>, content_type: ContentType, part_index: i32, episode_index: i32) -> Self {
        Self {
            content_id: content_id.into(),
            content_type,
            part_index,
            episode_index,
        }
    }

    pub fn movie_part(content_id: impl Into<String>, part_index: i32) -> Self {
        Self::new(content_id, ContentType::Movie, part_index, NO_INDEX)
    }

    pub fn episode(content_id: impl Into<String>, season_index: i32, episode_index: i32) -> Self {
        Self::new(content_id, ContentType::Series, season_index, episode_index)
    }

    pub fn single(content_id: impl Into<String>, content_type: ContentType) -> Self {
        Self::new(content_id, content_type, NO_INDEX, NO_INDEX)
    }

    pub fn unit_key(&self) -> UnitKey {
        (self.content_id.clone(), self.part_index, self.episode_index)
    }

    /// True when both refs address the same playable unit
    pub fn same_unit(&self, other: &ContentRef) -> bool {
        self.content_id == other.content_id
            && self.part_index == other.part_index
            && self.episode_index == other.episode_index
    }

    /// Player metadata bundle carrying this identity
    pub fn to_extras(&self) -> HashMap<String, String> {
        let mut extras = HashMap::with_capacity(4);
        extras.insert(extras_keys::CONTENT_ID.to_string(), self.content_id.clone());
        extras.insert(extras_keys::CONTENT_TYPE.to_string(), self.content_type.as_str().to_string());
        extras.insert(extras_keys::PART_INDEX.to_string(), self.part_index.to_string());
        extras.insert(extras_keys::EPISODE_INDEX.to_string(), self.episode_index.to_string());
        extras
    }

    /// Read back an identity written by [`ContentRef::to_extras`]
    ///
    /// Missing indices read as [`NO_INDEX`]; a missing id or unknown type is
    /// an error because the unit can no longer be attributed.
    pub fn from_extras(extras: &HashMap<String, String>) -> Result<Self> {
        let content_id = extras
            .get(extras_keys::CONTENT_ID)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AudiocineError::invalid_input("media item has no contentId"))?;

        let type_code = extras
            .get(extras_keys::CONTENT_TYPE)
            .ok_or_else(|| AudiocineError::invalid_input("media item has no contentType"))?;
        let content_type = ContentType::from_str(type_code)
            .ok_or_else(|| AudiocineError::invalid_input(format!("unknown content type '{}'", type_code)))?;

        let part_index = match extras.get(extras_keys::PART_INDEX) {
            Some(value) => value.parse::<i32>()?,
            None => NO_INDEX,
        };
        let episode_index = match extras.get(extras_keys::EPISODE_INDEX) {
            Some(value) => value.parse::<i32>()?,
            None => NO_INDEX,
        };

        Ok(Self::new(content_id.clone(), content_type, part_index, episode_index))
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}[{},{}]",
            self.content_type, self.content_id, self.part_index, self.episode_index
        )
    }
}

// ---------------------------------------------------------------------------
// Catalog model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaLink {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl MediaLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            mime_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: String,
    pub title: String,
    pub parts: Vec<MediaLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: String,
    pub title: String,
    /// Season key ("1", "2", ...) to episodes in broadcast order
    pub seasons: BTreeMap<String, Vec<Episode>>,
}

impl Series {
    /// Seasons in ascending order, numeric keys compared as numbers
    pub fn ordered_seasons(&self) -> Vec<(&str, &[Episode])> {
        let mut seasons: Vec<(&str, &[Episode])> = self
            .seasons
            .iter()
            .map(|(key, episodes)| (key.as_str(), episodes.as_slice()))
            .collect();
        seasons.sort_by(|(a, _), (b, _)| compare_season_keys(a, b));
        seasons
    }

    /// Season key at a 0-based position in ascending order
    pub fn season_key_at(&self, part_index: i32) -> Option<&str> {
        usize::try_from(part_index)
            .ok()
            .and_then(|i| self.ordered_seasons().get(i).map(|(key, _)| *key))
    }
}

/// "2" < "10"; non-numeric keys sort after numeric ones, lexicographically
pub fn compare_season_keys(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u32>(), b.trim().parse::<u32>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Documentary {
    pub id: String,
    pub title: String,
    pub link: MediaLink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortFilm {
    pub id: String,
    pub title: String,
    pub link: MediaLink,
}

/// One catalog entry of any kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogItem {
    Movie(Movie),
    Series(Series),
    Documentary(Documentary),
    ShortFilm(ShortFilm),
}

impl CatalogItem {
    pub fn id(&self) -> &str {
        match self {
            CatalogItem::Movie(m) => &m.id,
            CatalogItem::Series(s) => &s.id,
            CatalogItem::Documentary(d) => &d.id,
            CatalogItem::ShortFilm(s) => &s.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            CatalogItem::Movie(m) => &m.title,
            CatalogItem::Series(s) => &s.title,
            CatalogItem::Documentary(d) => &d.title,
            CatalogItem::ShortFilm(s) => &s.title,
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            CatalogItem::Movie(_) => ContentType::Movie,
            CatalogItem::Series(_) => ContentType::Series,
            CatalogItem::Documentary(_) => ContentType::Documentary,
            CatalogItem::ShortFilm(_) => ContentType::ShortFilm,
        }
    }

    /// Number of playable units
    pub fn unit_count(&self) -> usize {
        match self {
            CatalogItem::Movie(m) => m.parts.len(),
            CatalogItem::Series(s) => s.seasons.values().map(Vec::len).sum(),
            CatalogItem::Documentary(_) | CatalogItem::ShortFilm(_) => 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogResponse {
    #[serde(default)]
    pub movies: Vec<Movie>,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub documentaries: Vec<Documentary>,
    #[serde(default)]
    pub short_films: Vec<ShortFilm>,
}

impl CatalogResponse {
    pub fn find(&self, content_id: &str, content_type: ContentType) -> Option<CatalogItem> {
        match content_type {
            ContentType::Movie => self
                .movies
                .iter()
                .find(|m| m.id == content_id)
                .cloned()
                .map(CatalogItem::Movie),
            ContentType::Series => self
                .series
                .iter()
                .find(|s| s.id == content_id)
                .cloned()
                .map(CatalogItem::Series),
            ContentType::Documentary => self
                .documentaries
                .iter()
                .find(|d| d.id == content_id)
                .cloned()
                .map(CatalogItem::Documentary),
            ContentType::ShortFilm => self
                .short_films
                .iter()
                .find(|s| s.id == content_id)
                .cloned()
                .map(CatalogItem::ShortFilm),
        }
    }
}

/// Source of the content catalog (network + cache live outside the core)
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// `None` when no catalog has been fetched or cached yet
    async fn get_catalog(&self) -> Result<Option<CatalogResponse>>;
}

/// Fixed in-memory catalog, used by the CLI and tests
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    catalog: Option<CatalogResponse>,
}

impl StaticCatalog {
    pub fn new(catalog: CatalogResponse) -> Self {
        Self { catalog: Some(catalog) }
    }

    pub fn empty() -> Self {
        Self { catalog: None }
    }
}

#[async_trait]
impl CatalogRepository for StaticCatalog {
    async fn get_catalog(&self) -> Result<Option<CatalogResponse>> {
        Ok(self.catalog.clone())
    }
}

/// Look up the catalog item a stored ref points at
///
/// A ref whose item was removed by a catalog update resolves to
/// `ContentNotFound` so the caller can show a not-found state.
pub async fn resolve_item<R>(repository: &R, content_id: &str, content_type: ContentType) -> Result<CatalogItem>
where
    R: CatalogRepository + ?Sized,
{
    let catalog = repository
        .get_catalog()
        .await?
        .ok_or_else(|| AudiocineError::CatalogUnavailable("no catalog loaded".to_string()))?;

    catalog
        .find(content_id, content_type)
        .ok_or_else(|| AudiocineError::ContentNotFound {
            content_id: content_id.to_string(),
            content_type: content_type.as_str().to_string(),
        })
}
