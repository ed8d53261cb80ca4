//! Catalog records as returned by the book-catalog provider.

use serde::{Deserialize, Deserializer, Serialize};

/// Shown when a record carries no usable cover image.
pub const PLACEHOLDER_COVER: &str = "/placeholder-book.svg";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_thumbnail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_links: Option<ImageLinks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratings_count: Option<u64>,
}

/// One catalog record. Never mutated after fetch, only replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogBook {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub volume_info: VolumeInfo,
}

impl CatalogBook {
    /// `averageRating × max(ratingsCount, 1)`, missing values read as 0 and 1.
    pub fn popularity_score(&self) -> f64 {
        let rating = self.volume_info.average_rating.unwrap_or(0.0);
        let count = self.volume_info.ratings_count.unwrap_or(0).max(1);
        rating * count as f64
    }

    /// Rewrite provider image links to the secure scheme.
    pub fn with_secure_images(mut self) -> Self {
        if let Some(links) = self.volume_info.image_links.as_mut() {
            links.thumbnail = links.thumbnail.take().map(|url| normalize_image_url(&url));
            links.small_thumbnail = links
                .small_thumbnail
                .take()
                .map(|url| normalize_image_url(&url));
        }
        self
    }

    /// Best available cover: thumbnail, then small thumbnail, then the placeholder.
    pub fn cover_url(&self) -> String {
        let links = self.volume_info.image_links.as_ref();
        links
            .and_then(|l| l.thumbnail.as_deref())
            .or_else(|| links.and_then(|l| l.small_thumbnail.as_deref()))
            .filter(|url| !url.is_empty())
            .map(normalize_image_url)
            .unwrap_or_else(|| PLACEHOLDER_COVER.to_string())
    }
}

/// A page of catalog results in the provider's `{items, totalItems}` shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    #[serde(default, deserialize_with = "described_records")]
    pub items: Vec<CatalogBook>,
    #[serde(default)]
    pub total_items: u64,
}

impl SearchResults {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<CatalogBook>) -> Self {
        let total_items = items.len() as u64;
        Self { items, total_items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn with_secure_images(self) -> Self {
        Self {
            items: self
                .items
                .into_iter()
                .map(CatalogBook::with_secure_images)
                .collect(),
            total_items: self.total_items,
        }
    }
}

pub fn normalize_image_url(url: &str) -> String {
    if url.starts_with("http://books.google") || url.starts_with("http://books.googleusercontent")
    {
        format!("https://{}", &url["http://".len()..])
    } else {
        url.to_string()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Provider records without a `volumeInfo` block carry nothing to show and are dropped.
fn described_records<'de, D>(deserializer: D) -> Result<Vec<CatalogBook>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Record {
        #[serde(default)]
        id: String,
        #[serde(default)]
        volume_info: Option<VolumeInfo>,
    }

    let records: Vec<Record> = null_as_default(deserializer)?;
    Ok(records
        .into_iter()
        .filter_map(|record| {
            record.volume_info.map(|volume_info| CatalogBook {
                id: record.id,
                volume_info,
            })
        })
        .collect())
}
