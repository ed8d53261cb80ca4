//! Review, wishlist and reading-list data behind the dashboard.
//!
//! Durable storage lives outside this service; [`DashboardStore`] is the seam
//! and [`MemoryStore`] is the in-process implementation.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio::sync::RwLock;

use crate::error::StoreError;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingStats {
    pub total_reviews: u64,
    /// Rounded to one decimal.
    pub average_rating: f64,
    pub books_this_month: u64,
    pub books_this_year: u64,
    pub favorite_genres: Vec<String>,
    pub reading_streak: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Review,
    Wishlist,
    ReadingList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentActivity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub book_title: String,
    pub book_author: String,
    pub book_cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub created_at: DateTime<Utc>,
}

/// Locally kept metadata for a book a user interacted with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookRef {
    pub title: Option<String>,
    pub author: Option<String>,
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRecord {
    pub id: String,
    pub user_id: String,
    pub rating: u8,
    pub created_at: DateTime<Utc>,
    pub book: Option<BookRef>,
}

/// A wishlist or reading-list entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ShelfRecord {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub book: Option<BookRef>,
}

#[async_trait]
pub trait DashboardStore: Send + Sync {
    async fn reading_stats(&self, user_id: &str) -> Result<ReadingStats, StoreError>;

    async fn recent_activity(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RecentActivity>, StoreError>;
}

pub fn compute_stats(reviews: &[ReviewRecord], now: DateTime<Utc>) -> ReadingStats {
    if reviews.is_empty() {
        return ReadingStats::default();
    }

    let total = reviews.len() as u64;
    let sum: u64 = reviews.iter().map(|r| u64::from(r.rating)).sum();
    let average_rating = (sum as f64 / total as f64 * 10.0).round() / 10.0;

    let today = now.date_naive();
    let this_year = reviews
        .iter()
        .filter(|r| r.created_at.year() == today.year())
        .count() as u64;
    let this_month = reviews
        .iter()
        .filter(|r| r.created_at.year() == today.year() && r.created_at.month() == today.month())
        .count() as u64;

    ReadingStats {
        total_reviews: total,
        average_rating,
        books_this_month: this_month,
        books_this_year: this_year,
        favorite_genres: Vec::new(),
        reading_streak: reading_streak(reviews.iter().map(|r| r.created_at.date_naive()), today),
    }
}

/// Consecutive days with at least one review, counting back from `today`.
/// No review today means no streak.
pub fn reading_streak(dates: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = dates.into_iter().collect();

    let mut streak = 0;
    let mut expected = today;
    for day in days.iter().rev().filter(|d| **d <= today) {
        if *day != expected {
            break;
        }
        streak += 1;
        match expected.pred_opt() {
            Some(previous) => expected = previous,
            None => break,
        }
    }
    streak
}

fn activity(
    id: &str,
    kind: ActivityKind,
    book: Option<&BookRef>,
    rating: Option<u8>,
    created_at: DateTime<Utc>,
) -> RecentActivity {
    RecentActivity {
        id: id.to_string(),
        kind,
        book_title: book
            .and_then(|b| b.title.clone())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        book_author: book
            .and_then(|b| b.author.clone())
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        book_cover: book.and_then(|b| b.cover_url.clone()),
        rating,
        created_at,
    }
}

/// Newest first, at most `limit` entries across all three sources.
pub fn merge_activity(
    reviews: &[ReviewRecord],
    wishlist: &[ShelfRecord],
    reading_list: &[ShelfRecord],
    limit: usize,
) -> Vec<RecentActivity> {
    let mut merged: Vec<RecentActivity> = reviews
        .iter()
        .map(|r| activity(&r.id, ActivityKind::Review, r.book.as_ref(), Some(r.rating), r.created_at))
        .chain(
            wishlist
                .iter()
                .map(|w| activity(&w.id, ActivityKind::Wishlist, w.book.as_ref(), None, w.created_at)),
        )
        .chain(reading_list.iter().map(|r| {
            activity(&r.id, ActivityKind::ReadingList, r.book.as_ref(), None, r.created_at)
        }))
        .collect();

    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    merged.truncate(limit);
    merged
}

#[derive(Default)]
pub struct MemoryStore {
    reviews: RwLock<Vec<ReviewRecord>>,
    wishlist: RwLock<Vec<ShelfRecord>>,
    reading_list: RwLock<Vec<ShelfRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_review(&self, review: ReviewRecord) {
        self.reviews.write().await.push(review);
    }

    pub async fn add_to_wishlist(&self, item: ShelfRecord) {
        self.wishlist.write().await.push(item);
    }

    pub async fn add_to_reading_list(&self, item: ShelfRecord) {
        self.reading_list.write().await.push(item);
    }

    async fn reviews_for(&self, user_id: &str) -> Vec<ReviewRecord> {
        self.reviews
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    async fn shelf_for(shelf: &RwLock<Vec<ShelfRecord>>, user_id: &str) -> Vec<ShelfRecord> {
        shelf
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DashboardStore for MemoryStore {
    async fn reading_stats(&self, user_id: &str) -> Result<ReadingStats, StoreError> {
        let reviews = self.reviews_for(user_id).await;
        Ok(compute_stats(&reviews, Utc::now()))
    }

    async fn recent_activity(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RecentActivity>, StoreError> {
        let reviews = self.reviews_for(user_id).await;
        let wishlist = Self::shelf_for(&self.wishlist, user_id).await;
        let reading_list = Self::shelf_for(&self.reading_list, user_id).await;
        Ok(merge_activity(&reviews, &wishlist, &reading_list, limit))
    }
}
