//! Merge, deduplicate and rank books collected from several queries.

use std::collections::HashSet;

use crate::models::CatalogBook;

/// Curated subject queries: broad, and unlikely to trip provider abuse heuristics.
pub const DEFAULT_TRENDING_QUERIES: [&str; 3] = [
    "subject:fiction bestseller",
    "subject:biography popular",
    "subject:science new",
];

/// Broad query tried once when every curated query came back empty.
pub const DEFAULT_FALLBACK_QUERY: &str = "popular books";

/// Keep the first occurrence of each id, preserving order. Records without an id are dropped.
pub fn dedup_by_id(books: Vec<CatalogBook>) -> Vec<CatalogBook> {
    let mut seen = HashSet::new();
    books
        .into_iter()
        .filter(|book| !book.id.is_empty() && seen.insert(book.id.clone()))
        .collect()
}

/// Stable descending sort by popularity score.
pub fn sort_by_popularity(books: &mut [CatalogBook]) {
    books.sort_by(|a, b| b.popularity_score().total_cmp(&a.popularity_score()));
}

/// Deduplicate, rank and truncate to `limit`.
pub fn rank(books: Vec<CatalogBook>, limit: usize) -> Vec<CatalogBook> {
    let mut unique = dedup_by_id(books);
    sort_by_popularity(&mut unique);
    unique.truncate(limit);
    unique
}

/// Per-query result cap so that all queries together can fill `limit`.
pub fn per_query_limit(limit: usize, query_count: usize) -> usize {
    limit.div_ceil(query_count.max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VolumeInfo;

    fn book(id: &str, title: &str, rating: Option<f64>, count: Option<u64>) -> CatalogBook {
        CatalogBook {
            id: id.to_string(),
            volume_info: VolumeInfo {
                title: title.to_string(),
                average_rating: rating,
                ratings_count: count,
                ..VolumeInfo::default()
            },
        }
    }

    #[test]
    fn test_first_occurrence_wins() {
        let books = vec![
            book("a", "first a", Some(3.0), Some(10)),
            book("b", "b", Some(4.0), Some(1)),
            book("a", "second a", Some(5.0), Some(1000)),
        ];

        let unique = dedup_by_id(books);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].volume_info.title, "first a");
    }

    #[test]
    fn test_records_without_id_dropped() {
        let unique = dedup_by_id(vec![book("", "ghost", Some(5.0), Some(10)), book("x", "x", None, None)]);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].id, "x");
    }

    #[test]
    fn test_rank_orders_by_score_descending() {
        let books = vec![
            book("low", "low", Some(2.0), Some(1)),
            book("unrated", "unrated", None, None),
            book("high", "high", Some(4.5), Some(200)),
            book("mid", "mid", Some(4.0), Some(10)),
        ];

        let ranked = rank(books, 10);
        let ids: Vec<&str> = ranked.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low", "unrated"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let books = vec![
            book("first", "first", Some(4.0), None),
            book("second", "second", Some(2.0), Some(2)),
            book("third", "third", Some(4.0), Some(1)),
        ];

        let ids: Vec<String> = rank(books, 10).into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_rank_truncates() {
        let books = (0..10)
            .map(|i| book(&format!("id-{i}"), "t", Some(i as f64), Some(1)))
            .collect();
        let ranked = rank(books, 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].id, "id-9");
    }

    #[test]
    fn test_per_query_limit() {
        assert_eq!(per_query_limit(20, 3), 7);
        assert_eq!(per_query_limit(6, 3), 2);
        assert_eq!(per_query_limit(1, 3), 1);
        assert_eq!(per_query_limit(5, 0), 5);
    }
}
