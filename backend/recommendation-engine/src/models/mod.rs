use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;

pub type UserId = String;
pub type ItemId = String;

/// One user-item interaction row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub rating: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub review_text: Option<String>,
    #[serde(default)]
    pub helpful_votes: u32,
    #[serde(default)]
    pub verified_purchase: bool,
    /// Item attribute used by diversity re-ranking
    #[serde(default)]
    pub category: Option<String>,
}

impl Interaction {
    pub fn new(
        user_id: impl Into<UserId>,
        item_id: impl Into<ItemId>,
        rating: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: item_id.into(),
            rating,
            timestamp,
            review_text: None,
            helpful_votes: 0,
            verified_purchase: false,
            category: None,
        }
    }

    pub fn with_review(mut self, text: impl Into<String>) -> Self {
        self.review_text = Some(text.into());
        self
    }

    pub fn with_helpful_votes(mut self, votes: u32) -> Self {
        self.helpful_votes = votes;
        self
    }

    pub fn with_verified_purchase(mut self, verified: bool) -> Self {
        self.verified_purchase = verified;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    /// Meteorological seasons (northern hemisphere), month in 1..=12
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        }
    }
}

/// Features derived per interaction during preprocessing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedFeatures {
    pub hour: u8,
    /// 0 = Monday, 6 = Sunday
    pub day_of_week: u8,
    pub month: u8,
    pub is_weekend: bool,
    pub season: Season,
    /// Character count, 0 when the review text is missing
    pub review_length: usize,
    /// Always within [0, 1]
    pub engagement_score: f64,
}

/// Working copy of an interaction with its derived features
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedInteraction {
    pub interaction: Interaction,
    pub features: DerivedFeatures,
}

/// Key of a context bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextKey {
    /// Present only for day-of-week x hour granularity
    pub day_of_week: Option<u8>,
    pub hour: u8,
}

impl ContextKey {
    pub fn hourly(hour: u8) -> Self {
        Self {
            day_of_week: None,
            hour,
        }
    }

    pub fn weekly(day_of_week: u8, hour: u8) -> Self {
        Self {
            day_of_week: Some(day_of_week),
            hour,
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.day_of_week {
            Some(day) => write!(f, "d{}h{:02}", day, self.hour),
            None => write!(f, "h{:02}", self.hour),
        }
    }
}

/// Ordered, duplicate-free list of recommended items
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RecommendationList {
    items: Vec<ItemId>,
}

impl RecommendationList {
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }
}

impl Deref for RecommendationList {
    type Target = [ItemId];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl IntoIterator for RecommendationList {
    type Item = ItemId;
    type IntoIter = std::vec::IntoIter<ItemId>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Builds a `RecommendationList`, dropping duplicates and stopping at the limit
#[derive(Debug)]
pub struct ListBuilder {
    items: Vec<ItemId>,
    seen: HashSet<ItemId>,
    limit: usize,
}

impl ListBuilder {
    pub fn new(limit: usize) -> Self {
        Self {
            items: Vec::with_capacity(limit.min(1024)),
            seen: HashSet::new(),
            limit,
        }
    }

    /// Returns true if the item was appended
    pub fn push(&mut self, item: &str) -> bool {
        if self.is_full() || self.seen.contains(item) {
            return false;
        }
        self.seen.insert(item.to_string());
        self.items.push(item.to_string());
        true
    }

    /// Append items in order until the list is full
    pub fn extend<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for item in items {
            if self.is_full() {
                break;
            }
            self.push(item.as_ref());
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.limit
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn finish(self) -> RecommendationList {
        RecommendationList { items: self.items }
    }
}

/// Which ranked structure produced a prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RankingSource {
    Segment(usize),
    Context(ContextKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FallbackReason {
    /// User absent from training data
    ColdStartUser,
    /// User known but below `min_interactions`
    InsufficientHistory,
    /// Context bucket has no training entries
    UnseenContext,
}

/// Output of an upstream predictor, tagged with the path that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Prediction {
    Ranked {
        items: RecommendationList,
        source: RankingSource,
        /// Trailing items padded from global popularity
        backfilled: usize,
    },
    Fallback {
        items: RecommendationList,
        reason: FallbackReason,
    },
}

impl Prediction {
    pub fn items(&self) -> &RecommendationList {
        match self {
            Prediction::Ranked { items, .. } | Prediction::Fallback { items, .. } => items,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Prediction::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            Prediction::Fallback { reason, .. } => Some(*reason),
            Prediction::Ranked { .. } => None,
        }
    }
}

/// Fused item produced by the integration module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem {
    pub item_id: ItemId,
    pub score: f64,
    /// Weighted share of sources that proposed the item, in [0, 1]
    pub confidence: f64,
    pub confident: bool,
    /// Lowest 0-indexed rank across both source lists
    pub best_rank: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_builder_drops_duplicates_and_respects_limit() {
        let mut builder = ListBuilder::new(3);
        assert!(builder.push("a"));
        assert!(!builder.push("a"));
        builder.extend(["b", "a", "c", "d"]);

        let list = builder.finish();
        assert_eq!(list.items(), ["a", "b", "c"]);
    }

    #[test]
    fn test_zero_limit_builds_empty_list() {
        let mut builder = ListBuilder::new(0);
        builder.extend(["a", "b"]);
        assert!(builder.finish().is_empty());
    }

    #[test]
    fn test_season_mapping() {
        assert_eq!(Season::from_month(1), Season::Winter);
        assert_eq!(Season::from_month(4), Season::Spring);
        assert_eq!(Season::from_month(7), Season::Summer);
        assert_eq!(Season::from_month(10), Season::Autumn);
        assert_eq!(Season::from_month(12), Season::Winter);
    }

    #[test]
    fn test_context_key_display() {
        assert_eq!(ContextKey::hourly(8).to_string(), "h08");
        assert_eq!(ContextKey::weekly(2, 22).to_string(), "d2h22");
    }
}
