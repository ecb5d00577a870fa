// ============================================
// Interaction Feature Derivation
// ============================================
//
// Shared by the behavioral profiler and the context engine:
// 1. Temporal features (hour, day of week, month, weekend, season)
// 2. Review length (characters, 0 when the text is missing)
// 3. Engagement score in [0, 1]
//
// Engagement score:
//   0.4 * helpful_votes / max(helpful_votes)
// + 0.3 * review_length / max(review_length)
// + 0.2 * verified_purchase
// + 0.1 * rating polarity
//
// Rating polarity is |rating - midpoint| / half-range, so a neutral rating
// contributes 0 and either end of the scale contributes 1.

use crate::config::BehavioralConfig;
use crate::models::{DerivedFeatures, EnrichedInteraction, Interaction, Season};
use crate::utils::normalize_by_max;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

pub const HELPFUL_VOTES_WEIGHT: f64 = 0.4;
pub const REVIEW_LENGTH_WEIGHT: f64 = 0.3;
pub const VERIFIED_PURCHASE_WEIGHT: f64 = 0.2;
pub const RATING_POLARITY_WEIGHT: f64 = 0.1;

/// Calendar context of a timestamp (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeContext {
    pub hour: u8,
    /// 0 = Monday, 6 = Sunday
    pub day_of_week: u8,
    pub month: u8,
    pub is_weekend: bool,
    pub season: Season,
}

impl TimeContext {
    pub fn from_timestamp(timestamp: &DateTime<Utc>) -> Self {
        let day_of_week = timestamp.weekday().num_days_from_monday() as u8;
        let month = timestamp.month();

        Self {
            hour: timestamp.hour() as u8,
            day_of_week,
            month: month as u8,
            is_weekend: day_of_week >= 5,
            season: Season::from_month(month),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingScale {
    pub min: f64,
    pub max: f64,
}

impl Default for RatingScale {
    fn default() -> Self {
        Self { min: 1.0, max: 5.0 }
    }
}

impl RatingScale {
    pub fn from_config(config: &BehavioralConfig) -> Self {
        Self {
            min: config.rating_min,
            max: config.rating_max,
        }
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    /// Distance from the midpoint, scaled to [0, 1]
    pub fn polarity(&self, rating: f64) -> f64 {
        let half_range = (self.max - self.min) / 2.0;
        if half_range <= f64::EPSILON {
            return 0.0;
        }
        ((rating - self.midpoint()).abs() / half_range).clamp(0.0, 1.0)
    }
}

/// Weighted engagement combination, clamped to [0, 1]
pub fn engagement_score(helpful_norm: f64, length_norm: f64, verified: bool, polarity: f64) -> f64 {
    let verified = if verified { 1.0 } else { 0.0 };
    let score = HELPFUL_VOTES_WEIGHT * helpful_norm
        + REVIEW_LENGTH_WEIGHT * length_norm
        + VERIFIED_PURCHASE_WEIGHT * verified
        + RATING_POLARITY_WEIGHT * polarity;

    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Compute derived features for every interaction.
///
/// The input is never modified; each output row owns a copy of its source.
pub fn preprocess(interactions: &[Interaction], scale: RatingScale) -> Vec<EnrichedInteraction> {
    let review_lengths: Vec<usize> = interactions
        .iter()
        .map(|i| i.review_text.as_deref().map_or(0, |text| text.chars().count()))
        .collect();

    let max_helpful = interactions
        .iter()
        .map(|i| i.helpful_votes)
        .max()
        .unwrap_or(0) as f64;
    let max_length = review_lengths.iter().copied().max().unwrap_or(0) as f64;

    let rows: Vec<EnrichedInteraction> = interactions
        .iter()
        .zip(review_lengths)
        .map(|(interaction, review_length)| {
            let time = TimeContext::from_timestamp(&interaction.timestamp);
            let engagement = engagement_score(
                normalize_by_max(interaction.helpful_votes as f64, max_helpful),
                normalize_by_max(review_length as f64, max_length),
                interaction.verified_purchase,
                scale.polarity(interaction.rating),
            );

            EnrichedInteraction {
                interaction: interaction.clone(),
                features: DerivedFeatures {
                    hour: time.hour,
                    day_of_week: time.day_of_week,
                    month: time.month,
                    is_weekend: time.is_weekend,
                    season: time.season,
                    review_length,
                    engagement_score: engagement,
                },
            }
        })
        .collect();

    debug!(
        rows = rows.len(),
        max_helpful_votes = max_helpful,
        max_review_length = max_length,
        "Preprocessed interactions"
    );

    rows
}

/// Interaction count and mean rating for one temporal bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ActivityStats {
    pub count: usize,
    pub mean_rating: f64,
}

impl ActivityStats {
    fn record(&mut self, rating: f64) {
        self.count += 1;
        self.mean_rating += (rating - self.mean_rating) / self.count as f64;
    }
}

/// Activity by hour of day, day of week and season
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemporalPatterns {
    pub hourly: BTreeMap<u8, ActivityStats>,
    pub daily: BTreeMap<u8, ActivityStats>,
    pub seasonal: BTreeMap<Season, ActivityStats>,
}

impl TemporalPatterns {
    pub fn extract(rows: &[EnrichedInteraction]) -> Self {
        let mut patterns = Self::default();

        for row in rows {
            let rating = row.interaction.rating;
            patterns.hourly.entry(row.features.hour).or_default().record(rating);
            patterns.daily.entry(row.features.day_of_week).or_default().record(rating);
            patterns.seasonal.entry(row.features.season).or_default().record(rating);
        }

        patterns
    }

    /// Hour with the most interactions; earliest hour wins ties
    pub fn busiest_hour(&self) -> Option<u8> {
        self.hourly
            .iter()
            .max_by(|a, b| a.1.count.cmp(&b.1.count).then(b.0.cmp(a.0)))
            .map(|(hour, _)| *hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_time_context() {
        // 2023-06-17 is a Saturday
        let ctx = TimeContext::from_timestamp(&at(2023, 6, 17, 22));
        assert_eq!(ctx.hour, 22);
        assert_eq!(ctx.day_of_week, 5);
        assert!(ctx.is_weekend);
        assert_eq!(ctx.season, Season::Summer);

        let ctx = TimeContext::from_timestamp(&at(2023, 1, 2, 8));
        assert_eq!(ctx.day_of_week, 0);
        assert!(!ctx.is_weekend);
        assert_eq!(ctx.season, Season::Winter);
    }

    #[test]
    fn test_rating_polarity() {
        let scale = RatingScale::default();
        assert_eq!(scale.polarity(3.0), 0.0);
        assert_eq!(scale.polarity(1.0), 1.0);
        assert_eq!(scale.polarity(5.0), 1.0);
        assert!((scale.polarity(4.0) - 0.5).abs() < 1e-12);
        // ratings outside the scale are clamped
        assert_eq!(scale.polarity(9.0), 1.0);
    }

    #[test]
    fn test_engagement_bounded_with_missing_review() {
        let rows = vec![
            Interaction::new("u1", "i1", 5.0, at(2023, 3, 1, 10))
                .with_review("Excellent! Exceeded my expectations.")
                .with_helpful_votes(40)
                .with_verified_purchase(true),
            Interaction::new("u2", "i2", 3.0, at(2023, 3, 1, 11)),
            Interaction::new("u3", "i3", 1.0, at(2023, 3, 1, 12)).with_helpful_votes(0),
        ];

        let enriched = preprocess(&rows, RatingScale::default());
        assert_eq!(enriched.len(), 3);

        for row in &enriched {
            let score = row.features.engagement_score;
            assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
        }

        // maximal on every term
        assert!((enriched[0].features.engagement_score - 1.0).abs() < 1e-12);
        // missing review, neutral, unverified
        assert_eq!(enriched[1].features.review_length, 0);
        assert_eq!(enriched[1].features.engagement_score, 0.0);
        // polarity only
        assert!((enriched[2].features.engagement_score - RATING_POLARITY_WEIGHT).abs() < 1e-12);
    }

    #[test]
    fn test_neutral_rating_scores_lower() {
        let rows = vec![
            Interaction::new("u1", "i1", 3.0, at(2023, 3, 1, 10)),
            Interaction::new("u1", "i2", 5.0, at(2023, 3, 1, 10)),
        ];
        let enriched = preprocess(&rows, RatingScale::default());
        assert!(enriched[0].features.engagement_score < enriched[1].features.engagement_score);
    }

    #[test]
    fn test_preprocess_leaves_input_untouched() {
        let rows = vec![Interaction::new("u1", "i1", 4.0, at(2023, 3, 1, 10)).with_review("ok")];
        let before = rows.clone();
        let enriched = preprocess(&rows, RatingScale::default());

        assert_eq!(rows, before);
        assert_eq!(enriched[0].interaction, rows[0]);
        assert_eq!(enriched[0].features.review_length, 2);
    }

    #[test]
    fn test_temporal_patterns() {
        let rows = vec![
            Interaction::new("u1", "i1", 4.0, at(2023, 7, 1, 9)),
            Interaction::new("u2", "i1", 2.0, at(2023, 7, 2, 9)),
            Interaction::new("u2", "i2", 5.0, at(2023, 12, 4, 21)),
        ];
        let patterns = TemporalPatterns::extract(&preprocess(&rows, RatingScale::default()));

        assert_eq!(patterns.hourly[&9].count, 2);
        assert!((patterns.hourly[&9].mean_rating - 3.0).abs() < 1e-12);
        assert_eq!(patterns.seasonal[&Season::Summer].count, 2);
        assert_eq!(patterns.seasonal[&Season::Winter].count, 1);
        assert_eq!(patterns.busiest_hour(), Some(9));
    }
}
