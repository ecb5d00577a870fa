// ============================================
// Behavior Aggregation
// ============================================
//
// Folds enriched interactions into one behavior record per user:
// 1. Rating and engagement averages
// 2. Temporal distribution (weekend, daytime, recent shares)
// 3. Peak hour and most active days
//
// The record's feature vector is the clustering input.

use crate::models::{EnrichedInteraction, ItemId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Hours counted as "daytime" (06:00 to 17:59)
const DAYTIME_HOURS: std::ops::Range<u8> = 6..18;

/// Number of dimensions in `UserBehavior::feature_vector`
pub const FEATURE_DIMENSIONS: usize = 6;

/// Aggregated behavior of one user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserBehavior {
    pub user_id: UserId,
    pub interaction_count: usize,
    pub mean_rating: f64,
    pub mean_engagement: f64,
    /// Share of interactions on Saturday or Sunday
    pub weekend_share: f64,
    pub daytime_share: f64,
    /// Share of interactions inside the temporal window
    pub recent_share: f64,
    pub peak_hour: u8,
    /// Up to 3 days of week (0 = Monday), busiest first
    pub active_days: Vec<u8>,
    #[serde(skip)]
    pub seen_items: HashSet<ItemId>,
}

impl UserBehavior {
    /// [mean_rating, interaction_count, mean_engagement,
    ///  weekend_share, daytime_share, recent_share]
    pub fn feature_vector(&self) -> [f64; FEATURE_DIMENSIONS] {
        [
            self.mean_rating,
            self.interaction_count as f64,
            self.mean_engagement,
            self.weekend_share,
            self.daytime_share,
            self.recent_share,
        ]
    }

    pub fn has_seen(&self, item_id: &str) -> bool {
        self.seen_items.contains(item_id)
    }
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    rating_sum: f64,
    engagement_sum: f64,
    weekend: usize,
    daytime: usize,
    recent: usize,
    hour_counts: [usize; 24],
    day_counts: [usize; 7],
    seen_items: HashSet<ItemId>,
}

pub struct BehaviorBuilder {
    /// Days before the latest interaction that count as recent
    temporal_window: u32,
}

impl BehaviorBuilder {
    pub fn new(temporal_window: u32) -> Self {
        Self { temporal_window }
    }

    /// Build behavior records keyed (and therefore ordered) by user id
    pub fn build(&self, rows: &[EnrichedInteraction]) -> BTreeMap<UserId, UserBehavior> {
        let Some(latest) = rows.iter().map(|r| r.interaction.timestamp).max() else {
            return BTreeMap::new();
        };
        let recent_cutoff = self.recent_cutoff(latest);

        let mut accumulators: BTreeMap<UserId, Accumulator> = BTreeMap::new();
        for row in rows {
            let acc = accumulators
                .entry(row.interaction.user_id.clone())
                .or_default();

            acc.count += 1;
            acc.rating_sum += row.interaction.rating;
            acc.engagement_sum += row.features.engagement_score;
            if row.features.is_weekend {
                acc.weekend += 1;
            }
            if DAYTIME_HOURS.contains(&row.features.hour) {
                acc.daytime += 1;
            }
            if row.interaction.timestamp >= recent_cutoff {
                acc.recent += 1;
            }
            acc.hour_counts[usize::from(row.features.hour) % 24] += 1;
            acc.day_counts[usize::from(row.features.day_of_week) % 7] += 1;
            acc.seen_items.insert(row.interaction.item_id.clone());
        }

        let behaviors: BTreeMap<UserId, UserBehavior> = accumulators
            .into_iter()
            .map(|(user_id, acc)| {
                let behavior = finish(user_id.clone(), acc);
                (user_id, behavior)
            })
            .collect();

        debug!(
            users = behaviors.len(),
            temporal_window = self.temporal_window,
            "Aggregated user behavior"
        );

        behaviors
    }

    fn recent_cutoff(&self, latest: DateTime<Utc>) -> DateTime<Utc> {
        latest
            .checked_sub_signed(Duration::days(i64::from(self.temporal_window)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

fn finish(user_id: UserId, acc: Accumulator) -> UserBehavior {
    let count = acc.count.max(1) as f64;

    UserBehavior {
        user_id,
        interaction_count: acc.count,
        mean_rating: acc.rating_sum / count,
        mean_engagement: acc.engagement_sum / count,
        weekend_share: acc.weekend as f64 / count,
        daytime_share: acc.daytime as f64 / count,
        recent_share: acc.recent as f64 / count,
        peak_hour: peak_hour(&acc.hour_counts),
        active_days: active_days(&acc.day_counts),
        seen_items: acc.seen_items,
    }
}

/// Busiest hour; earliest wins ties
fn peak_hour(hour_counts: &[usize; 24]) -> u8 {
    let mut best = 0;
    for (hour, &count) in hour_counts.iter().enumerate() {
        if count > hour_counts[best] {
            best = hour;
        }
    }
    best as u8
}

/// Top 3 days with any activity
fn active_days(day_counts: &[usize; 7]) -> Vec<u8> {
    let mut days: Vec<(u8, usize)> = day_counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(day, &count)| (day as u8, count))
        .collect();
    days.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    days.into_iter().take(3).map(|(day, _)| day).collect()
}
