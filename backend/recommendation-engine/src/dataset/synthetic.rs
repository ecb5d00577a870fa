// Reproducible synthetic interaction datasets.
//
// Shape:
// - 20% of users ("power users") produce 60% of interactions and rate higher
// - weekday interactions land in business hours (09-17) 70% of the time
// - 80% of rows carry review text, 85% are verified purchases
// - helpful votes grow with the rating

use crate::models::Interaction;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub const CATEGORIES: [&str; 6] = ["Electronics", "Books", "Clothing", "Home", "Sports", "Beauty"];

const REVIEW_TEMPLATES: [&str; 10] = [
    "Great product, highly recommend!",
    "Good quality, satisfied with purchase.",
    "Average product, nothing special.",
    "Not what I expected, disappointed.",
    "Excellent! Exceeded my expectations.",
    "Poor quality, would not buy again.",
    "Decent value for money.",
    "Love it! Will buy again.",
    "Okay product, could be better.",
    "Amazing quality and fast delivery!",
];

const POWER_USER_SHARE: f64 = 0.2;
const POWER_INTERACTION_SHARE: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub num_users: usize,
    pub num_items: usize,
    pub num_interactions: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            num_users: 100,
            num_items: 200,
            num_interactions: 5000,
            start: utc_midnight(2023, 1, 1),
            end: utc_midnight(2023, 12, 31),
            seed: 42,
        }
    }
}

impl SyntheticConfig {
    pub fn sized(num_users: usize, num_items: usize, num_interactions: usize) -> Self {
        Self {
            num_users,
            num_items,
            num_interactions,
            ..Default::default()
        }
    }

    /// 10 users, 20 items, 50 rows
    pub fn small() -> Self {
        Self::sized(10, 20, 50)
    }

    /// 50 users, 100 items, 1000 rows
    pub fn medium() -> Self {
        Self::sized(50, 100, 1000)
    }

    /// 1000 users, 500 items, 100k rows
    pub fn large() -> Self {
        Self::sized(1000, 500, 100_000)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Generate interactions sorted by timestamp
pub fn generate(config: &SyntheticConfig) -> Vec<Interaction> {
    if config.num_users == 0 || config.num_items == 0 {
        return Vec::new();
    }

    let mut rng = StdRng::seed_from_u64(config.seed);

    let users: Vec<String> = (0..config.num_users).map(|i| format!("user_{:04}", i)).collect();
    let items: Vec<String> = (0..config.num_items).map(|i| format!("item_{:04}", i)).collect();
    let item_categories: Vec<&str> = items
        .iter()
        .map(|_| CATEGORIES[rng.gen_range(0..CATEGORIES.len())])
        .collect();

    let mut order: Vec<usize> = (0..config.num_users).collect();
    order.shuffle(&mut rng);
    let power_count = (config.num_users as f64 * POWER_USER_SHARE) as usize;
    let (power_users, regular_users) = order.split_at(power_count);

    let power_interactions = if power_users.is_empty() {
        0
    } else if regular_users.is_empty() {
        config.num_interactions
    } else {
        (config.num_interactions as f64 * POWER_INTERACTION_SHARE) as usize
    };

    let span_secs = (config.end - config.start).num_seconds().max(1);

    let mut interactions: Vec<Interaction> = (0..config.num_interactions)
        .map(|i| {
            let is_power = i < power_interactions;
            let user = if is_power {
                power_users[rng.gen_range(0..power_users.len())]
            } else {
                regular_users[rng.gen_range(0..regular_users.len())]
            };
            let item = rng.gen_range(0..items.len());

            let rating = if is_power {
                weighted_choice(&mut rng, &[3.0, 4.0, 5.0], &[0.2, 0.4, 0.4])
            } else {
                weighted_choice(
                    &mut rng,
                    &[1.0, 2.0, 3.0, 4.0, 5.0],
                    &[0.1, 0.15, 0.3, 0.3, 0.15],
                )
            };

            let mut timestamp = config.start + Duration::seconds(rng.gen_range(0..=span_secs));
            if timestamp.weekday().num_days_from_monday() < 5 && rng.gen_bool(0.7) {
                let hour = rng.gen_range(9..18);
                timestamp = timestamp.with_hour(hour).unwrap_or(timestamp);
            }

            let review_text = if rng.gen_bool(0.8) {
                Some(REVIEW_TEMPLATES[rng.gen_range(0..REVIEW_TEMPLATES.len())].to_string())
            } else {
                None
            };

            Interaction {
                user_id: users[user].clone(),
                item_id: items[item].clone(),
                rating,
                timestamp,
                review_text,
                helpful_votes: rng.gen_range(0..=(rating as u32) * 4),
                verified_purchase: rng.gen_bool(0.85),
                category: Some(item_categories[item].to_string()),
            }
        })
        .collect();

    interactions.sort_by_key(|interaction| interaction.timestamp);
    interactions
}

fn utc_midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn weighted_choice(rng: &mut StdRng, values: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    let mut threshold = rng.gen::<f64>() * total;

    for (value, weight) in values.iter().zip(weights) {
        if threshold < *weight {
            return *value;
        }
        threshold -= weight;
    }

    values.last().copied().unwrap_or_default()
}
