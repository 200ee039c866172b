//! Pure weighting functions shared by retrieval ranking and decay.
//!
//! Each factor is an independent function with a documented domain and
//! range. Retrieval composes them by multiplication; decay sums a subset of
//! them into a salience value.
//!
//! ## Composite score
//!
//! ```text
//! score = similarity × recency × frequency × relation × importance
//!
//! where:
//!   similarity = clamp(cosine, 0, 1)
//!   recency    = exp(−ln 2 × age_days / half_life_days)
//!   frequency  = max(floor, min(1, ln(1 + access_count) / ln(1 + freq_cap)))
//!   relation   = min(1, base + step × shared_links)
//!   importance = 0.5 + 0.5 × importance
//! ```

use chrono::{DateTime, Utc};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Fractional days elapsed from `from` to `to`. Never negative.
pub fn age_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let seconds = to.signed_duration_since(from).num_seconds() as f64;
    (seconds / SECONDS_PER_DAY).max(0.0)
}

/// Clamp a cosine similarity from [-1, 1] into [0, 1].
///
/// NaN maps to 0.
pub fn clamp_similarity(similarity: f64) -> f64 {
    if similarity.is_nan() {
        return 0.0;
    }
    similarity.clamp(0.0, 1.0)
}

/// Exponential half-life decay.
///
/// Domain: `age_days >= 0` (negative ages are treated as 0), `half_life_days > 0`.
/// Range: (0, 1], equal to 1 at age 0 and 0.5 at one half-life.
pub fn recency_weight(age_days: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 1.0;
    }
    let age = age_days.max(0.0);
    (-std::f64::consts::LN_2 * age / half_life_days)
        .exp()
        .max(f64::MIN_POSITIVE)
}

/// Logarithmic access-frequency weight, saturating at `freq_cap` accesses.
///
/// Domain: any access count; `floor` in [0, 1].
/// Range: [floor, 1]. Non-decreasing in `access_count`, exactly 1 for
/// `access_count >= freq_cap`.
pub fn frequency_weight(access_count: u32, freq_cap: u32, floor: f64) -> f64 {
    let floor = floor.clamp(0.0, 1.0);
    if freq_cap == 0 {
        return 1.0;
    }
    let raw = (1.0 + f64::from(access_count)).ln() / (1.0 + f64::from(freq_cap)).ln();
    raw.min(1.0).max(floor)
}

/// Relation weight from the number of shared links.
///
/// Domain: `base` in (0, 1], `step >= 0`.
/// Range: [base, 1].
pub fn relation_weight(shared_links: usize, base: f64, step: f64) -> f64 {
    (base + step * shared_links as f64).min(1.0)
}

/// Importance weight.
///
/// Domain: `importance` in [0, 1] (clamped).
/// Range: [0.5, 1].
pub fn importance_weight(importance: f64) -> f64 {
    0.5 + 0.5 * importance.clamp(0.0, 1.0)
}

/// Product of the per-factor weights.
pub fn composite_score(
    similarity: f64,
    recency: f64,
    frequency: f64,
    relation: f64,
    importance: f64,
) -> f64 {
    clamp_similarity(similarity) * recency * frequency * relation * importance
}
