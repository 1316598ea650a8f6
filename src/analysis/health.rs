//! # Stage: Health Scorer
//!
//! ## Responsibility
//! Collapse a window of outcomes into one number in `[0.0, 1.0]`:
//!
//! ```text
//! health = success_rate × (avg_quality / 5.0)
//! ```
//!
//! Both terms are recency-weighted. Each outcome's weight is
//! `0.5^(age / half_life)`, where `age` is measured back from the newest
//! outcome in the window, so the newest outcome always weighs exactly 1.0 and
//! older outcomes weigh monotonically less.
//!
//! ## Policy
//! - Empty window ⇒ 1.0. No evidence of failure is treated as healthy.
//! - No outcome reports quality ⇒ quality term is 1.0 (5/5). Missing quality
//!   data is not penalized.
//! - Quality values outside 1–5 are clamped.

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::types::Outcome;

const MAX_QUALITY: f64 = 5.0;

/// Recency weight of an outcome `age_hours` older than the newest one.
pub fn recency_weight(age_hours: f64, half_life_hours: Option<f64>) -> f64 {
    match half_life_hours {
        Some(h) if h > 0.0 && age_hours > 0.0 => 0.5_f64.powf(age_hours / h),
        _ => 1.0,
    }
}

/// Health score for a window using the configured half-life.
pub fn score(outcomes: &[Outcome], config: &Config) -> f64 {
    score_with_half_life(outcomes, config.health_half_life_hours)
}

/// Health score with an explicit half-life (`None` = unweighted).
pub fn score_with_half_life(outcomes: &[Outcome], half_life_hours: Option<f64>) -> f64 {
    let Some(newest) = outcomes.iter().map(|o| o.timestamp).max() else {
        return 1.0;
    };

    let mut weight_total = 0.0;
    let mut success_weight = 0.0;
    let mut quality_weight = 0.0;
    let mut quality_sum = 0.0;

    for o in outcomes {
        let w = recency_weight(age_hours(newest, o.timestamp), half_life_hours);
        weight_total += w;
        if o.success {
            success_weight += w;
        }
        if let Some(q) = o.quality {
            quality_weight += w;
            quality_sum += w * f64::from(q).clamp(1.0, MAX_QUALITY);
        }
    }

    if weight_total <= 0.0 {
        return 1.0;
    }
    let success_rate = success_weight / weight_total;
    let avg_quality = if quality_weight > 0.0 { quality_sum / quality_weight } else { MAX_QUALITY };

    (success_rate * (avg_quality / MAX_QUALITY)).clamp(0.0, 1.0)
}

fn age_hours(newest: DateTime<Utc>, ts: DateTime<Utc>) -> f64 {
    (newest - ts).num_milliseconds().max(0) as f64 / 3_600_000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn at(hours_ago: i64, success: bool, quality: Option<u8>) -> Outcome {
        let base = Utc::now();
        let mut o = Outcome::new("task", success).at(base - Duration::hours(hours_ago));
        o.quality = quality;
        o
    }

    #[test]
    fn test_empty_window_is_healthy() {
        assert_eq!(score(&[], &Config::default()), 1.0);
    }

    #[test]
    fn test_all_successes_full_quality() {
        let outcomes: Vec<Outcome> = (0..5).map(|i| at(i, true, Some(5))).collect();
        assert!((score(&outcomes, &Config::default()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_failures_zero() {
        let outcomes: Vec<Outcome> = (0..5).map(|i| at(i * 10, false, Some(1))).collect();
        assert_eq!(score(&outcomes, &Config::default()), 0.0);
    }

    #[test]
    fn test_missing_quality_not_penalized() {
        let outcomes = vec![at(0, true, None), at(1, true, None)];
        assert!((score(&outcomes, &Config::default()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unweighted_formula() {
        // 3 of 4 succeed, mean quality 4 → 0.75 * 0.8 = 0.6
        let outcomes = vec![
            at(0, true, Some(4)),
            at(0, true, Some(4)),
            at(0, true, Some(4)),
            at(0, false, Some(4)),
        ];
        assert!((score_with_half_life(&outcomes, None) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_quality_clamped() {
        let outcomes = vec![at(0, true, Some(9))];
        assert!((score_with_half_life(&outcomes, None) - 1.0).abs() < 1e-12);
        let outcomes = vec![at(0, true, Some(0))];
        assert!((score_with_half_life(&outcomes, None) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_old_failures_matter_less() {
        let recent_fail = vec![at(0, false, None), at(200, true, None)];
        let old_fail = vec![at(0, true, None), at(200, false, None)];
        let half_life = Some(24.0);
        assert!(score_with_half_life(&old_fail, half_life) > score_with_half_life(&recent_fail, half_life));
        // Unweighted both are 0.5.
        assert!((score_with_half_life(&old_fail, None) - 0.5).abs() < 1e-12);
        assert!((score_with_half_life(&recent_fail, None) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_recency_weight_newest_is_one() {
        assert_eq!(recency_weight(0.0, Some(24.0)), 1.0);
        assert!((recency_weight(24.0, Some(24.0)) - 0.5).abs() < 1e-12);
        assert_eq!(recency_weight(1000.0, None), 1.0);
    }

    proptest! {
        #[test]
        fn prop_recency_weight_monotonic(a in 0.0f64..10_000.0, b in 0.0f64..10_000.0, h in 0.1f64..1_000.0) {
            let (young, old) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(recency_weight(young, Some(h)) >= recency_weight(old, Some(h)));
        }

        #[test]
        fn prop_score_in_unit_interval(
            rows in proptest::collection::vec((0i64..500, any::<bool>(), proptest::option::of(0u8..10)), 0..40)
        ) {
            let outcomes: Vec<Outcome> = rows.iter().map(|(h, s, q)| at(*h, *s, *q)).collect();
            let s = score(&outcomes, &Config::default());
            prop_assert!((0.0..=1.0).contains(&s));
        }
    }
}
