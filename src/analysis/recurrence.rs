//! # Stage: Recurrence Tracker
//!
//! Compares this cycle's patterns with the previous cycle's by id and tags
//! each current pattern with a [`Trend`]. A pattern that fell below its
//! surfacing threshold is simply absent from the current set; it is never
//! reported as `decreasing`.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::{Pattern, Trend};

/// Annotate `current` with trends relative to `previous`.
pub fn tag_trend(current: Vec<Pattern>, previous: &[Pattern]) -> Vec<Pattern> {
    let prior: HashMap<&str, u32> = previous.iter().map(|p| (p.id.as_str(), p.occurrences)).collect();

    current
        .into_iter()
        .map(|mut p| {
            match prior.get(p.id.as_str()) {
                None => {
                    p.trend = Some(Trend::New);
                    p.recurring = false;
                }
                Some(&before) => {
                    p.trend = Some(match p.occurrences.cmp(&before) {
                        Ordering::Greater => Trend::Increasing,
                        Ordering::Equal => Trend::Stable,
                        Ordering::Less => Trend::Decreasing,
                    });
                    p.recurring = true;
                }
            }
            p
        })
        .collect()
}
