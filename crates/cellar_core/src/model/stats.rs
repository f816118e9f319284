//! Catalogue-wide aggregates used to populate filter controls.
//!
//! The sets are ordered so callers can feed them straight into pickers.
//! Recomputation happens in the repositories; these types only accumulate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Running minimum and maximum of one column. Both are `None` until the
/// first value is observed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub fn observe(&mut self, value: T) {
        self.observe_min(value);
        self.observe_max(value);
    }

    pub fn observe_min(&mut self, value: T) {
        if self.min.map_or(true, |min| value < min) {
            self.min = Some(value);
        }
    }

    pub fn observe_max(&mut self, value: T) {
        if self.max.map_or(true, |max| value > max) {
            self.max = Some(value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WineStats {
    pub countries: BTreeSet<String>,
    pub wineries: BTreeSet<String>,
    pub colors: BTreeSet<String>,
    /// Non-positive vintages mean "unknown" and never lower the minimum.
    pub vintage: Bounds<i32>,
    pub score: Bounds<i32>,
    pub abv: Bounds<f64>,
    pub price: Bounds<f64>,
}

impl WineStats {
    pub(crate) fn observe_vintage(&mut self, vintage: i32) {
        if vintage > 0 {
            self.vintage.observe(vintage);
        } else {
            self.vintage.observe_max(vintage);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VineyardStats {
    pub names: BTreeSet<String>,
    pub addresses: BTreeSet<String>,
    pub regions: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::{Bounds, WineStats};

    #[test]
    fn bounds_track_min_and_max_independently() {
        let mut bounds = Bounds::default();
        bounds.observe(5);
        assert_eq!((bounds.min, bounds.max), (Some(5), Some(5)));
        bounds.observe(3);
        bounds.observe(9);
        assert_eq!((bounds.min, bounds.max), (Some(3), Some(9)));
    }

    #[test]
    fn unknown_vintages_only_reach_the_maximum() {
        let mut stats = WineStats::default();
        for vintage in [0, -1, 1999, 2020] {
            stats.observe_vintage(vintage);
        }
        assert_eq!(stats.vintage.min, Some(1999));
        assert_eq!(stats.vintage.max, Some(2020));

        let mut unknown = WineStats::default();
        unknown.observe_vintage(0);
        assert_eq!(unknown.vintage.min, None);
        assert_eq!(unknown.vintage.max, Some(0));
    }
}
