//! Search filters accepted by the paged queries.
//!
//! Text filters match as case-insensitive substrings (an empty string matches
//! everything). Numeric filters are inclusive ranges; a missing bound means
//! the whole domain on that side.

use serde::{Deserialize, Serialize};

/// Numeric types usable in a [`RangeFilter`].
pub trait FullDomain: Copy {
    const LOWEST: Self;
    const HIGHEST: Self;
}

impl FullDomain for i64 {
    const LOWEST: Self = i64::MIN;
    const HIGHEST: Self = i64::MAX;
}

impl FullDomain for f64 {
    const LOWEST: Self = f64::MIN;
    const HIGHEST: Self = f64::MAX;
}

/// Inclusive range with optional bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeFilter<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: FullDomain> RangeFilter<T> {
    pub fn between(min: T, max: T) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(min: T) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: T) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    /// Bounds to bind into a `BETWEEN` predicate.
    pub fn bounds(&self) -> (T, T) {
        (
            self.min.unwrap_or(T::LOWEST),
            self.max.unwrap_or(T::HIGHEST),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WineFilters {
    pub title: String,
    pub country: String,
    pub winery: String,
    pub color: String,
    pub vintage: RangeFilter<i64>,
    pub score: RangeFilter<i64>,
    pub abv: RangeFilter<f64>,
    pub price: RangeFilter<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VineyardFilters {
    pub name: String,
    pub address: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewFilters {
    pub username: String,
    pub wine_title: String,
    pub rating: RangeFilter<f64>,
}
