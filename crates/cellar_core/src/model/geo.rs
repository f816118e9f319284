//! Geographic coordinates attached to wines and vineyards.

use serde::{Deserialize, Serialize};

/// Latitude/longitude pair. Wines and vineyards pick one up when their
/// region or address case-insensitively matches a stored place name.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// External service that turns place names into coordinates.
///
/// Implementations may block on the network; the core only calls them from
/// explicit seeding operations.
pub trait GeoResolver {
    /// Returns coordinates for `name`, or `None` when it cannot be resolved.
    fn resolve(&self, name: &str) -> Option<GeoLocation>;
}

impl<F> GeoResolver for F
where
    F: Fn(&str) -> Option<GeoLocation>,
{
    fn resolve(&self, name: &str) -> Option<GeoLocation> {
        self(name)
    }
}
