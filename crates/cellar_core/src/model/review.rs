//! User reviews of wines.

use super::property::Property;
use super::{Entity, EntityKey, UNPERSISTED_KEY};
use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Lowest and highest rating a review can carry.
pub const RATING_RANGE: (f64, f64) = (1.0, 5.0);

/// Current time as epoch milliseconds, the unit of review and list dates.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug)]
pub struct WineReview {
    key: Cell<EntityKey>,
    username: String,
    wine_id: EntityKey,
    /// Epoch milliseconds.
    date: i64,
    pub rating: Property<f64>,
    pub description: Property<String>,
    pub flagged: Property<bool>,
}

pub(crate) struct ReviewFields {
    pub username: String,
    pub wine_id: EntityKey,
    pub rating: f64,
    pub description: String,
    pub date: i64,
    pub flagged: bool,
}

impl WineReview {
    pub(crate) fn with_key(key: EntityKey, fields: ReviewFields) -> Rc<Self> {
        Rc::new(Self {
            key: Cell::new(key),
            username: fields.username,
            wine_id: fields.wine_id,
            date: fields.date,
            rating: Property::new(fields.rating),
            description: Property::new(fields.description),
            flagged: Property::new(fields.flagged),
        })
    }

    pub(crate) fn unpersist(&self) {
        self.key.set(UNPERSISTED_KEY);
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn wine_id(&self) -> EntityKey {
        self.wine_id
    }

    pub fn date(&self) -> i64 {
        self.date
    }
}

impl Entity for WineReview {
    const KIND: &'static str = "wine_review";

    fn key(&self) -> EntityKey {
        self.key.get()
    }
}
