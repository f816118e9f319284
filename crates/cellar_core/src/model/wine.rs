//! Wine entity and its plain-data record form.
//!
//! # Invariants
//! - `key` is [`UNPERSISTED_KEY`] until the wine is inserted and returns to
//!   it when the row is deleted.
//! - Property fields only write through to storage once the persistence
//!   layer has bound them.

use super::geo::GeoLocation;
use super::property::Property;
use super::{Entity, EntityKey, UNPERSISTED_KEY};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

static VINTAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(18|19|20)\d{2}\b").expect("valid vintage regex")
});

/// Extracts the first plausible vintage year (1800-2099) from a wine title.
pub fn vintage_from_title(title: &str) -> Option<i32> {
    VINTAGE_RE
        .find(title)
        .and_then(|found| found.as_str().parse().ok())
}

/// Column values of one wine row, used for inserts and bulk imports.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WineRecord {
    pub title: String,
    pub variety: String,
    pub country: String,
    pub region: String,
    pub winery: String,
    pub color: String,
    /// Zero or negative when unknown.
    pub vintage: i32,
    pub description: String,
    pub score: i32,
    pub abv: f64,
    pub price: f64,
    pub average_rating: f64,
}

impl WineRecord {
    /// Record with only a title; the vintage is taken from the title when it
    /// contains a year.
    pub fn titled(title: impl Into<String>) -> Self {
        let title = title.into();
        let vintage = vintage_from_title(&title).unwrap_or(0);
        Self {
            title,
            vintage,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct Wine {
    key: Cell<EntityKey>,
    pub title: Property<String>,
    pub variety: Property<String>,
    pub country: Property<String>,
    pub region: Property<String>,
    pub winery: Property<String>,
    pub color: Property<String>,
    pub vintage: Property<i32>,
    pub description: Property<String>,
    pub score: Property<i32>,
    pub abv: Property<f64>,
    pub price: Property<f64>,
    pub average_rating: Property<f64>,
    geolocation: RefCell<Option<GeoLocation>>,
    bound: Cell<bool>,
}

impl Wine {
    /// Creates an unpersisted wine. Nothing is written until it is added
    /// through a repository.
    pub fn new(record: WineRecord) -> Rc<Self> {
        Self::with_key(UNPERSISTED_KEY, record, None)
    }

    pub(crate) fn with_key(
        key: EntityKey,
        record: WineRecord,
        geolocation: Option<GeoLocation>,
    ) -> Rc<Self> {
        Rc::new(Self {
            key: Cell::new(key),
            title: Property::new(record.title),
            variety: Property::new(record.variety),
            country: Property::new(record.country),
            region: Property::new(record.region),
            winery: Property::new(record.winery),
            color: Property::new(record.color),
            vintage: Property::new(record.vintage),
            description: Property::new(record.description),
            score: Property::new(record.score),
            abv: Property::new(record.abv),
            price: Property::new(record.price),
            average_rating: Property::new(record.average_rating),
            geolocation: RefCell::new(geolocation),
            bound: Cell::new(false),
        })
    }

    pub(crate) fn set_key(&self, key: EntityKey) {
        self.key.set(key);
    }

    /// Marks the write-through listeners as attached. Returns `false` if
    /// they already were, so a re-added wine is not bound twice.
    pub(crate) fn mark_bound(&self) -> bool {
        !self.bound.replace(true)
    }

    /// Snapshot of the current field values.
    pub fn record(&self) -> WineRecord {
        WineRecord {
            title: self.title.get(),
            variety: self.variety.get(),
            country: self.country.get(),
            region: self.region.get(),
            winery: self.winery.get(),
            color: self.color.get(),
            vintage: self.vintage.get(),
            description: self.description.get(),
            score: self.score.get(),
            abv: self.abv.get(),
            price: self.price.get(),
            average_rating: self.average_rating.get(),
        }
    }

    pub fn geolocation(&self) -> Option<GeoLocation> {
        *self.geolocation.borrow()
    }

    /// Sets coordinates in memory only. Stored coordinates come from the
    /// geolocation table on the next fresh load.
    pub fn set_geolocation(&self, geolocation: Option<GeoLocation>) {
        *self.geolocation.borrow_mut() = geolocation;
    }
}

impl Entity for Wine {
    const KIND: &'static str = "wine";

    fn key(&self) -> EntityKey {
        self.key.get()
    }
}
