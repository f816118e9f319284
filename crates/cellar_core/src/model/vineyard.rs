//! Vineyard entity.

use super::geo::GeoLocation;
use super::property::Property;
use super::{Entity, EntityKey, UNPERSISTED_KEY};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Column values of one vineyard row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VineyardRecord {
    pub name: String,
    pub address: String,
    pub region: String,
    pub website: String,
    pub description: String,
    pub logo_url: String,
}

#[derive(Debug)]
pub struct Vineyard {
    key: Cell<EntityKey>,
    pub name: Property<String>,
    pub address: Property<String>,
    pub region: Property<String>,
    pub website: Property<String>,
    pub description: Property<String>,
    pub logo_url: Property<String>,
    geolocation: RefCell<Option<GeoLocation>>,
    bound: Cell<bool>,
}

impl Vineyard {
    pub fn new(record: VineyardRecord) -> Rc<Self> {
        Self::with_key(UNPERSISTED_KEY, record, None)
    }

    pub(crate) fn with_key(
        key: EntityKey,
        record: VineyardRecord,
        geolocation: Option<GeoLocation>,
    ) -> Rc<Self> {
        Rc::new(Self {
            key: Cell::new(key),
            name: Property::new(record.name),
            address: Property::new(record.address),
            region: Property::new(record.region),
            website: Property::new(record.website),
            description: Property::new(record.description),
            logo_url: Property::new(record.logo_url),
            geolocation: RefCell::new(geolocation),
            bound: Cell::new(false),
        })
    }

    pub(crate) fn set_key(&self, key: EntityKey) {
        self.key.set(key);
    }

    /// Marks the write-through listeners as attached. Returns `false` if
    /// they already were, so a re-added vineyard is not bound twice.
    pub(crate) fn mark_bound(&self) -> bool {
        !self.bound.replace(true)
    }

    pub fn record(&self) -> VineyardRecord {
        VineyardRecord {
            name: self.name.get(),
            address: self.address.get(),
            region: self.region.get(),
            website: self.website.get(),
            description: self.description.get(),
            logo_url: self.logo_url.get(),
        }
    }

    pub fn geolocation(&self) -> Option<GeoLocation> {
        *self.geolocation.borrow()
    }

    pub fn set_geolocation(&self, geolocation: Option<GeoLocation>) {
        *self.geolocation.borrow_mut() = geolocation;
    }
}

impl Entity for Vineyard {
    const KIND: &'static str = "vineyard";

    fn key(&self) -> EntityKey {
        self.key.get()
    }
}
