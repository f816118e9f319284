//! User-owned vineyard tours.

use super::property::Property;
use super::{Entity, EntityKey, UNPERSISTED_KEY};
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug)]
pub struct VineyardTour {
    key: Cell<EntityKey>,
    username: String,
    pub name: Property<String>,
}

impl VineyardTour {
    pub(crate) fn with_key(key: EntityKey, username: String, name: String) -> Rc<Self> {
        Rc::new(Self {
            key: Cell::new(key),
            username,
            name: Property::new(name),
        })
    }

    pub(crate) fn unpersist(&self) {
        self.key.set(UNPERSISTED_KEY);
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Entity for VineyardTour {
    const KIND: &'static str = "vineyard_tour";

    fn key(&self) -> EntityKey {
        self.key.get()
    }
}
