//! Free-text tasting note a user keeps for one wine.
//!
//! A note without a row is handed out blank; its row is created on the first
//! non-empty text, updated on later edits and deleted when the text becomes
//! empty again.

use super::property::Property;
use super::{Entity, EntityKey, UNPERSISTED_KEY};
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug)]
pub struct Note {
    key: Cell<EntityKey>,
    username: String,
    wine_id: EntityKey,
    pub text: Property<String>,
}

impl Note {
    pub(crate) fn with_key(
        key: EntityKey,
        username: String,
        wine_id: EntityKey,
        text: String,
    ) -> Rc<Self> {
        Rc::new(Self {
            key: Cell::new(key),
            username,
            wine_id,
            text: Property::new(text),
        })
    }

    pub(crate) fn blank(username: String, wine_id: EntityKey) -> Rc<Self> {
        Self::with_key(UNPERSISTED_KEY, username, wine_id, String::new())
    }

    pub(crate) fn set_key(&self, key: EntityKey) {
        self.key.set(key);
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn wine_id(&self) -> EntityKey {
        self.wine_id
    }
}

impl Entity for Note {
    const KIND: &'static str = "note";

    fn key(&self) -> EntityKey {
        self.key.get()
    }
}
