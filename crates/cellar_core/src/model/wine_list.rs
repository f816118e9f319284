//! User-owned wine lists.
//!
//! Every user owns the two reserved lists [`FAVOURITES_LIST`] and
//! [`HISTORY_LIST`]; they are created with the account and cannot be
//! deleted.

use super::{Entity, EntityKey, UNPERSISTED_KEY};
use std::cell::Cell;
use std::rc::Rc;

pub const FAVOURITES_LIST: &str = "Favourites";
pub const HISTORY_LIST: &str = "History";

/// Lists created for every new account, in creation order.
pub const RESERVED_LISTS: [&str; 2] = [FAVOURITES_LIST, HISTORY_LIST];

/// Returns whether `name` is one of the per-user reserved lists.
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_LISTS.contains(&name)
}

#[derive(Debug)]
pub struct WineList {
    key: Cell<EntityKey>,
    username: String,
    name: String,
}

impl WineList {
    pub(crate) fn with_key(key: EntityKey, username: String, name: String) -> Rc<Self> {
        Rc::new(Self {
            key: Cell::new(key),
            username,
            name,
        })
    }

    pub(crate) fn unpersist(&self) {
        self.key.set(UNPERSISTED_KEY);
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_reserved(&self) -> bool {
        is_reserved_name(&self.name)
    }
}

impl Entity for WineList {
    const KIND: &'static str = "wine_list";

    fn key(&self) -> EntityKey {
        self.key.get()
    }
}

#[cfg(test)]
mod tests {
    use super::{is_reserved_name, WineList};

    #[test]
    fn reserved_names_are_exact_matches() {
        assert!(is_reserved_name("Favourites"));
        assert!(is_reserved_name("History"));
        assert!(!is_reserved_name("favourites"));
        assert!(!is_reserved_name("Weekend"));
    }

    #[test]
    fn list_reports_reserved_state() {
        let list = WineList::with_key(3, "alice".to_string(), "History".to_string());
        assert!(list.is_reserved());
        assert_eq!(list.username(), "alice");
    }
}
