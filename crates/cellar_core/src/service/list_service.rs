//! Reserved-list use cases: favourites and viewing history.
//!
//! # Invariants
//! - Both reserved lists exist for every registered user; a missing one is
//!   reported as a failed operation, never created on the fly.
//! - Recording a view moves the wine to the front of the history.

use crate::model::user::User;
use crate::model::wine::Wine;
use crate::model::wine_list::{WineList, FAVOURITES_LIST, HISTORY_LIST};
use crate::repo::list_repo::WineListRepository;
use log::warn;
use std::rc::Rc;

pub struct ListService<'r> {
    lists: &'r WineListRepository,
}

impl<'r> ListService<'r> {
    pub fn new(lists: &'r WineListRepository) -> Self {
        Self { lists }
    }

    pub fn favourites(&self, user: &User) -> Option<Rc<WineList>> {
        self.reserved(user, FAVOURITES_LIST)
    }

    pub fn history(&self, user: &User) -> Option<Rc<WineList>> {
        self.reserved(user, HISTORY_LIST)
    }

    pub fn is_favourite(&self, user: &User, wine: &Wine) -> bool {
        self.favourites(user)
            .is_some_and(|list| self.lists.is_wine_in_list(&list, wine))
    }

    /// Adds or removes `wine` from the favourites. Returns whether the wine
    /// is a favourite afterwards.
    pub fn toggle_favourite(&self, user: &User, wine: &Wine) -> bool {
        let Some(list) = self.favourites(user) else {
            return false;
        };
        if self.lists.is_wine_in_list(&list, wine) {
            !self.lists.remove_wine(&list, wine)
        } else {
            self.lists.add_wine(&list, wine)
        }
    }

    /// Stamps `wine` as viewed now in the user's history.
    pub fn record_viewed(&self, user: &User, wine: &Wine) -> bool {
        let Some(list) = self.history(user) else {
            return false;
        };
        self.lists.remove_wine(&list, wine);
        self.lists.add_wine(&list, wine)
    }

    fn reserved(&self, user: &User, name: &str) -> Option<Rc<WineList>> {
        let list = self.lists.get_by_name(user, name);
        if list.is_none() {
            warn!(
                "event=reserved_list module=service status=error username={:?} list={:?} error_code=reserved_list_missing",
                user.username, name
            );
        }
        list
    }
}
