//! Per-user wine lists and their membership.
//!
//! # Invariants
//! - A (list, wine) pair is stored at most once; adding it again is a no-op.
//! - Reserved lists cannot be created a second time or deleted.
//! - List names are unique per user.

use crate::cache::IdentityCache;
use crate::db::Database;
use crate::model::review::now_epoch_ms;
use crate::model::user::User;
use crate::model::wine::Wine;
use crate::model::wine_list::{is_reserved_name, WineList};
use crate::model::{Entity, EntityKey, UNPERSISTED_KEY};
use crate::repo::cascade::{Cascade, CascadeTarget};
use crate::repo::materialize::{materialize, query_rows};
use crate::repo::user_repo::INSERT_LIST_SQL;
use crate::repo::{RepoError, RepoResult};
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use rusqlite::{params, Row};
use std::rc::Rc;

const LIST_SELECT_SQL: &str = "SELECT ID AS list_id, USERNAME, NAME FROM LIST_NAME";

pub struct WineListRepository {
    db: Rc<Database>,
    cache: IdentityCache<WineList>,
}

impl WineListRepository {
    pub fn new(db: Rc<Database>) -> Self {
        Self {
            db,
            cache: IdentityCache::new(WineList::KIND),
        }
    }

    /// Creates a list named `name` for `user`.
    pub fn create(&self, user: &User, name: &str) -> Option<Rc<WineList>> {
        match self.try_create(user, name) {
            Ok(list) => {
                info!(
                    "event=list_create module=repo status=ok id={} username={:?}",
                    list.key(),
                    user.username
                );
                Some(list)
            }
            Err(err) => {
                error!(
                    "event=list_create module=repo status=error username={:?} name={:?} error={}",
                    user.username, name, err
                );
                None
            }
        }
    }

    /// Deletes `list` and its items. Reserved and unpersisted lists are
    /// refused.
    pub fn delete(&self, list: &WineList) -> bool {
        if list.key() == UNPERSISTED_KEY {
            debug!("event=list_delete module=repo status=skip reason=unpersisted");
            return false;
        }
        if list.is_reserved() {
            warn!(
                "event=list_delete module=repo status=skip id={} reason=reserved",
                list.key()
            );
            return false;
        }

        let id = list.key();
        match self.db.execute("DELETE FROM LIST_NAME WHERE ID = ?1", params![id]) {
            Ok(changed) => {
                self.cache.release(id);
                list.unpersist();
                info!("event=list_delete module=repo status=ok id={id} rows={changed}");
                changed == 1
            }
            Err(err) => {
                error!("event=list_delete module=repo status=error id={id} error={err}");
                false
            }
        }
    }

    /// Lists owned by `user`, in creation order.
    pub fn get_all(&self, user: &User) -> Vec<Rc<WineList>> {
        let sql = format!("{LIST_SELECT_SQL} WHERE USERNAME = ?1 ORDER BY ID ASC");
        self.fetch(&sql, vec![Value::Text(user.username.clone())])
    }

    pub fn get_by_name(&self, user: &User, name: &str) -> Option<Rc<WineList>> {
        let sql = format!("{LIST_SELECT_SQL} WHERE USERNAME = ?1 AND NAME = ?2");
        self.fetch(
            &sql,
            vec![
                Value::Text(user.username.clone()),
                Value::Text(name.to_string()),
            ],
        )
        .into_iter()
        .next()
    }

    pub fn is_wine_in_list(&self, list: &WineList, wine: &Wine) -> bool {
        let found = self
            .db
            .prepare("SELECT EXISTS (SELECT 1 FROM LIST_ITEMS WHERE LIST_ID = ?1 AND WINE_ID = ?2)")
            .and_then(|mut stmt| {
                stmt.query_row(params![list.key(), wine.key()], |row| row.get::<_, bool>(0))
            });
        found.unwrap_or_else(|err| {
            error!(
                "event=list_contains module=repo status=error list_id={} wine_id={} error={}",
                list.key(),
                wine.key(),
                err
            );
            false
        })
    }

    /// Adds `wine` to `list`, stamped with the current time. Returns `true`
    /// only when a new item row was written.
    pub fn add_wine(&self, list: &WineList, wine: &Wine) -> bool {
        let inserted = self.db.execute(
            "INSERT OR IGNORE INTO LIST_ITEMS (LIST_ID, WINE_ID, DATE_ADDED) VALUES (?1, ?2, ?3)",
            params![list.key(), wine.key(), now_epoch_ms()],
        );
        match inserted {
            Ok(changed) => {
                info!(
                    "event=list_add_wine module=repo status=ok list_id={} wine_id={} rows={}",
                    list.key(),
                    wine.key(),
                    changed
                );
                changed == 1
            }
            Err(err) => {
                error!(
                    "event=list_add_wine module=repo status=error list_id={} wine_id={} error={}",
                    list.key(),
                    wine.key(),
                    err
                );
                false
            }
        }
    }

    pub fn remove_wine(&self, list: &WineList, wine: &Wine) -> bool {
        let removed = self.db.execute(
            "DELETE FROM LIST_ITEMS WHERE LIST_ID = ?1 AND WINE_ID = ?2",
            params![list.key(), wine.key()],
        );
        match removed {
            Ok(changed) => changed == 1,
            Err(err) => {
                error!(
                    "event=list_remove_wine module=repo status=error list_id={} wine_id={} error={}",
                    list.key(),
                    wine.key(),
                    err
                );
                false
            }
        }
    }

    fn try_create(&self, user: &User, name: &str) -> RepoResult<Rc<WineList>> {
        if name.trim().is_empty() {
            return Err(RepoError::Rejected("list name must not be blank".to_string()));
        }
        if is_reserved_name(name) {
            return Err(RepoError::Rejected(format!("`{name}` is a reserved list")));
        }
        let taken = self
            .db
            .prepare("SELECT EXISTS (SELECT 1 FROM LIST_NAME WHERE USERNAME = ?1 AND NAME = ?2)")?
            .query_row(params![user.username, name], |row| row.get::<_, bool>(0))?;
        if taken {
            return Err(RepoError::Rejected(format!("list `{name}` already exists")));
        }

        self.db.execute(INSERT_LIST_SQL, params![user.username, name])?;
        let id = self.db.last_insert_rowid();
        let list = WineList::with_key(id, user.username.clone(), name.to_string());
        if self.db.use_cache() {
            self.cache.register(id, &list);
        }
        Ok(list)
    }

    fn fetch(&self, sql: &str, params: Vec<Value>) -> Vec<Rc<WineList>> {
        match query_rows(&self.db, sql, params, |row| self.materialize_row(row)) {
            Ok(lists) => lists,
            Err(err) => {
                error!("event=list_get module=repo status=error error={err}");
                Vec::new()
            }
        }
    }

    fn materialize_row(&self, row: &Row<'_>) -> rusqlite::Result<Rc<WineList>> {
        materialize(
            row,
            "list_id",
            &self.cache,
            self.db.use_cache(),
            list_from_row,
            |_| {},
        )
    }
}

impl CascadeTarget for WineListRepository {
    fn parent_deleted(&self, cascade: Cascade) {
        if cascade != Cascade::AllUsers {
            return;
        }
        let released = self.cache.drain();
        for list in &released {
            list.unpersist();
        }
        debug!(
            "event=list_cascade module=repo status=ok released={}",
            released.len()
        );
    }
}

fn list_from_row(key: EntityKey, row: &Row<'_>) -> rusqlite::Result<Rc<WineList>> {
    Ok(WineList::with_key(key, row.get("USERNAME")?, row.get("NAME")?))
}
