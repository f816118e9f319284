//! Tasting notes: one free-text note per (user, wine).
//!
//! # Responsibility
//! - Hand out the note for a (user, wine) pair, blank when none is stored.
//! - Keep the `NOTES` row in step with the note text.
//!
//! # Invariants
//! - A blank note has the unpersisted key, no row and no cache entry.
//! - With the cache enabled, repeated lookups of the same (user, wine) hand
//!   out the same blank note while it stays blank.
//! - Text becoming non-empty on an unpersisted note inserts the row and
//!   assigns the key; text becoming empty on a persisted note deletes the
//!   row and resets the key; other non-empty edits update the row.

use crate::cache::IdentityCache;
use crate::db::Database;
use crate::model::note::Note;
use crate::model::user::User;
use crate::model::wine::Wine;
use crate::model::{Entity, EntityKey, UNPERSISTED_KEY};
use crate::repo::cascade::{Cascade, CascadeTarget};
use crate::repo::materialize::{materialize, query_rows};
use log::{debug, error, info};
use rusqlite::types::Value;
use rusqlite::{params, Row};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub(crate) const NOTE_COLUMNS: &str =
    "NOTES.ID AS note_id, NOTES.USERNAME, NOTES.WINE_ID AS note_wine_id, NOTES.NOTE";

/// Storage side of the note lifecycle, shared by the repository and every
/// note's text listener.
struct NoteSync {
    db: Rc<Database>,
    cache: IdentityCache<Note>,
    blanks: RefCell<HashMap<(String, EntityKey), Weak<Note>>>,
}

impl NoteSync {
    fn on_text_changed(&self, note: &Rc<Note>, text: &str) {
        match (note.is_persisted(), text.is_empty()) {
            (false, true) => {
                debug!("event=note_sync module=repo status=skip reason=blank_unpersisted");
            }
            (false, false) => self.insert(note, text),
            (true, true) => self.delete(note),
            (true, false) => self.update(note, text),
        }
    }

    fn insert(&self, note: &Rc<Note>, text: &str) {
        let inserted = self.db.execute(
            "INSERT INTO NOTES (USERNAME, WINE_ID, NOTE) VALUES (?1, ?2, ?3)",
            params![note.username(), note.wine_id(), text],
        );
        match inserted {
            Ok(_) => {
                let id = self.db.last_insert_rowid();
                note.set_key(id);
                if self.db.use_cache() {
                    self.cache.register(id, note);
                }
                info!(
                    "event=note_insert module=repo status=ok id={} wine_id={}",
                    id,
                    note.wine_id()
                );
            }
            Err(err) => {
                error!(
                    "event=note_insert module=repo status=error username={:?} wine_id={} error={}",
                    note.username(),
                    note.wine_id(),
                    err
                );
            }
        }
    }

    fn delete(&self, note: &Rc<Note>) {
        let id = note.key();
        match self.db.execute("DELETE FROM NOTES WHERE ID = ?1", params![id]) {
            Ok(changed) => {
                self.cache.release(id);
                note.set_key(UNPERSISTED_KEY);
                self.remember_blank(note);
                info!("event=note_delete module=repo status=ok id={id} rows={changed}");
            }
            Err(err) => {
                error!("event=note_delete module=repo status=error id={id} error={err}");
            }
        }
    }

    fn update(&self, note: &Rc<Note>, text: &str) {
        let id = note.key();
        match self
            .db
            .execute("UPDATE NOTES SET NOTE = ?1 WHERE ID = ?2", params![text, id])
        {
            Ok(1) => info!("event=note_update module=repo status=ok id={id}"),
            Ok(changed) => error!(
                "event=note_update module=repo status=error id={id} rows={changed} error_code=row_not_found"
            ),
            Err(err) => error!("event=note_update module=repo status=error id={id} error={err}"),
        }
    }

    fn live_blank(&self, slot: &(String, EntityKey)) -> Option<Rc<Note>> {
        let blank = self.blanks.borrow().get(slot).and_then(Weak::upgrade)?;
        (!blank.is_persisted()).then_some(blank)
    }

    fn remember_blank(&self, note: &Rc<Note>) {
        if !self.db.use_cache() {
            return;
        }
        let mut blanks = self.blanks.borrow_mut();
        blanks.retain(|_, weak| weak.strong_count() > 0);
        blanks.insert(
            (note.username().to_string(), note.wine_id()),
            Rc::downgrade(note),
        );
    }
}

pub struct NoteRepository {
    sync: Rc<NoteSync>,
}

impl NoteRepository {
    pub fn new(db: Rc<Database>) -> Self {
        Self {
            sync: Rc::new(NoteSync {
                db,
                cache: IdentityCache::new(Note::KIND),
                blanks: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn cache(&self) -> &IdentityCache<Note> {
        &self.sync.cache
    }

    /// Note `user` keeps for `wine`; a blank unpersisted note when there is
    /// none. `None` only when the lookup failed.
    pub fn get(&self, user: &User, wine: &Wine) -> Option<Rc<Note>> {
        let fetched = query_rows(
            &self.sync.db,
            &format!("SELECT {NOTE_COLUMNS} FROM NOTES WHERE NOTES.USERNAME = ?1 AND NOTES.WINE_ID = ?2"),
            vec![
                Value::Text(user.username.clone()),
                Value::Integer(wine.key()),
            ],
            |row| self.materialize_row(row, "note_id"),
        );

        match fetched {
            Ok(notes) => Some(
                notes
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| self.blank(user, wine)),
            ),
            Err(err) => {
                error!(
                    "event=note_get module=repo status=error username={:?} wine_id={} error={}",
                    user.username,
                    wine.key(),
                    err
                );
                None
            }
        }
    }

    /// Stored notes of `user`, in key order.
    pub fn get_all_for_user(&self, user: &User) -> Vec<Rc<Note>> {
        self.fetch(
            &format!("SELECT {NOTE_COLUMNS} FROM NOTES WHERE NOTES.USERNAME = ?1 ORDER BY NOTES.ID ASC"),
            vec![Value::Text(user.username.clone())],
        )
    }

    pub fn get_all(&self) -> Vec<Rc<Note>> {
        self.fetch(
            &format!("SELECT {NOTE_COLUMNS} FROM NOTES ORDER BY NOTES.ID ASC"),
            Vec::new(),
        )
    }

    /// Clears the note text, which deletes its row. Returns whether a stored
    /// note was removed.
    pub fn delete(&self, note: &Rc<Note>) -> bool {
        let was_persisted = note.is_persisted();
        note.text.set(String::new());
        was_persisted && !note.is_persisted()
    }

    /// Materializes the note part of a row selected with [`NOTE_COLUMNS`].
    pub(crate) fn materialize_row(
        &self,
        row: &Row<'_>,
        id_column: &str,
    ) -> rusqlite::Result<Rc<Note>> {
        materialize(
            row,
            id_column,
            &self.sync.cache,
            self.sync.db.use_cache(),
            note_from_row,
            |note| self.bind(note),
        )
    }

    fn fetch(&self, sql: &str, params: Vec<Value>) -> Vec<Rc<Note>> {
        query_rows(&self.sync.db, sql, params, |row| {
            self.materialize_row(row, "note_id")
        })
        .unwrap_or_else(|err| {
            error!("event=note_get_all module=repo status=error error={err}");
            Vec::new()
        })
    }

    fn blank(&self, user: &User, wine: &Wine) -> Rc<Note> {
        let slot = (user.username.clone(), wine.key());
        if let Some(existing) = self.sync.live_blank(&slot) {
            return existing;
        }
        let blank = Note::blank(slot.0, slot.1);
        self.bind(&blank);
        self.sync.remember_blank(&blank);
        blank
    }

    fn bind(&self, note: &Rc<Note>) {
        let owner = Rc::downgrade(note);
        let sync = Rc::clone(&self.sync);
        note.text.subscribe(move |_, text| {
            if let Some(note) = owner.upgrade() {
                sync.on_text_changed(&note, text);
            }
        });
    }
}

impl CascadeTarget for NoteRepository {
    fn parent_deleted(&self, cascade: Cascade) {
        let released = match cascade {
            Cascade::Wine(wine_id) => {
                self.sync
                    .blanks
                    .borrow_mut()
                    .retain(|(_, blank_wine), _| *blank_wine != wine_id);
                self.sync
                    .cache
                    .release_matching(|note| note.wine_id() == wine_id)
            }
            Cascade::AllWines | Cascade::AllUsers => {
                self.sync.blanks.borrow_mut().clear();
                self.sync.cache.drain()
            }
        };
        for note in &released {
            note.set_key(UNPERSISTED_KEY);
        }
        debug!(
            "event=note_cascade module=repo status=ok cascade={:?} released={}",
            cascade,
            released.len()
        );
    }
}

fn note_from_row(key: EntityKey, row: &Row<'_>) -> rusqlite::Result<Rc<Note>> {
    Ok(Note::with_key(
        key,
        row.get("USERNAME")?,
        row.get("note_wine_id")?,
        row.get("NOTE")?,
    ))
}
