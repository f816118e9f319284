//! User accounts.
//!
//! Registration creates the account and its reserved lists in one
//! transaction, so a user never exists without "Favourites" and "History".

use crate::db::Database;
use crate::model::user::{User, UserRole};
use crate::model::wine_list::RESERVED_LISTS;
use crate::repo::cascade::{Cascade, CascadeTarget, Dependents};
use crate::repo::{RepoError, RepoResult};
use log::{error, info, warn};
use rusqlite::{params, OptionalExtension};
use std::rc::{Rc, Weak};

pub(crate) const INSERT_LIST_SQL: &str = "INSERT INTO LIST_NAME (USERNAME, NAME) VALUES (?1, ?2)";

pub struct UserRepository {
    db: Rc<Database>,
    dependents: Dependents,
}

impl UserRepository {
    pub fn new(db: Rc<Database>) -> Self {
        Self {
            db,
            dependents: Dependents::default(),
        }
    }

    /// Subscribes `target` to account deletions.
    pub(crate) fn attach_dependent(&self, target: Weak<dyn CascadeTarget>) {
        self.dependents.attach(target);
    }

    /// Creates `user` and its reserved lists. Returns `false` when the name
    /// is taken or the write failed; nothing is written in that case.
    pub fn register(&self, user: &User) -> bool {
        match self.try_register(user) {
            Ok(()) => {
                info!(
                    "event=user_register module=repo status=ok username={:?}",
                    user.username
                );
                true
            }
            Err(err) => {
                error!(
                    "event=user_register module=repo status=error username={:?} error={}",
                    user.username, err
                );
                false
            }
        }
    }

    pub fn get(&self, username: &str) -> Option<User> {
        match self.try_get(username) {
            Ok(user) => user,
            Err(err) => {
                error!("event=user_get module=repo status=error username={username:?} error={err}");
                None
            }
        }
    }

    pub fn update_password(&self, username: &str, password_hash: &str, salt: &str) -> bool {
        let updated = self.db.execute(
            "UPDATE USER SET PASSWORD_HASH = ?1, SALT = ?2 WHERE USERNAME = ?3",
            params![password_hash, salt, username],
        );
        match updated {
            Ok(1) => {
                info!("event=user_password module=repo status=ok username={username:?}");
                true
            }
            Ok(_) => {
                warn!("event=user_password module=repo status=error username={username:?} error_code=user_not_found");
                false
            }
            Err(err) => {
                error!("event=user_password module=repo status=error username={username:?} error={err}");
                false
            }
        }
    }

    /// Deletes every account; their lists, tours, notes and reviews cascade,
    /// in storage and in the caches.
    pub fn delete_all(&self) -> bool {
        match self.db.execute("DELETE FROM USER", []) {
            Ok(changed) => {
                self.dependents.notify(Cascade::AllUsers);
                info!("event=user_delete_all module=repo status=ok rows={changed}");
                true
            }
            Err(err) => {
                error!("event=user_delete_all module=repo status=error error={err}");
                false
            }
        }
    }

    fn try_register(&self, user: &User) -> RepoResult<()> {
        if user.username.trim().is_empty() {
            return Err(RepoError::Rejected("username must not be blank".to_string()));
        }

        let tx = self.db.transaction()?;
        self.db.execute(
            "INSERT INTO USER (USERNAME, PASSWORD_HASH, ROLE, SALT) VALUES (?1, ?2, ?3, ?4)",
            params![user.username, user.password_hash, user.role.as_db(), user.salt],
        )?;
        for name in RESERVED_LISTS {
            self.db.execute(INSERT_LIST_SQL, params![user.username, name])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn try_get(&self, username: &str) -> RepoResult<Option<User>> {
        let mut stmt = self
            .db
            .prepare("SELECT USERNAME, PASSWORD_HASH, SALT, ROLE FROM USER WHERE USERNAME = ?1")?;
        let row = stmt
            .query_row(params![username], |row| {
                Ok((
                    row.get::<_, String>("USERNAME")?,
                    row.get::<_, String>("PASSWORD_HASH")?,
                    row.get::<_, String>("SALT")?,
                    row.get::<_, String>("ROLE")?,
                ))
            })
            .optional()?;

        let Some((username, password_hash, salt, role)) = row else {
            return Ok(None);
        };
        let role = UserRole::parse_db(&role)
            .ok_or_else(|| RepoError::InvalidData(format!("unknown role `{role}` in USER.ROLE")))?;
        Ok(Some(User {
            username,
            password_hash,
            salt,
            role,
        }))
    }
}
