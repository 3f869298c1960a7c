//! Durable identity storage
//!
//! Uses a sled database so a login survives restarts. The identity is kept
//! under fixed key names and removed on logout.
//!
//! sled holds an exclusive lock on its directory while open, so the database
//! is opened only for the span of one load, save or clear. Several processes
//! can then share one session directory.

use anyhow::Context;
use pbft_trade_types::Identity;
use sled::Db;
use std::path::{Path, PathBuf};
use std::time::Duration;

const TREE_NAME: &str = "session";
const TOKEN_KEY: &str = "token";
const USERNAME_KEY: &str = "username";

/// Attempts at the directory lock before giving up
const LOCK_ATTEMPTS: u32 = 10;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Persistent store for the session identity
pub struct IdentityStore {
    /// Database directory
    path: PathBuf,
}

impl IdentityStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        // Create the database and fail early on an unusable path
        store.with_tree(|_| Ok(()))?;

        tracing::info!("Opened identity store at {:?}", store.path);

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save an identity, replacing any previous one
    pub fn save(&self, identity: &Identity) -> anyhow::Result<()> {
        self.with_tree(|session| {
            session.insert(TOKEN_KEY, identity.token.as_bytes())?;
            session.insert(USERNAME_KEY, identity.username.as_bytes())?;
            Ok(())
        })
    }

    /// Load the stored identity; a half-written pair counts as absent
    pub fn load(&self) -> anyhow::Result<Option<Identity>> {
        self.with_tree(|session| {
            let token = session.get(TOKEN_KEY)?;
            let username = session.get(USERNAME_KEY)?;

            match (token, username) {
                (Some(token), Some(username)) => Ok(Some(Identity {
                    token: String::from_utf8(token.to_vec())?,
                    username: String::from_utf8(username.to_vec())?,
                })),
                _ => Ok(None),
            }
        })
    }

    /// Remove the stored identity
    pub fn clear(&self) -> anyhow::Result<()> {
        self.with_tree(|session| {
            session.remove(TOKEN_KEY)?;
            session.remove(USERNAME_KEY)?;
            Ok(())
        })
    }

    /// Run `op` on the session tree, flush, and release the database
    fn with_tree<T>(&self, op: impl FnOnce(&sled::Tree) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let db = self.open_db()?;
        let session = db.open_tree(TREE_NAME)?;
        let value = op(&session)?;
        db.flush()?;
        Ok(value)
    }

    // Another process may hold the lock for the length of one operation.
    fn open_db(&self) -> anyhow::Result<Db> {
        let mut attempt = 1;
        loop {
            match sled::open(&self.path) {
                Ok(db) => return Ok(db),
                Err(sled::Error::Io(e)) if attempt < LOCK_ATTEMPTS => {
                    tracing::debug!("Identity store busy ({}); retrying", e);
                    attempt += 1;
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("identity store at {:?} is unavailable", self.path)
                    })
                }
            }
        }
    }
}
