//! Bincode-backed key/value stores under the user config directory: the
//! curated host catalog (read side) and the per-host auth-mode overrides.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::Debug,
    fs::{File, OpenOptions},
    hash::Hash,
    io::Write,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};
use tracing::warn;

use crate::decision::OverrideStore;

pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

/// Per-host credential-automation override. Absence of a key means unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    Automate,
    Manual,
}

/// Path of a named store file, creating the config directory as needed.
pub fn config_path(name: &str) -> anyhow::Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config directory on this platform"))?
        .join(CRATE_NAME);
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(name))
}

#[derive(Debug)]
pub struct Db<K, V> {
    path: PathBuf,
    db: HashMap<K, V>,
}

impl<K, V> Db<K, V>
where
    K: Hash + Eq + Serialize + for<'de> Deserialize<'de> + Debug,
    V: Serialize + for<'de> Deserialize<'de> + Debug,
{
    /// Open a store, treating a missing or unreadable file as empty. Store
    /// trouble must never abort a connection attempt.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = PathBuf::from(path.as_ref());
        let db = if path.exists() {
            match File::open(&path).map_err(anyhow::Error::from).and_then(|f| {
                bincode::deserialize_from(f).map_err(anyhow::Error::from)
            }) {
                Ok(db) => db,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable store, treating as empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Self { path, db }
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        let data = bincode::serialize(&self.db)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        file.write_all(&data)?;
        Ok(())
    }
}

impl<K: Clone + Hash + Eq, V: Clone> Db<K, V> {
    /// Owned copy of the underlying map, for handing to a resolver.
    pub fn clone_map(&self) -> HashMap<K, V> {
        self.db.clone()
    }
}

impl<K, V> Deref for Db<K, V> {
    type Target = HashMap<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

impl<K, V> DerefMut for Db<K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.db
    }
}

impl OverrideStore for Db<String, AuthMode> {
    fn auth_override(&self, host_key: &str) -> Option<AuthMode> {
        self.db.get(host_key).copied()
    }
}
