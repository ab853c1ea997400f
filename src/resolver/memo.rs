use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::ConfigFile;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sha256Hash(pub String);

/// Hex-encoded SHA-256 of config file content
pub fn content_hash(content: &str) -> Sha256Hash {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Sha256Hash(format!("{result:x}"))
}

/// Thread-safe memo of parsed config files keyed by path.
///
/// An entry is only served while the file content hash still matches, so an
/// edited config is re-parsed on the next lookup. `None` records a file that
/// exists but carries no config (a `package.json` without the config key).
pub struct ConfigMemo {
    inner: RwLock<HashMap<PathBuf, (Sha256Hash, Arc<Option<ConfigFile>>)>>,
}

impl Default for ConfigMemo {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigMemo {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, path: &Path, hash: Sha256Hash, value: Option<ConfigFile>) {
        let mut map = self.inner.write();
        map.insert(path.to_path_buf(), (hash, Arc::new(value)));
    }

    pub fn get(&self, path: &Path, hash: &Sha256Hash) -> Option<Arc<Option<ConfigFile>>> {
        let map = self.inner.read();
        map.get(path)
            .filter(|(cached, _)| cached == hash)
            .map(|(_, value)| Arc::clone(value))
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut map = self.inner.write();
        map.clear();
    }
}
