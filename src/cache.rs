use log::{debug, info};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::loader::{self, Source};
use crate::record::SalesDataset;
use crate::schema::HeaderAliases;

/// Identity of a loaded source
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceKey {
    File(PathBuf),
    Upload(String),
}

impl SourceKey {
    pub fn for_path(path: &Path) -> Self {
        SourceKey::File(std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()))
    }
}

/// Memoized dataset loading keyed by source.
///
/// The same source always yields the same parsed table until `reload`,
/// `invalidate` or a new upload replaces it. Nothing is re-read implicitly.
pub struct DatasetCache {
    aliases: HeaderAliases,
    entries: HashMap<SourceKey, Arc<SalesDataset>>,
    current: Option<SourceKey>,
}

impl DatasetCache {
    pub fn new(aliases: HeaderAliases) -> Self {
        DatasetCache {
            aliases,
            entries: HashMap::new(),
            current: None,
        }
    }

    pub fn aliases(&self) -> &HeaderAliases {
        &self.aliases
    }

    /// Returns the cached table for `path`, loading it on first use
    pub fn get_or_load(&mut self, path: &Path) -> Result<Arc<SalesDataset>> {
        let key = SourceKey::for_path(path);
        if let Some(dataset) = self.entries.get(&key) {
            debug!("cache hit for {:?}", key);
            self.current = Some(key);
            return Ok(Arc::clone(dataset));
        }
        self.load_into(key, path)
    }

    /// Re-reads `path` even if it is cached
    pub fn reload(&mut self, path: &Path) -> Result<Arc<SalesDataset>> {
        let key = SourceKey::for_path(path);
        info!("reloading {}", path.display());
        self.entries.remove(&key);
        self.load_into(key, path)
    }

    fn load_into(&mut self, key: SourceKey, path: &Path) -> Result<Arc<SalesDataset>> {
        let dataset = Arc::new(loader::load(Source::Path(path), &self.aliases)?);
        self.entries.insert(key.clone(), Arc::clone(&dataset));
        self.current = Some(key);
        Ok(dataset)
    }

    /// Parses an uploaded file and makes it the current dataset.
    ///
    /// A failed upload leaves the previous current dataset in place.
    pub fn replace_with_upload(&mut self, name: &str, bytes: &[u8]) -> Result<Arc<SalesDataset>> {
        let dataset = Arc::new(loader::load(Source::Upload { name, bytes }, &self.aliases)?);
        info!("installed upload {} with {} rows", name, dataset.len());
        let key = SourceKey::Upload(name.to_string());
        self.entries.insert(key.clone(), Arc::clone(&dataset));
        self.current = Some(key);
        Ok(dataset)
    }

    pub fn invalidate(&mut self, key: &SourceKey) -> bool {
        if self.current.as_ref() == Some(key) {
            self.current = None;
        }
        self.entries.remove(key).is_some()
    }

    /// The dataset most recently loaded, reloaded or uploaded
    pub fn current(&self) -> Option<Arc<SalesDataset>> {
        self.current
            .as_ref()
            .and_then(|k| self.entries.get(k))
            .map(Arc::clone)
    }

    pub fn current_key(&self) -> Option<&SourceKey> {
        self.current.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DatasetCache {
    fn default() -> Self {
        DatasetCache::new(HeaderAliases::default())
    }
}
