//! Store configuration.

use std::path::{Path, PathBuf};

/// Configuration for a record store.
///
/// # Example
///
/// ```
/// use rowlite_core::StoreConfig;
///
/// let config = StoreConfig::new("app")
///     .version(2)
///     .directory("/var/lib/myapp")
///     .worker_threads(1);
/// assert_eq!(config.version, 2);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store name; the on-disk file is `<directory>/<name>.rldb`.
    pub name: String,
    /// Schema version the application expects. Must be at least 1.
    pub version: i64,
    /// Directory holding the store file. `None` keeps the store in memory.
    pub directory: Option<PathBuf>,
    /// Threads in the async delivery pool. One thread preserves submission
    /// order; larger pools trade ordering for throughput.
    pub worker_threads: usize,
    /// Save the snapshot after every committed write.
    pub flush_on_commit: bool,
}

impl StoreConfig {
    /// Creates a configuration with the given store name.
    ///
    /// Defaults: version 1, in memory, one worker thread, flush on commit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            directory: None,
            worker_threads: 1,
            flush_on_commit: true,
        }
    }

    /// Sets the expected schema version.
    #[must_use]
    pub fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Stores the data under the given directory.
    #[must_use]
    pub fn directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.directory = Some(directory.as_ref().to_path_buf());
        self
    }

    /// Sets the async worker pool size.
    #[must_use]
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Sets whether every committed write saves the snapshot.
    #[must_use]
    pub fn flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }

    /// Path of the store file, when a directory is configured.
    #[must_use]
    pub fn store_path(&self) -> Option<PathBuf> {
        self.directory
            .as_ref()
            .map(|dir| dir.join(format!("{}.rldb", self.name)))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("store")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_path_joins_name_and_extension() {
        let config = StoreConfig::new("app").directory("/tmp/data");
        assert_eq!(
            config.store_path(),
            Some(PathBuf::from("/tmp/data/app.rldb"))
        );
        assert!(StoreConfig::new("app").store_path().is_none());
    }

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.version, 1);
        assert_eq!(config.worker_threads, 1);
        assert!(config.flush_on_commit);
    }
}
