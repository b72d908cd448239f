//! Staleness-aware on-disk memoization of source fetches.
//!
//! Each entry lives at `{root}/{operation}/{digest}.json`. The file's
//! modification time is the write stamp and is compared with the policy's
//! freshness deadline on every read.

pub mod clock;
pub mod freshness;
pub mod key;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde::Serialize;
use time::OffsetDateTime;

pub use clock::{Clock, ManualClock, SystemClock};
pub use freshness::{Frequency, FreshnessPolicy};
pub use key::CacheKey;

use crate::error::{CacheError, FetchError};
use crate::source::SourceFetcher;

/// How a single read treats the stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Return a fresh entry if there is one, otherwise fetch and store.
    #[default]
    Use,
    /// Always fetch and overwrite the entry.
    Refresh,
    /// Always fetch; never read or write the entry.
    Bypass,
}

/// Counters for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationStats {
    pub hits: u64,
    pub fetches: u64,
    pub failures: u64,
}

pub struct FetchCache<C: Clock = SystemClock> {
    root: PathBuf,
    policy: FreshnessPolicy,
    clock: C,
    stats: Mutex<BTreeMap<String, OperationStats>>,
}

impl FetchCache {
    pub fn new(root: impl Into<PathBuf>, policy: FreshnessPolicy) -> Self {
        Self::with_clock(root, policy, SystemClock)
    }
}

impl<C: Clock> FetchCache<C> {
    pub fn with_clock(root: impl Into<PathBuf>, policy: FreshnessPolicy, clock: C) -> Self {
        Self {
            root: root.into(),
            policy,
            clock,
            stats: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn entry_path<A: Serialize + ?Sized>(
        &self,
        operation: &str,
        args: &A,
    ) -> Result<PathBuf, CacheError> {
        let key = CacheKey::new(operation, args)?;
        Ok(self.path_for(&key))
    }

    /// Write stamp of an entry, if one exists.
    pub fn written_at<A: Serialize + ?Sized>(
        &self,
        operation: &str,
        args: &A,
    ) -> Result<Option<OffsetDateTime>, CacheError> {
        let path = self.entry_path(operation, args)?;
        modified_at(&path)
    }

    pub fn read<A, T, F>(&self, operation: &str, args: &A, fetch: F) -> Result<T, CacheError>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce(&A) -> Result<T, FetchError>,
    {
        self.read_with(CacheMode::Use, operation, args, fetch)
    }

    /// Fetch through `source`, keyed by its name and `args`.
    pub fn read_source<S: SourceFetcher>(
        &self,
        source: &S,
        args: &S::Args,
    ) -> Result<S::Output, CacheError> {
        self.read(source.name(), args, |args| source.fetch(args))
    }

    pub fn read_with<A, T, F>(
        &self,
        mode: CacheMode,
        operation: &str,
        args: &A,
        fetch: F,
    ) -> Result<T, CacheError>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce(&A) -> Result<T, FetchError>,
    {
        let key = CacheKey::new(operation, args)?;
        let path = self.path_for(&key);

        if mode == CacheMode::Use {
            if let Some(value) = self.load_fresh(&path)? {
                self.record(operation, |stats| stats.hits += 1);
                tracing::debug!(operation, key = key.digest(), "cache hit");
                return Ok(value);
            }
        }

        let value = match fetch(args) {
            Ok(value) => value,
            Err(source) => {
                self.record(operation, |stats| stats.failures += 1);
                tracing::warn!(operation, key = key.digest(), error = %source, "fetch failed");
                return Err(CacheError::Fetch {
                    operation: operation.to_string(),
                    source,
                });
            }
        };
        self.record(operation, |stats| stats.fetches += 1);

        if mode != CacheMode::Bypass {
            self.persist(&path, &value)?;
            tracing::debug!(operation, key = key.digest(), "cache entry written");
        }
        Ok(value)
    }

    pub fn stats(&self, operation: &str) -> OperationStats {
        self.stats
            .lock()
            .expect("cache stats should not be poisoned")
            .get(operation)
            .copied()
            .unwrap_or_default()
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.operation()).join(key.file_name())
    }

    fn load_fresh<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, CacheError> {
        let written = modified_at(path)?;
        if self.policy.is_stale(written, self.clock.now()) {
            return Ok(None);
        }

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "undecodable cache entry treated as stale");
                Ok(None)
            }
        }
    }

    // Written beside the target and renamed into place, so a failed write
    // never replaces the previous entry.
    fn persist<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = serde_json::to_vec(value)?;
        let tmp_path = path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.set_modified(SystemTime::from(self.clock.now()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn record(&self, operation: &str, update: impl FnOnce(&mut OperationStats)) {
        let mut stats = self.stats.lock().expect("cache stats should not be poisoned");
        update(stats.entry(operation.to_string()).or_default());
    }
}

fn modified_at(path: &Path) -> Result<Option<OffsetDateTime>, CacheError> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(OffsetDateTime::from(metadata.modified()?))),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}
