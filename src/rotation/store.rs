//! # Rotation Store
//!
//! Loads, reconciles, and persists the per-service rotation state.
//!
//! The cache file is one JSON document mapping service identifiers to their
//! ordered location lists, so several monitored services can share a cache.
//! A sidecar lock file is held exclusively from open until the store drops,
//! covering the whole read-modify-write of one run, so concurrent
//! invocations for the same cache serialize instead of losing updates.
//!
//! Every cache problem is recoverable: an unreadable document falls back to
//! the configured order (rotation restarts from scratch), and a failed
//! persist is logged and otherwise ignored.

use fs2::FileExt;
use log::warn;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::common::messages::Location;

/// Cache read/write/lock failure. Recovered by the caller, never fatal.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("cannot open rotation cache {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("cannot lock rotation cache {}: {source}", .path.display())]
    Lock { path: PathBuf, source: io::Error },
    #[error("cannot write rotation cache {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("cannot encode rotation cache: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Handle on the rotation cache, exclusively locked for the lifetime of
/// one dispatcher run.
pub struct RotationStore {
    path: PathBuf,
    /// Sidecar lock; the flock releases when the handle drops
    _lock: File,
    doc: HashMap<String, Vec<Location>>,
}

impl RotationStore {
    /// Open the cache and take the exclusive lock.
    ///
    /// A missing cache file is a normal first run. An unparsable one is
    /// logged and treated as empty; rotation restarts from scratch.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| PersistenceError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }

        let lock_path = path.with_extension("lock");
        let lock = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&lock_path)
            .map_err(|source| PersistenceError::Open {
                path: lock_path.clone(),
                source,
            })?;
        lock.lock_exclusive().map_err(|source| PersistenceError::Lock {
            path: lock_path,
            source,
        })?;

        let doc = match fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(
                        "⚠️  rotation cache {} is unreadable ({}); rotation restarts from scratch",
                        path.display(),
                        e
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(
                    "⚠️  cannot read rotation cache {} ({}); rotation restarts from scratch",
                    path.display(),
                    e
                );
                HashMap::new()
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
            doc,
        })
    }

    /// Merge the cached state for one service with the freshly configured
    /// locations.
    ///
    /// The hostname is the stable identity: entries present in the cache
    /// keep their position, `ipaddr` and `authkey` are always refreshed
    /// from the configuration, configured hostnames missing from the cache
    /// are inserted, and cached hostnames absent from the configuration
    /// are dropped. Any insertion or removal forces a full rebuild sorted
    /// by hostname; otherwise the cached order is preserved.
    pub fn reconcile(&self, service: &str, configured: &[Location]) -> Vec<Location> {
        match self.doc.get(service) {
            None => fresh_state(configured),
            Some(cached) if cached.is_empty() => fresh_state(configured),
            Some(cached) => {
                let by_hostname: HashMap<&str, &Location> = configured
                    .iter()
                    .map(|l| (l.hostname.as_str(), l))
                    .collect();

                let mut merged: Vec<Location> = cached
                    .iter()
                    .filter(|c| by_hostname.contains_key(c.hostname.as_str()))
                    .cloned()
                    .collect();
                let removed = merged.len() != cached.len();

                for location in &mut merged {
                    if let Some(conf) = by_hostname.get(location.hostname.as_str()) {
                        location.ipaddr = conf.ipaddr.clone();
                        location.authkey = conf.authkey.clone();
                    }
                }

                let mut added = false;
                for conf in configured {
                    if !merged.iter().any(|l| l.hostname == conf.hostname) {
                        let mut fresh = conf.clone();
                        fresh.last = false;
                        merged.push(fresh);
                        added = true;
                    }
                }

                if removed || added {
                    merged.sort_by(|a, b| a.hostname.cmp(&b.hostname));
                }
                merged
            }
        }
    }

    /// Write the full cache document back, replacing this service's state.
    ///
    /// The document is written to a temporary file and renamed into place,
    /// so a reader never observes partial content.
    pub fn persist(&mut self, service: &str, state: &[Location]) -> Result<(), PersistenceError> {
        self.doc.insert(service.to_string(), state.to_vec());
        let json = serde_json::to_string_pretty(&self.doc)?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|source| PersistenceError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

/// First-run state: the configured locations sorted by hostname, no
/// rotation marker yet.
pub fn fresh_state(configured: &[Location]) -> Vec<Location> {
    let mut state: Vec<Location> = configured
        .iter()
        .map(|l| {
            let mut fresh = l.clone();
            fresh.last = false;
            fresh
        })
        .collect();
    state.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn locations(hostnames: &[&str]) -> Vec<Location> {
        hostnames
            .iter()
            .enumerate()
            .map(|(i, h)| Location::new(h, &format!("192.0.2.{}", i + 1)))
            .collect()
    }

    #[test]
    fn first_run_initializes_sorted_with_no_marker() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rotation.json");

        let store = RotationStore::open(&path).unwrap();
        let state = store.reconcile("svc", &locations(&["charlie", "alpha", "bravo"]));

        let order: Vec<&str> = state.iter().map(|l| l.hostname.as_str()).collect();
        assert_eq!(order, vec!["alpha", "bravo", "charlie"]);
        assert!(state.iter().all(|l| !l.last));
    }

    #[test]
    fn round_trip_preserves_order_and_marker() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rotation.json");
        let configured = locations(&["alpha", "bravo", "charlie"]);

        {
            let mut store = RotationStore::open(&path).unwrap();
            let mut state = store.reconcile("svc", &configured);
            state[1].last = true;
            store.persist("svc", &state).unwrap();
        }

        let store = RotationStore::open(&path).unwrap();
        let state = store.reconcile("svc", &configured);
        let order: Vec<&str> = state.iter().map(|l| l.hostname.as_str()).collect();
        assert_eq!(order, vec!["alpha", "bravo", "charlie"]);
        assert!(!state[0].last && state[1].last && !state[2].last);
    }

    #[test]
    fn added_and_removed_hostnames_force_a_sorted_rebuild() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rotation.json");

        {
            let mut store = RotationStore::open(&path).unwrap();
            let mut state = store.reconcile("svc", &locations(&["alpha", "bravo", "charlie"]));
            state[2].last = true;
            store.persist("svc", &state).unwrap();
        }

        // bravo leaves the configuration, delta joins.
        let store = RotationStore::open(&path).unwrap();
        let state = store.reconcile("svc", &locations(&["alpha", "charlie", "delta"]));

        let order: Vec<&str> = state.iter().map(|l| l.hostname.as_str()).collect();
        assert_eq!(order, vec!["alpha", "charlie", "delta"]);
        // charlie keeps its marker through the rebuild, delta starts clean.
        assert!(state.iter().find(|l| l.hostname == "charlie").unwrap().last);
        assert!(!state.iter().find(|l| l.hostname == "delta").unwrap().last);
    }

    #[test]
    fn ipaddr_refreshes_without_disturbing_the_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rotation.json");
        let configured = locations(&["bravo", "alpha"]);

        {
            let mut store = RotationStore::open(&path).unwrap();
            let mut state = store.reconcile("svc", &configured);
            // Simulate a cache where rotation has reordered nothing but the
            // marker sits on the first entry.
            state[0].last = true;
            store.persist("svc", &state).unwrap();
        }

        let mut updated = locations(&["bravo", "alpha"]);
        updated[0].ipaddr = "198.51.100.7".to_string();

        let store = RotationStore::open(&path).unwrap();
        let state = store.reconcile("svc", &updated);
        let bravo = state.iter().find(|l| l.hostname == "bravo").unwrap();
        assert_eq!(bravo.ipaddr, "198.51.100.7");
        // Same hostnames, so the cached (sorted-on-first-run) order stands.
        let order: Vec<&str> = state.iter().map(|l| l.hostname.as_str()).collect();
        assert_eq!(order, vec!["alpha", "bravo"]);
    }

    #[test]
    fn unreadable_cache_falls_back_to_configured_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rotation.json");
        fs::write(&path, "{ not json").unwrap();

        let store = RotationStore::open(&path).unwrap();
        let state = store.reconcile("svc", &locations(&["bravo", "alpha"]));
        let order: Vec<&str> = state.iter().map(|l| l.hostname.as_str()).collect();
        assert_eq!(order, vec!["alpha", "bravo"]);
    }

    #[test]
    fn services_do_not_clobber_each_other() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rotation.json");

        {
            let mut store = RotationStore::open(&path).unwrap();
            let state = store.reconcile("svc-a", &locations(&["alpha"]));
            store.persist("svc-a", &state).unwrap();
        }
        {
            let mut store = RotationStore::open(&path).unwrap();
            let state = store.reconcile("svc-b", &locations(&["bravo"]));
            store.persist("svc-b", &state).unwrap();
        }

        let store = RotationStore::open(&path).unwrap();
        assert_eq!(store.reconcile("svc-a", &locations(&["alpha"]))[0].hostname, "alpha");
        assert_eq!(store.reconcile("svc-b", &locations(&["bravo"]))[0].hostname, "bravo");
    }
}
