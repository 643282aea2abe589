//! Artifact registry
//!
//! Authoritative map of tracked artifacts plus per-engine dirty flags.
//! Records live in a sharded map: writers lock one shard for the duration of
//! a single record update, readers get cloned snapshots and never wait on a
//! whole scan.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hotweave_kernel::{ArtifactKey, ArtifactRecord, EngineKind, GenerationId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, info};

/// Record kept for a purged artifact
#[derive(Debug, Clone)]
pub struct Tombstone {
    /// Last state of the record before it was purged
    pub record: ArtifactRecord,
    pub purged_at: SystemTime,
}

/// Result of applying one modification-time read to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOutcome {
    /// Modification time matched the stored one
    Unchanged,
    /// Modification time differed; the record is now tainted
    Tainted(EngineKind),
    /// Record was already tainted and left alone
    AlreadyTainted,
    /// No such record (purged between listing and reading)
    Missing,
}

/// Registry of tracked artifacts
#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    records: DashMap<ArtifactKey, ArtifactRecord>,
    tombstones: DashMap<ArtifactKey, Tombstone>,
    dirty: DashMap<EngineKind, bool>,
    next_incarnation: AtomicU64,
}

impl ArtifactRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record if its key is not registered yet.
    ///
    /// Returns `false` when the key was already present. Registering a
    /// tombstoned key revives it under a new incarnation.
    pub fn register(&self, mut record: ArtifactRecord) -> bool {
        match self.records.entry(record.key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                record.incarnation = self.next_incarnation.fetch_add(1, Ordering::Relaxed) + 1;
                if self.tombstones.remove(&record.key).is_some() {
                    debug!("Reviving tombstoned artifact: {}", record.key);
                }
                info!(
                    "Registering artifact: {} ({}, {})",
                    record.key,
                    record.engine,
                    record.source_path().display()
                );
                slot.insert(record);
                true
            }
        }
    }

    /// Snapshot of one record
    pub fn get(&self, key: &ArtifactKey) -> Option<ArtifactRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    pub fn contains(&self, key: &ArtifactKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keys of all live records
    pub fn keys(&self) -> Vec<ArtifactKey> {
        self.records.iter().map(|r| r.key().clone()).collect()
    }

    /// Snapshots of every record owned by an engine, ordered by key
    pub fn all_of(&self, engine: EngineKind) -> Vec<ArtifactRecord> {
        let mut records: Vec<ArtifactRecord> = self
            .records
            .iter()
            .filter(|r| r.engine == engine)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    /// Tainted dynamic records of an engine
    pub fn tainted_of(&self, engine: EngineKind) -> Vec<ArtifactRecord> {
        self.all_of(engine)
            .into_iter()
            .filter(|r| r.tainted && r.is_dynamic())
            .collect()
    }

    /// Taint a record and flag its engine dirty.
    ///
    /// Returns `false` if the record does not exist or was already tainted.
    pub fn mark_tainted(&self, key: &ArtifactKey) -> bool {
        let engine = match self.records.get_mut(key) {
            Some(mut record) if !record.tainted => {
                record.tainted = true;
                record.tainted_once = true;
                record.engine
            }
            _ => return false,
        };
        self.mark_dirty(engine);
        true
    }

    /// Compare an observed modification time with the stored one and update
    /// both fields in one step.
    ///
    /// Tainted records are skipped. The stored time is refreshed to the
    /// observed value whether or not the record became tainted.
    pub fn apply_mtime(&self, key: &ArtifactKey, observed: SystemTime) -> StatOutcome {
        let Some(mut record) = self.records.get_mut(key) else {
            return StatOutcome::Missing;
        };
        if record.tainted {
            return StatOutcome::AlreadyTainted;
        }
        let changed = record.last_modified != Some(observed);
        record.last_modified = Some(observed);
        if changed {
            record.tainted = true;
            record.tainted_once = true;
            StatOutcome::Tainted(record.engine)
        } else {
            StatOutcome::Unchanged
        }
    }

    /// Clear the taint after `generation` was published
    pub fn clear_taint(&self, key: &ArtifactKey, generation: GenerationId) -> bool {
        match self.records.get_mut(key) {
            Some(mut record) => {
                record.tainted = false;
                record.generation = Some(generation);
                true
            }
            None => false,
        }
    }

    /// Whether `record` is still the registered incarnation of its key
    pub fn is_live(&self, record: &ArtifactRecord) -> bool {
        self.records
            .get(&record.key)
            .is_some_and(|r| r.incarnation == record.incarnation)
    }

    /// Clear the taint of `record` and store the modification time its new
    /// generation was compiled from, unless the record was purged or
    /// replaced in the meantime. Edits made after `compiled_from` are picked
    /// up by the next scan.
    pub fn settle(
        &self,
        record: &ArtifactRecord,
        generation: GenerationId,
        compiled_from: Option<SystemTime>,
    ) -> bool {
        match self.records.get_mut(&record.key) {
            Some(mut live) if live.incarnation == record.incarnation => {
                live.tainted = false;
                live.generation = Some(generation);
                if compiled_from.is_some() {
                    live.last_modified = compiled_from;
                }
                true
            }
            _ => false,
        }
    }

    /// Remove a record from scans, keeping a tombstone.
    ///
    /// Returns the record as it was before purging.
    pub fn purge(&self, key: &ArtifactKey) -> Option<ArtifactRecord> {
        let (_, record) = self.records.remove(key)?;
        info!("Purging artifact: {}", key);
        self.tombstones.insert(
            key.clone(),
            Tombstone {
                record: record.clone(),
                purged_at: SystemTime::now(),
            },
        );
        Some(record)
    }

    /// Tombstone of a purged artifact
    pub fn tombstone(&self, key: &ArtifactKey) -> Option<Tombstone> {
        self.tombstones.get(key).map(|t| t.value().clone())
    }

    /// Flag an engine dirty. Returns `true` on a clean to dirty transition.
    pub fn mark_dirty(&self, engine: EngineKind) -> bool {
        let previous = self.dirty.insert(engine, true);
        previous != Some(true)
    }

    pub fn is_dirty(&self, engine: EngineKind) -> bool {
        self.dirty.get(&engine).is_some_and(|d| *d)
    }

    /// Read and clear an engine's dirty flag
    pub fn take_dirty(&self, engine: EngineKind) -> bool {
        self.dirty
            .insert(engine, false)
            .unwrap_or(false)
    }
}
