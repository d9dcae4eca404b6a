// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use bytestring::ByteString;
use serde_with::serde_as;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace, warn};

use reprise_storage_api::inbox_table::InboxEntry;
use reprise_storage_api::invocation_status_table::InvocationStatus;
use reprise_storage_api::service_status_table::VirtualObjectStatus;
use reprise_storage_api::{Result, Storage, StorageError, Transaction};
use reprise_types::identifiers::{InvocationId, ServiceId};
use reprise_types::journal::JournalEntry;

/// Every table of the store. Serialized as a whole when the store is file backed.
#[serde_as]
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Tables {
    #[serde(default)]
    pub(crate) journal: HashMap<InvocationId, Vec<JournalEntry>>,
    #[serde_as(as = "Vec<(_, _)>")]
    #[serde(default)]
    pub(crate) state: BTreeMap<ServiceId, BTreeMap<ByteString, Bytes>>,
    #[serde(default)]
    pub(crate) invocation_status: BTreeMap<InvocationId, InvocationStatus>,
    #[serde_as(as = "Vec<(_, _)>")]
    #[serde(default)]
    pub(crate) virtual_object_status: BTreeMap<ServiceId, VirtualObjectStatus>,
    #[serde_as(as = "Vec<(_, Vec<(_, _)>)>")]
    #[serde(default)]
    pub(crate) inbox: BTreeMap<ServiceId, BTreeMap<u64, InboxEntry>>,
    #[serde(default)]
    pub(crate) inbox_seq_number: u64,
}

/// Journal store shared by the processor and the running handlers.
///
/// All tables live behind one async lock. A [`PartitionStoreTransaction`] holds that lock until
/// it is committed or dropped, so transactions are serializable. When opened with a path, every
/// commit rewrites the backing file on the blocking pool before releasing the lock.
#[derive(Clone)]
pub struct PartitionStore {
    tables: Arc<Mutex<Tables>>,
    path: Option<Arc<PathBuf>>,
}

impl fmt::Debug for PartitionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Default for PartitionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl PartitionStore {
    pub fn in_memory() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            path: None,
        }
    }

    /// Opens the store backed by `path`, loading its content if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tables = match fs::read(&path) {
            Ok(content) => {
                let tables: Tables = serde_json::from_slice(&content).map_err(|e| {
                    StorageError::Conversion(anyhow::anyhow!(
                        "cannot decode store file '{}': {e}",
                        path.display()
                    ))
                })?;
                debug!(
                    path = %path.display(),
                    invocations = tables.invocation_status.len(),
                    "Loaded partition store"
                );
                tables
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Creating new partition store");
                Tables::default()
            }
            Err(e) => return Err(StorageError::Generic(e.into())),
        };

        Ok(Self {
            tables: Arc::new(Mutex::new(tables)),
            path: Some(Arc::new(path)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }
}

impl Storage for PartitionStore {
    type TransactionType = PartitionStoreTransaction;

    async fn transaction(&self) -> Self::TransactionType {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        PartitionStoreTransaction {
            guard,
            undo_log: Vec::new(),
            path: self.path.clone(),
        }
    }
}

/// Previous content of an entry touched by a transaction.
#[derive(Debug)]
pub(crate) enum Undo {
    JournalLength {
        invocation_id: InvocationId,
        length: usize,
    },
    Journal {
        invocation_id: InvocationId,
        previous: Option<Vec<JournalEntry>>,
    },
    UserState {
        service_id: ServiceId,
        key: ByteString,
        previous: Option<Bytes>,
    },
    AllUserState {
        service_id: ServiceId,
        previous: Option<BTreeMap<ByteString, Bytes>>,
    },
    InvocationStatus {
        invocation_id: InvocationId,
        previous: Option<InvocationStatus>,
    },
    VirtualObjectStatus {
        service_id: ServiceId,
        previous: Option<VirtualObjectStatus>,
    },
    Inbox {
        service_id: ServiceId,
        sequence_number: u64,
        previous: Option<InboxEntry>,
    },
    InboxSeqNumber(u64),
}

impl Tables {
    fn undo(&mut self, undo: Undo) {
        match undo {
            Undo::JournalLength {
                invocation_id,
                length: 0,
            } => {
                self.journal.remove(&invocation_id);
            }
            Undo::JournalLength {
                invocation_id,
                length,
            } => {
                if let Some(journal) = self.journal.get_mut(&invocation_id) {
                    journal.truncate(length);
                }
            }
            Undo::Journal {
                invocation_id,
                previous,
            } => match previous {
                Some(journal) => {
                    self.journal.insert(invocation_id, journal);
                }
                None => {
                    self.journal.remove(&invocation_id);
                }
            },
            Undo::UserState {
                service_id,
                key,
                previous,
            } => restore_nested(&mut self.state, service_id, key, previous),
            Undo::AllUserState {
                service_id,
                previous,
            } => restore(&mut self.state, service_id, previous),
            Undo::InvocationStatus {
                invocation_id,
                previous,
            } => restore(&mut self.invocation_status, invocation_id, previous),
            Undo::VirtualObjectStatus {
                service_id,
                previous,
            } => restore(&mut self.virtual_object_status, service_id, previous),
            Undo::Inbox {
                service_id,
                sequence_number,
                previous,
            } => restore_nested(&mut self.inbox, service_id, sequence_number, previous),
            Undo::InboxSeqNumber(seq_number) => self.inbox_seq_number = seq_number,
        }
    }
}

fn restore<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, previous: Option<V>) {
    match previous {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}

fn restore_nested<K: Ord, I: Ord, V>(
    map: &mut BTreeMap<K, BTreeMap<I, V>>,
    key: K,
    inner_key: I,
    previous: Option<V>,
) {
    match previous {
        Some(value) => {
            map.entry(key).or_default().insert(inner_key, value);
        }
        None => {
            if let Some(inner) = map.get_mut(&key) {
                inner.remove(&inner_key);
                if inner.is_empty() {
                    map.remove(&key);
                }
            }
        }
    }
}

/// Exclusive access to the tables. Writes are applied in place and every write records the
/// previous content of the entry it touched. Dropping the transaction without committing
/// replays that log backwards.
pub struct PartitionStoreTransaction {
    guard: OwnedMutexGuard<Tables>,
    undo_log: Vec<Undo>,
    path: Option<Arc<PathBuf>>,
}

impl PartitionStoreTransaction {
    pub(crate) fn tables(&self) -> &Tables {
        &self.guard
    }

    /// Applies `write` and records the [`Undo`] it returns.
    pub(crate) fn write(&mut self, write: impl FnOnce(&mut Tables) -> Undo) {
        let undo = write(&mut self.guard);
        self.undo_log.push(undo);
    }

    fn rollback(&mut self) {
        while let Some(undo) = self.undo_log.pop() {
            self.guard.undo(undo);
        }
    }
}

impl Drop for PartitionStoreTransaction {
    fn drop(&mut self) {
        if !self.undo_log.is_empty() {
            trace!(writes = self.undo_log.len(), "Rolling back uncommitted transaction");
            self.rollback();
        }
    }
}

impl Transaction for PartitionStoreTransaction {
    async fn commit(mut self) -> Result<()> {
        if self.undo_log.is_empty() {
            return Ok(());
        }
        if let Some(path) = self.path.clone() {
            // the lock stays held until the file is replaced, so files are written in commit
            // order
            if let Err(err) = persist(PathBuf::clone(&path), &self.guard).await {
                warn!(path = %path.display(), %err, "Failed to persist partition store");
                // drop restores the previous content
                return Err(err);
            }
        }
        self.undo_log.clear();
        Ok(())
    }
}

async fn persist(path: PathBuf, tables: &Tables) -> Result<()> {
    let content = serde_json::to_vec(tables)
        .map_err(|e| StorageError::Conversion(anyhow::Error::new(e)))?;
    tokio::task::spawn_blocking(move || write_file(&path, &content))
        .await
        .map_err(|e| StorageError::Generic(e.into()))?
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp).map_err(|e| StorageError::Generic(e.into()))?;
    file.write_all(content)
        .and_then(|_| file.sync_all())
        .map_err(|e| StorageError::Generic(e.into()))?;
    fs::rename(&tmp, path).map_err(|e| StorageError::Generic(e.into()))?;
    Ok(())
}
