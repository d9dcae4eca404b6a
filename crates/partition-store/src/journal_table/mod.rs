// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use anyhow::anyhow;

use reprise_storage_api::journal_table::{ReadJournalTable, WriteJournalTable};
use reprise_storage_api::{Result, StorageError};
use reprise_types::identifiers::{EntryIndex, InvocationId};
use reprise_types::journal::JournalEntry;

use crate::PartitionStoreTransaction;
use crate::partition_store::Undo;

impl ReadJournalTable for PartitionStoreTransaction {
    async fn get_journal(&mut self, invocation_id: &InvocationId) -> Result<Vec<JournalEntry>> {
        Ok(self
            .tables()
            .journal
            .get(invocation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_journal_length(&mut self, invocation_id: &InvocationId) -> Result<EntryIndex> {
        journal_length(self, invocation_id)
    }
}

fn journal_length(
    txn: &PartitionStoreTransaction,
    invocation_id: &InvocationId,
) -> Result<EntryIndex> {
    let length = txn.tables().journal.get(invocation_id).map_or(0, Vec::len);
    EntryIndex::try_from(length).map_err(|_| StorageError::DataIntegrityError)
}

impl WriteJournalTable for PartitionStoreTransaction {
    fn append_journal_entry(
        &mut self,
        invocation_id: &InvocationId,
        entry: JournalEntry,
    ) -> Result<()> {
        let length = journal_length(self, invocation_id)?;
        if entry.index != length {
            return Err(StorageError::PreconditionFailed(anyhow!(
                "journal of {invocation_id} has {length} entries, cannot append entry {}",
                entry.index
            )));
        }
        self.write(|tables| {
            let journal = tables.journal.entry(*invocation_id).or_default();
            let length = journal.len();
            journal.push(entry);
            Undo::JournalLength {
                invocation_id: *invocation_id,
                length,
            }
        });
        Ok(())
    }

    fn delete_journal(&mut self, invocation_id: &InvocationId) -> Result<()> {
        if self.tables().journal.contains_key(invocation_id) {
            self.write(|tables| Undo::Journal {
                invocation_id: *invocation_id,
                previous: tables.journal.remove(invocation_id),
            });
        }
        Ok(())
    }
}
