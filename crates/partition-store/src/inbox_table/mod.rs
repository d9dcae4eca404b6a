// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use reprise_storage_api::Result;
use reprise_storage_api::inbox_table::{InboxEntry, InboxTable};
use reprise_types::identifiers::ServiceId;

use crate::PartitionStoreTransaction;
use crate::partition_store::Undo;

impl InboxTable for PartitionStoreTransaction {
    fn put_inbox_entry(&mut self, service_id: &ServiceId, inbox_entry: InboxEntry) -> Result<()> {
        self.write(|tables| {
            let sequence_number = inbox_entry.inbox_sequence_number;
            let previous = tables
                .inbox
                .entry(service_id.clone())
                .or_default()
                .insert(sequence_number, inbox_entry);
            Undo::Inbox {
                service_id: service_id.clone(),
                sequence_number,
                previous,
            }
        });
        Ok(())
    }

    fn delete_inbox_entry(&mut self, service_id: &ServiceId, sequence_number: u64) -> Result<()> {
        self.write(|tables| {
            let mut previous = None;
            if let Some(inbox) = tables.inbox.get_mut(service_id) {
                previous = inbox.remove(&sequence_number);
                if inbox.is_empty() {
                    tables.inbox.remove(service_id);
                }
            }
            Undo::Inbox {
                service_id: service_id.clone(),
                sequence_number,
                previous,
            }
        });
        Ok(())
    }

    async fn peek_inbox(&mut self, service_id: &ServiceId) -> Result<Option<InboxEntry>> {
        Ok(self
            .tables()
            .inbox
            .get(service_id)
            .and_then(|inbox| inbox.values().next())
            .cloned())
    }

    async fn inbox(&mut self, service_id: &ServiceId) -> Result<Vec<InboxEntry>> {
        Ok(self
            .tables()
            .inbox
            .get(service_id)
            .map(|inbox| inbox.values().cloned().collect())
            .unwrap_or_default())
    }
}
