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
use reprise_storage_api::invocation_status_table::{
    InvocationStatus, ReadInvocationStatusTable, WriteInvocationStatusTable,
};
use reprise_types::identifiers::InvocationId;

use crate::PartitionStoreTransaction;
use crate::partition_store::Undo;

impl ReadInvocationStatusTable for PartitionStoreTransaction {
    async fn get_invocation_status(
        &mut self,
        invocation_id: &InvocationId,
    ) -> Result<InvocationStatus> {
        Ok(self
            .tables()
            .invocation_status
            .get(invocation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn all_invocation_statuses(&mut self) -> Result<Vec<(InvocationId, InvocationStatus)>> {
        Ok(self
            .tables()
            .invocation_status
            .iter()
            .map(|(id, status)| (*id, status.clone()))
            .collect())
    }
}

impl WriteInvocationStatusTable for PartitionStoreTransaction {
    fn put_invocation_status(
        &mut self,
        invocation_id: &InvocationId,
        status: &InvocationStatus,
    ) -> Result<()> {
        self.write(|tables| {
            let previous = if matches!(status, InvocationStatus::Free) {
                tables.invocation_status.remove(invocation_id)
            } else {
                tables
                    .invocation_status
                    .insert(*invocation_id, status.clone())
            };
            Undo::InvocationStatus {
                invocation_id: *invocation_id,
                previous,
            }
        });
        Ok(())
    }

    fn delete_invocation_status(&mut self, invocation_id: &InvocationId) -> Result<()> {
        self.write(|tables| Undo::InvocationStatus {
            invocation_id: *invocation_id,
            previous: tables.invocation_status.remove(invocation_id),
        });
        Ok(())
    }
}
