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
use reprise_storage_api::service_status_table::{
    ReadVirtualObjectStatusTable, VirtualObjectStatus, WriteVirtualObjectStatusTable,
};
use reprise_types::identifiers::ServiceId;

use crate::PartitionStoreTransaction;
use crate::partition_store::Undo;

impl ReadVirtualObjectStatusTable for PartitionStoreTransaction {
    async fn get_virtual_object_status(
        &mut self,
        service_id: &ServiceId,
    ) -> Result<VirtualObjectStatus> {
        Ok(self
            .tables()
            .virtual_object_status
            .get(service_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl WriteVirtualObjectStatusTable for PartitionStoreTransaction {
    fn put_virtual_object_status(
        &mut self,
        service_id: &ServiceId,
        status: &VirtualObjectStatus,
    ) -> Result<()> {
        self.write(|tables| {
            let previous = match status {
                VirtualObjectStatus::Unlocked => tables.virtual_object_status.remove(service_id),
                locked => tables
                    .virtual_object_status
                    .insert(service_id.clone(), locked.clone()),
            };
            Undo::VirtualObjectStatus {
                service_id: service_id.clone(),
                previous,
            }
        });
        Ok(())
    }

    fn delete_virtual_object_status(&mut self, service_id: &ServiceId) -> Result<()> {
        self.write(|tables| Undo::VirtualObjectStatus {
            service_id: service_id.clone(),
            previous: tables.virtual_object_status.remove(service_id),
        });
        Ok(())
    }
}
