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
use reprise_storage_api::fsm_table::FsmTable;

use crate::PartitionStoreTransaction;
use crate::partition_store::Undo;

impl FsmTable for PartitionStoreTransaction {
    async fn get_inbox_seq_number(&mut self) -> Result<u64> {
        Ok(self.tables().inbox_seq_number)
    }

    fn put_inbox_seq_number(&mut self, seq_number: u64) -> Result<()> {
        self.write(|tables| {
            Undo::InboxSeqNumber(std::mem::replace(&mut tables.inbox_seq_number, seq_number))
        });
        Ok(())
    }
}
