// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use bytes::Bytes;
use bytestring::ByteString;

use reprise_storage_api::Result;
use reprise_storage_api::state_table::{ReadStateTable, WriteStateTable};
use reprise_types::identifiers::ServiceId;

use crate::PartitionStoreTransaction;
use crate::partition_store::Undo;

impl ReadStateTable for PartitionStoreTransaction {
    async fn get_user_state(
        &mut self,
        service_id: &ServiceId,
        state_key: &str,
    ) -> Result<Option<Bytes>> {
        Ok(self
            .tables()
            .state
            .get(service_id)
            .and_then(|state| state.get(state_key))
            .cloned())
    }

    async fn get_all_user_states_for_service(
        &mut self,
        service_id: &ServiceId,
    ) -> Result<Vec<(ByteString, Bytes)>> {
        Ok(self
            .tables()
            .state
            .get(service_id)
            .map(|state| {
                state
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl WriteStateTable for PartitionStoreTransaction {
    fn put_user_state(
        &mut self,
        service_id: &ServiceId,
        state_key: ByteString,
        state_value: Bytes,
    ) -> Result<()> {
        self.write(|tables| {
            let previous = tables
                .state
                .entry(service_id.clone())
                .or_default()
                .insert(state_key.clone(), state_value);
            Undo::UserState {
                service_id: service_id.clone(),
                key: state_key,
                previous,
            }
        });
        Ok(())
    }

    fn delete_user_state(&mut self, service_id: &ServiceId, state_key: &str) -> Result<()> {
        let Some(state) = self.tables().state.get(service_id) else {
            return Ok(());
        };
        let Some((key, _)) = state.get_key_value(state_key) else {
            return Ok(());
        };
        let key = key.clone();
        self.write(|tables| {
            let mut previous = None;
            if let Some(state) = tables.state.get_mut(service_id) {
                previous = state.remove(state_key);
                if state.is_empty() {
                    tables.state.remove(service_id);
                }
            }
            Undo::UserState {
                service_id: service_id.clone(),
                key,
                previous,
            }
        });
        Ok(())
    }

    fn delete_all_user_state(&mut self, service_id: &ServiceId) -> Result<()> {
        self.write(|tables| Undo::AllUserState {
            service_id: service_id.clone(),
            previous: tables.state.remove(service_id),
        });
        Ok(())
    }
}
