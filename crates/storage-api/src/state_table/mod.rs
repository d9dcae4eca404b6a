// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::future::Future;

use bytes::Bytes;
use bytestring::ByteString;

use reprise_types::identifiers::ServiceId;

use crate::Result;

pub trait ReadStateTable {
    fn get_user_state(
        &mut self,
        service_id: &ServiceId,
        state_key: &str,
    ) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    fn get_all_user_states_for_service(
        &mut self,
        service_id: &ServiceId,
    ) -> impl Future<Output = Result<Vec<(ByteString, Bytes)>>> + Send;
}

pub trait WriteStateTable {
    fn put_user_state(
        &mut self,
        service_id: &ServiceId,
        state_key: ByteString,
        state_value: Bytes,
    ) -> Result<()>;

    fn delete_user_state(&mut self, service_id: &ServiceId, state_key: &str) -> Result<()>;

    fn delete_all_user_state(&mut self, service_id: &ServiceId) -> Result<()>;
}
