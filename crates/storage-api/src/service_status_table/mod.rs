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

use reprise_types::identifiers::{InvocationId, ServiceId};

use crate::Result;

/// Lock of a virtual object: the invocation holding it is the only one allowed to run for the key.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VirtualObjectStatus {
    Locked(InvocationId),
    #[default]
    Unlocked,
}

pub trait ReadVirtualObjectStatusTable {
    fn get_virtual_object_status(
        &mut self,
        service_id: &ServiceId,
    ) -> impl Future<Output = Result<VirtualObjectStatus>> + Send;
}

pub trait WriteVirtualObjectStatusTable {
    fn put_virtual_object_status(
        &mut self,
        service_id: &ServiceId,
        status: &VirtualObjectStatus,
    ) -> Result<()>;

    fn delete_virtual_object_status(&mut self, service_id: &ServiceId) -> Result<()>;
}
