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

/// Entry of the inbox
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InboxEntry {
    pub inbox_sequence_number: u64,
    pub invocation_id: InvocationId,
}

impl InboxEntry {
    pub fn new(inbox_sequence_number: u64, invocation_id: InvocationId) -> Self {
        Self {
            inbox_sequence_number,
            invocation_id,
        }
    }
}

/// Per virtual object FIFO of invocations waiting for the lock, ordered by sequence number.
pub trait InboxTable {
    fn put_inbox_entry(&mut self, service_id: &ServiceId, inbox_entry: InboxEntry) -> Result<()>;

    fn delete_inbox_entry(&mut self, service_id: &ServiceId, sequence_number: u64) -> Result<()>;

    fn peek_inbox(
        &mut self,
        service_id: &ServiceId,
    ) -> impl Future<Output = Result<Option<InboxEntry>>> + Send;

    fn inbox(
        &mut self,
        service_id: &ServiceId,
    ) -> impl Future<Output = Result<Vec<InboxEntry>>> + Send;

    /// Removes and returns the head of the inbox.
    fn pop_inbox(
        &mut self,
        service_id: &ServiceId,
    ) -> impl Future<Output = Result<Option<InboxEntry>>> + Send
    where
        Self: Send,
    {
        async move {
            let head = self.peek_inbox(service_id).await?;
            if let Some(entry) = &head {
                self.delete_inbox_entry(service_id, entry.inbox_sequence_number)?;
            }
            Ok(head)
        }
    }
}
