// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Journal entries recorded for an invocation.
//!
//! A journal is an append-only sequence of [`JournalEntry`]. Entries are either *commands*,
//! written by the invocation itself and matched on replay by their position among commands, or
//! *notifications*, written on behalf of the outside world and matched by the id of the command
//! they complete.

use bytes::Bytes;
use bytestring::ByteString;

use crate::errors::InvocationError;
use crate::identifiers::{CommandIndex, EntryIndex};
use crate::time::MillisSinceEpoch;

/// Outcome of a step, an awakeable or a whole invocation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompletionResult {
    Success(Bytes),
    Failure(InvocationError),
}

impl From<Result<Bytes, InvocationError>> for CompletionResult {
    fn from(value: Result<Bytes, InvocationError>) -> Self {
        match value {
            Ok(v) => CompletionResult::Success(v),
            Err(e) => CompletionResult::Failure(e),
        }
    }
}

impl From<CompletionResult> for Result<Bytes, InvocationError> {
    fn from(value: CompletionResult) -> Self {
        match value {
            CompletionResult::Success(v) => Ok(v),
            CompletionResult::Failure(e) => Err(e),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::IntoStaticStr,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
pub enum EntryType {
    #[strum(serialize = "step-result")]
    Run,
    #[strum(serialize = "promise-created")]
    Awakeable,
    GetState,
    SetState,
    ClearState,
    ClearAllState,
    #[strum(serialize = "promise-resolved")]
    AwakeableCompletion,
}

impl EntryType {
    pub fn is_command(&self) -> bool {
        !matches!(self, EntryType::AwakeableCompletion)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Entry {
    /// Outcome of a memoized step. Only written once the step function returned.
    Run {
        name: ByteString,
        result: CompletionResult,
    },
    /// Creation of a durable promise, the promise id is derived from the command index.
    Awakeable {
        name: ByteString,
        deadline: Option<MillisSinceEpoch>,
    },
    GetState {
        key: ByteString,
        value: Option<Bytes>,
    },
    SetState {
        key: ByteString,
        value: Bytes,
    },
    ClearState {
        key: ByteString,
    },
    ClearAllState,
    /// Resolution of the awakeable created at `command_index`.
    AwakeableCompletion {
        command_index: CommandIndex,
        result: CompletionResult,
    },
}

impl Entry {
    pub fn ty(&self) -> EntryType {
        match self {
            Entry::Run { .. } => EntryType::Run,
            Entry::Awakeable { .. } => EntryType::Awakeable,
            Entry::GetState { .. } => EntryType::GetState,
            Entry::SetState { .. } => EntryType::SetState,
            Entry::ClearState { .. } => EntryType::ClearState,
            Entry::ClearAllState => EntryType::ClearAllState,
            Entry::AwakeableCompletion { .. } => EntryType::AwakeableCompletion,
        }
    }

    pub fn is_command(&self) -> bool {
        self.ty().is_command()
    }

    /// The name used to check replay consistency: step name, awakeable name or state key.
    pub fn name(&self) -> Option<&str> {
        match self {
            Entry::Run { name, .. } | Entry::Awakeable { name, .. } => Some(&**name),
            Entry::GetState { key, .. }
            | Entry::SetState { key, .. }
            | Entry::ClearState { key } => Some(&**key),
            Entry::ClearAllState | Entry::AwakeableCompletion { .. } => None,
        }
    }
}

/// An entry as it is persisted: `{index, created_at, entry}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JournalEntry {
    pub index: EntryIndex,
    pub created_at: MillisSinceEpoch,
    pub entry: Entry,
}

impl JournalEntry {
    pub fn new(index: EntryIndex, entry: Entry) -> Self {
        Self {
            index,
            created_at: MillisSinceEpoch::now(),
            entry,
        }
    }
}

/// Looks up the resolution of the awakeable created at `command_index`, if any. The first
/// resolution in journal order is the one that counts.
pub fn find_awakeable_completion<'a>(
    entries: impl IntoIterator<Item = &'a JournalEntry>,
    command_index: CommandIndex,
) -> Option<&'a CompletionResult> {
    entries.into_iter().find_map(|e| match &e.entry {
        Entry::AwakeableCompletion {
            command_index: idx,
            result,
        } if *idx == command_index => Some(result),
        _ => None,
    })
}

/// Returns the command recorded at `command_index`, skipping notifications.
pub fn find_command<'a>(
    entries: impl IntoIterator<Item = &'a JournalEntry>,
    command_index: CommandIndex,
) -> Option<&'a JournalEntry> {
    entries
        .into_iter()
        .filter(|e| e.entry.is_command())
        .nth(command_index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(index: EntryIndex, name: &'static str) -> JournalEntry {
        JournalEntry::new(
            index,
            Entry::Run {
                name: ByteString::from_static(name),
                result: CompletionResult::Success(Bytes::from_static(b"1")),
            },
        )
    }

    #[test]
    fn entry_type_names_follow_journal_kinds() {
        assert_eq!(EntryType::Run.to_string(), "step-result");
        assert_eq!(EntryType::Awakeable.to_string(), "promise-created");
        assert_eq!(EntryType::AwakeableCompletion.to_string(), "promise-resolved");
        assert_eq!(EntryType::ClearAllState.to_string(), "clear-all-state");
    }

    #[test]
    fn commands_skip_notifications() {
        let journal = vec![
            run(0, "A"),
            JournalEntry::new(
                1,
                Entry::Awakeable {
                    name: ByteString::new(),
                    deadline: None,
                },
            ),
            JournalEntry::new(
                2,
                Entry::AwakeableCompletion {
                    command_index: 1,
                    result: CompletionResult::Success(Bytes::from_static(b"\"approved\"")),
                },
            ),
            run(3, "B"),
        ];

        assert_eq!(find_command(&journal, 2).map(|e| e.index), Some(3));
        assert_eq!(find_command(&journal, 3), None);
        assert_eq!(
            find_awakeable_completion(&journal, 1),
            Some(&CompletionResult::Success(Bytes::from_static(
                b"\"approved\""
            )))
        );
        assert_eq!(find_awakeable_completion(&journal, 0), None);
    }

    #[test]
    fn entries_serialize_with_kind_tag() {
        let entry = run(0, "A");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["entry"]["kind"], "run");
        let decoded: JournalEntry = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, entry);
    }
}
