// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::{HashMap, VecDeque};

use reprise_types::identifiers::CommandIndex;
use reprise_types::journal::{CompletionResult, Entry, EntryType, JournalEntry};

use crate::error::HandlerError;

/// Replay position of one attempt of an invocation.
///
/// Built from the journal loaded when the attempt starts. Commands are handed out in ordinal
/// order while replaying; once they are exhausted the attempt is live and every new command is
/// appended at [`JournalCursor::next_command_index`].
#[derive(Debug, Default)]
pub(crate) struct JournalCursor {
    recorded: VecDeque<Entry>,
    next_command_index: CommandIndex,
    completions: HashMap<CommandIndex, CompletionResult>,
}

impl JournalCursor {
    pub(crate) fn new(journal: Vec<JournalEntry>) -> Self {
        let mut recorded = VecDeque::new();
        let mut completions = HashMap::new();
        for journal_entry in journal {
            match journal_entry.entry {
                Entry::AwakeableCompletion {
                    command_index,
                    result,
                } => {
                    completions.entry(command_index).or_insert(result);
                }
                command => recorded.push_back(command),
            }
        }
        Self {
            recorded,
            next_command_index: 0,
            completions,
        }
    }

    pub(crate) fn next_command_index(&self) -> CommandIndex {
        self.next_command_index
    }

    pub(crate) fn is_replaying(&self) -> bool {
        !self.recorded.is_empty()
    }

    /// Takes the command recorded at the current ordinal, checking it has the expected shape.
    /// Returns `None` once the attempt is live.
    pub(crate) fn take_recorded(
        &mut self,
        expected_type: EntryType,
        expected_name: Option<&str>,
    ) -> Result<Option<Entry>, HandlerError> {
        let Some(recorded) = self.recorded.front() else {
            return Ok(None);
        };

        if recorded.ty() != expected_type || recorded.name() != expected_name {
            return Err(HandlerError::JournalMismatch {
                command_index: self.next_command_index,
                expected: describe(expected_type, expected_name),
                actual: describe(recorded.ty(), recorded.name()),
            });
        }

        self.next_command_index += 1;
        Ok(self.recorded.pop_front())
    }

    /// Moves past a command that was just appended live.
    pub(crate) fn advance(&mut self) {
        debug_assert!(self.recorded.is_empty());
        self.next_command_index += 1;
    }

    pub(crate) fn completion(&self, command_index: CommandIndex) -> Option<&CompletionResult> {
        self.completions.get(&command_index)
    }

    pub(crate) fn record_completion(
        &mut self,
        command_index: CommandIndex,
        result: CompletionResult,
    ) {
        self.completions.entry(command_index).or_insert(result);
    }
}

fn describe(ty: EntryType, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{ty} '{name}'"),
        None => ty.to_string(),
    }
}
