// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Conversation sessions kept in the state of an agent object.
//!
//! One object key can hold several sessions. Each session lives under its own state entry, so
//! a message continues exactly the conversation its `session_id` names.

use serde::{Deserialize, Serialize};

use crate::agent::{ClaimDecision, Observation};

pub const DEFAULT_SESSION_ID: &str = "123";

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_owned()
}

/// Input of an agent `run` handler. Reuse a `session_id` to continue a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "default_session_id")]
    pub session_id: String,
    pub message: String,
}

impl ChatMessage {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "kebab-case")]
pub enum SessionEvent {
    User { message: String },
    Tool(Observation),
    Agent { message: String },
    Decision(ClaimDecision),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSession {
    pub events: Vec<SessionEvent>,
}

/// State entry holding the session `session_id`.
pub fn session_state_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

impl AgentSession {
    pub fn push(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    /// Events after the last one matching `closes`, i.e. the part of the conversation the
    /// agent still has to answer.
    pub fn since(&self, closes: impl Fn(&SessionEvent) -> bool) -> &[SessionEvent] {
        let start = self
            .events
            .iter()
            .rposition(closes)
            .map_or(0, |index| index + 1);
        &self.events[start..]
    }
}

/// User messages of `events`, joined with a space.
pub fn user_text(events: &[SessionEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::User { message } => Some(message.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn observations(events: &[SessionEvent]) -> impl Iterator<Item = &Observation> {
    events.iter().filter_map(|event| match event {
        SessionEvent::Tool(observation) => Some(observation),
        _ => None,
    })
}
