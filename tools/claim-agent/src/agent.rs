// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Deterministic stand-in for the claim evaluation model.
//!
//! The agent only decides what to do next from the conversation so far. It never performs
//! side effects itself; the handler journals every decision as a step so a non-deterministic
//! model could be swapped in without breaking replay.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::session::{AgentSession, SessionEvent, observations, user_text};

pub const HUMAN_APPROVAL: &str = "human_approval";
pub const CHECK_ELIGIBILITY: &str = "check_eligibility";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceClaim {
    pub date: String,
    pub amount: f64,
    pub category: String,
    pub reason: String,
}

const CATEGORIES: &[&str] = &["hotel", "flight", "train", "taxi", "meal", "car"];

impl InsuranceClaim {
    /// Reads a claim from a chat message: either a JSON claim or free text naming an amount
    /// with a currency, such as `800USD` or `$1,200`. `None` when no amount is given.
    pub fn from_message(message: &str) -> Option<Self> {
        if let Ok(claim) = serde_json::from_str::<InsuranceClaim>(message) {
            return Some(claim);
        }

        let words: Vec<&str> = message.split_whitespace().collect();
        let amount = words.iter().find_map(|word| parse_amount(word))?;
        let date = words
            .iter()
            .map(|word| word.trim_end_matches(['.', ',', '!', '?']))
            .find(|word| looks_like_date(word))
            .unwrap_or("unknown");
        let lowercase = message.to_lowercase();
        let category = CATEGORIES
            .iter()
            .find(|category| lowercase.contains(*category))
            .unwrap_or(&"other");

        Some(InsuranceClaim {
            date: date.to_owned(),
            amount,
            category: (*category).to_owned(),
            reason: message.trim().to_owned(),
        })
    }
}

fn parse_amount(word: &str) -> Option<f64> {
    let word = word
        .trim_end_matches(['.', ',', '!', '?'])
        .to_ascii_lowercase();
    let digits = ["usd", "eur", "$", "€"].iter().find_map(|currency| {
        word.strip_suffix(currency)
            .or_else(|| word.strip_prefix(currency))
    })?;
    digits.replace(',', "").parse().ok()
}

fn looks_like_date(word: &str) -> bool {
    word.len() >= 8
        && word.contains(['/', '-'])
        && word
            .chars()
            .all(|c| c.is_ascii_digit() || c == '/' || c == '-')
}

/// Answer of a tool the agent called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub tool: String,
    pub output: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentStep {
    CallTool { tool: String, input: Value },
    /// Answer the user without deciding, e.g. to ask for missing details.
    Respond { message: String },
    Finish(ClaimDecision),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ClaimDecision {
    Approved { explanation: String },
    Rejected { explanation: String },
}

impl ClaimDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, ClaimDecision::Approved { .. })
    }

    pub fn explanation(&self) -> &str {
        match self {
            ClaimDecision::Approved { explanation } | ClaimDecision::Rejected { explanation } => {
                explanation
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClaimApprovalAgent {
    /// Claims above this amount need a human reviewer.
    approval_threshold: f64,
}

impl Default for ClaimApprovalAgent {
    fn default() -> Self {
        Self {
            approval_threshold: 1000.0,
        }
    }
}

impl ClaimApprovalAgent {
    pub fn new(approval_threshold: f64) -> Self {
        Self { approval_threshold }
    }

    /// The claim discussed since the last decision of `session`, if it names an amount.
    pub fn pending_claim(&self, session: &AgentSession) -> Option<InsuranceClaim> {
        InsuranceClaim::from_message(&user_text(open_claim(session)))
    }

    pub fn next_step(&self, session: &AgentSession) -> AgentStep {
        let Some(claim) = self.pending_claim(session) else {
            return AgentStep::Respond {
                message: "Please tell me the amount of the claim, for example 800USD.".to_owned(),
            };
        };
        let claim = &claim;

        let Some(last) = observations(open_claim(session)).last() else {
            let tool = if claim.amount > self.approval_threshold {
                HUMAN_APPROVAL
            } else {
                CHECK_ELIGIBILITY
            };
            return AgentStep::CallTool {
                tool: tool.to_owned(),
                input: json!({ "claim": claim }),
            };
        };

        let approved = last.output.as_bool().unwrap_or(false);
        let decision = match (last.tool.as_str(), approved) {
            (HUMAN_APPROVAL, true) => ClaimDecision::Approved {
                explanation: format!(
                    "A reviewer approved the {} claim of {:.2}.",
                    claim.category, claim.amount
                ),
            },
            (HUMAN_APPROVAL, false) => ClaimDecision::Rejected {
                explanation: format!(
                    "A reviewer rejected the {} claim of {:.2}.",
                    claim.category, claim.amount
                ),
            },
            (_, true) => ClaimDecision::Approved {
                explanation: format!(
                    "The {} claim of {:.2} is eligible and was approved.",
                    claim.category, claim.amount
                ),
            },
            (_, false) => ClaimDecision::Rejected {
                explanation: format!(
                    "The {} claim of {:.2} is not eligible.",
                    claim.category, claim.amount
                ),
            },
        };
        AgentStep::Finish(decision)
    }
}

fn open_claim(session: &AgentSession) -> &[SessionEvent] {
    session.since(|event| matches!(event, SessionEvent::Decision(_)))
}
