// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::info;

use reprise_claim_agent::{
    AgentSession, CLAIM_STATE, ChatMessage, ClaimDecision, DECISION_STATE, DEFAULT_SESSION_ID,
    InsuranceClaim, SessionEvent, registry, run_target, service_id, session_state_key,
    weather_target,
};
use reprise_tracing_instrumentation::init_tracing_and_logging;
use reprise_types::config::Configuration;
use reprise_types::config_loader::ConfigLoaderBuilder;
use reprise_types::identifiers::AwakeableIdentifier;
use reprise_worker::{InvocationResponse, ResolveOutcome, Runtime, RuntimeHandle};

const DEFAULT_STORE_FILE: &str = "claims.json";

#[derive(Debug, clap::Parser)]
#[command(author, version, about)]
struct ClaimAgentArguments {
    /// Configuration file to use.
    #[arg(
        short,
        long = "config-file",
        env = "REPRISE_CONFIG",
        value_name = "FILE"
    )]
    config_file: Option<PathBuf>,

    /// File the journal is persisted to. Overrides `storage.path`; defaults to `claims.json`
    /// when neither is set.
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Sends a message, e.g. a claim like "hotel, 5 nights, 800USD", to the agent of `user_id`.
    Submit {
        user_id: String,
        message: String,
        /// Conversation to continue.
        #[arg(long, default_value = DEFAULT_SESSION_ID)]
        session: String,
    },
    /// Approves the claim waiting for the review identified by `token`.
    Approve { token: String },
    /// Rejects the claim waiting for the review identified by `token`.
    Reject { token: String },
    /// Shows the last claim, a session and the last decision of `user_id`.
    Status {
        user_id: String,
        #[arg(long, default_value = DEFAULT_SESSION_ID)]
        session: String,
    },
    /// Asks the weather agent of `user_id`.
    Weather { user_id: String, message: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli_args = ClaimAgentArguments::parse();

    let mut config_loader = ConfigLoaderBuilder::default();
    config_loader.load_env(true);
    if let Some(config_file) = &cli_args.config_file {
        config_loader.path(config_file.clone());
    }
    let mut config = config_loader.build()?.load_once()?;
    if let Some(store) = cli_args.store {
        config.storage.path = Some(store);
    } else if config.storage.path.is_none() {
        config.storage.path = Some(PathBuf::from(DEFAULT_STORE_FILE));
    }

    let _tracing_guard = init_tracing_and_logging(&config.common, "claim-agent")?;
    run(&config, cli_args.command).await
}

async fn run(config: &Configuration, command: Command) -> anyhow::Result<()> {
    let runtime = Runtime::start_with_configuration(config, registry())
        .await
        .context("cannot start the runtime")?;
    let handle = runtime.handle();

    let result = match command {
        Command::Submit {
            user_id,
            message,
            session,
        } => {
            info!(%user_id, %session, "Sending message to the claim agent");
            let message = ChatMessage::new(session, message);
            let response = handle.invoke_json(run_target(&user_id), &message).await?;
            print_response(response)
        }
        Command::Approve { token } => review(&handle, &token, true).await,
        Command::Reject { token } => review(&handle, &token, false).await,
        Command::Status { user_id, session } => status(&handle, &user_id, &session).await,
        Command::Weather { user_id, message } => {
            let response = handle.invoke_json(weather_target(&user_id), &message).await?;
            print_response(response)
        }
    };

    runtime.shutdown().await?;
    result
}

async fn review(handle: &RuntimeHandle, token: &str, approved: bool) -> anyhow::Result<()> {
    let awakeable_id: AwakeableIdentifier = token.parse().context("invalid review token")?;
    match handle.resolve_awakeable_json(token, &approved).await? {
        ResolveOutcome::Resolved => {}
        ResolveOutcome::AlreadyResolved => println!("This review was already answered."),
    }

    // the resumed claim runs in this process, wait for it before exiting
    let (invocation_id, _) = awakeable_id.into_inner();
    print_response(handle.attach(invocation_id).await?)
}

async fn status(handle: &RuntimeHandle, user_id: &str, session_id: &str) -> anyhow::Result<()> {
    let service_id = service_id(user_id);
    let Some(claim) = handle
        .get_state_json::<InsuranceClaim>(&service_id, CLAIM_STATE)
        .await?
    else {
        bail!("no claim submitted by '{user_id}'");
    };
    println!(
        "Claim of {user_id}: {} of {:.2} on {} ({})",
        claim.category, claim.amount, claim.date, claim.reason
    );

    let session = handle
        .get_state_json::<AgentSession>(&service_id, &session_state_key(session_id))
        .await?
        .unwrap_or_default();
    println!("Session {session_id}:");
    for event in session.events {
        match event {
            SessionEvent::User { message } => println!("  user: {message}"),
            SessionEvent::Tool(observation) => {
                println!("  {} -> {}", observation.tool, observation.output)
            }
            SessionEvent::Agent { message } => println!("  agent: {message}"),
            SessionEvent::Decision(decision) => println!("  decided: {}", decision.explanation()),
        }
    }

    match handle
        .get_state_json::<ClaimDecision>(&service_id, DECISION_STATE)
        .await?
    {
        Some(decision) => println!("Decision: {}", decision.explanation()),
        None => println!("Decision: pending"),
    }
    Ok(())
}

fn print_response(response: InvocationResponse) -> anyhow::Result<()> {
    match response {
        InvocationResponse::Completed(value) => {
            let reply: String =
                serde_json::from_slice(&value).context("cannot decode the agent reply")?;
            println!("{reply}");
            Ok(())
        }
        InvocationResponse::Suspended { awaiting, .. } => {
            for awakeable_id in awaiting {
                println!("Claim is waiting for review {awakeable_id}");
            }
            Ok(())
        }
        InvocationResponse::Failed(error) => bail!("claim failed: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        ClaimAgentArguments::command().debug_assert();
    }

    #[test]
    fn parses_submit() {
        let args = ClaimAgentArguments::try_parse_from([
            "claim-agent",
            "submit",
            "user-1",
            "hotel, 5 nights, 1200USD",
        ])
        .unwrap();
        let Command::Submit {
            user_id,
            message,
            session,
        } = args.command
        else {
            panic!("expected the submit command");
        };
        assert_eq!(user_id, "user-1");
        assert_eq!(message, "hotel, 5 nights, 1200USD");
        assert_eq!(session, DEFAULT_SESSION_ID);
    }
}
