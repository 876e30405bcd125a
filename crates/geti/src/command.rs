// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subcommand execution.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::info;

use geti_session::{monitor_job, Job, Payload, Request, Session};

use crate::config::{Command, Config};

/// Run the configured subcommand in a scoped session and print its output.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let server = config.server_config()?;
    info!(host = %server.host, "connecting");

    let session = Session::new(server)?.retry_delay(config.retry_delay());
    let command = config.command;
    let output = session.scope(move |session| Box::pin(execute(session, command))).await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Execute one subcommand against an established session.
pub async fn execute(session: &mut Session, command: Command) -> geti_session::Result<Value> {
    match command {
        Command::Info => {
            let version = session.platform_version().await?;
            let organization_id = session.organization_id().await?;
            let api_base = session.base_url().await?;
            let auth_backend = session.auth_backend().await?;
            Ok(json!({
                "host": session.config().host,
                "platform_version": version.to_string(),
                "organization_id": organization_id,
                "api_base": api_base,
                "auth_backend": auth_backend,
            }))
        }
        Command::Get { path, no_org } => {
            let payload = session.send(Request::get(path).include_organization_id(!no_org)).await?;
            Ok(match payload {
                Payload::Json(v) => v,
                Payload::Raw(resp) => Value::String(resp.text()),
            })
        }
        Command::Job { workspace_id, job_id, watch, cancel, timeout, interval } => {
            let path = format!("workspaces/{workspace_id}/jobs/{job_id}");
            let mut job = session.send_json::<Job>(Request::get(path)).await?.in_workspace(workspace_id);
            if cancel {
                job.cancel(session).await?;
            } else if watch {
                job = monitor_job(
                    session,
                    job,
                    Duration::from_secs(timeout),
                    Duration::from_secs(interval),
                )
                .await?;
            }
            let (step, total) = job.step_information();
            let mut output = serde_json::to_value(&job)?;
            if let Value::Object(ref mut map) = output {
                map.insert("step".to_owned(), json!({ "current": step, "total": total }));
            }
            Ok(output)
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
