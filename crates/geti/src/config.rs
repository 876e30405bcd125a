// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::{Parser, Subcommand};

use geti_session::{ServerArgs, ServerConfig};

/// Talk to a Geti server over an authenticated session.
#[derive(Debug, Parser)]
#[command(name = "geti", version, about)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Log format (json or text).
    #[arg(long, env = "GETI_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "GETI_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Delay before retrying a request the server reported as unavailable.
    #[arg(long, env = "GETI_RETRY_DELAY_MS", default_value = "1000")]
    pub retry_delay_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Show the platform version, organization and authentication backend.
    Info,
    /// GET an API path and print the response.
    Get {
        /// Path relative to the API base, e.g. `workspaces`.
        path: String,
        /// Address the path below the API base instead of the organization.
        #[arg(long)]
        no_org: bool,
    },
    /// Show, monitor or cancel a job.
    Job {
        workspace_id: String,
        job_id: String,
        /// Poll until the job finishes.
        #[arg(long)]
        watch: bool,
        /// Cancel the job.
        #[arg(long)]
        cancel: bool,
        /// Stop watching after this many seconds.
        #[arg(long, default_value = "10000")]
        timeout: u64,
        /// Seconds between status polls.
        #[arg(long, default_value = "15")]
        interval: u64,
    },
}

impl Config {
    /// Check flag combinations clap cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid log format: {} (expected json or text)", self.log_format);
        }
        if let Command::Job { watch: true, cancel: true, .. } = self.command {
            anyhow::bail!("cannot specify both --watch and --cancel");
        }
        if let Command::Job { interval: 0, .. } = self.command {
            anyhow::bail!("--interval must be at least 1 second");
        }
        self.server_config()?;
        Ok(())
    }

    pub fn server_config(&self) -> anyhow::Result<ServerConfig> {
        Ok(self.server.clone().into_config()?)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
