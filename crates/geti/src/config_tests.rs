// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;
use geti_session::Credentials;

use super::{Command, Config};

fn parse(args: &[&str]) -> Config {
    Config::parse_from(args)
}

#[test]
fn info_with_token() -> anyhow::Result<()> {
    let config = parse(&["geti", "--host", "geti.local", "--token", "pat", "info"]);
    config.validate()?;
    assert_eq!(config.command, Command::Info);
    let server = config.server_config()?;
    assert_eq!(server.host, "https://geti.local");
    assert_eq!(server.credentials, Credentials::Token("pat".into()));
    assert_eq!(config.retry_delay(), Duration::from_secs(1));
    Ok(())
}

#[test]
fn get_with_password_and_flags() -> anyhow::Result<()> {
    let config = parse(&[
        "geti",
        "--host",
        "http://10.0.0.5/",
        "--username",
        "alice",
        "--password",
        "pw",
        "--log-format",
        "json",
        "--retry-delay-ms",
        "50",
        "get",
        "--no-org",
        "product_info",
    ]);
    config.validate()?;
    assert_eq!(config.command, Command::Get { path: "product_info".into(), no_org: true });
    assert_eq!(config.server_config()?.host, "http://10.0.0.5");
    assert_eq!(config.retry_delay(), Duration::from_millis(50));
    Ok(())
}

#[test]
fn job_defaults() -> anyhow::Result<()> {
    let config = parse(&["geti", "--host", "h", "--token", "t", "job", "ws-1", "job-1", "--watch"]);
    config.validate()?;
    assert_eq!(
        config.command,
        Command::Job {
            workspace_id: "ws-1".into(),
            job_id: "job-1".into(),
            watch: true,
            cancel: false,
            timeout: 10000,
            interval: 15,
        }
    );
    Ok(())
}

#[yare::parameterized(
    bad_log_format = { &["geti", "--host", "h", "--token", "t", "--log-format", "xml", "info"], "invalid log format" },
    watch_cancel   = { &["geti", "--host", "h", "--token", "t", "job", "w", "j", "--watch", "--cancel"], "--watch and --cancel" },
    zero_interval  = { &["geti", "--host", "h", "--token", "t", "job", "w", "j", "--interval", "0"], "--interval" },
    both_creds     = { &["geti", "--host", "h", "--token", "t", "--username", "u", "--password", "p", "info"], "cannot specify both" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    geti_session::assert_err_contains!(config.validate(), expected_substr);
}
