// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::process::ExitCode;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use influxdb_writer::{config::Config, writer::Writer};

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("INFLUXDB_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    if let Err(e) = init_logging(&log_level) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match forward_stdin().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(log_level: &str) -> anyhow::Result<()> {
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).context("could not parse log level in configuration")?,
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    debug!("Logging subsystem enabled");
    Ok(())
}

async fn forward_stdin() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    let writer = Writer::new(&config, None).context("failed to start writer")?;

    info!(
        "forwarding stdin to {} every {:?}",
        config.server_url, config.send_interval
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim_end();
                    // blank lines and line-protocol comments carry no point
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    writer.write_line(line).await;
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(anyhow::Error::new(e).context("failed to read stdin")),
            },
            _ = &mut shutdown => {
                info!("interrupted, flushing pending points");
                break Ok(());
            }
        }
    };

    writer.close().await;
    result
}
