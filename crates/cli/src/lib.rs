// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! The `airfeed` command-line interface.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

pub mod opt;

use std::time::Duration;

use airfeed_live::{
    RealtimeClient, RealtimeConfig, StatusSnapshot, TopicMessage, channel_message_handler,
};
use tracing_subscriber::EnvFilter;

use crate::opt::{AirfeedCli, Commands, SourceOpt, WatchOpt};

/// Initializes `tracing` output filtered by `RUST_LOG`, defaulting to `info`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))
}

/// Runs the parsed command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the client cannot be built.
pub async fn run(opt: AirfeedCli) -> anyhow::Result<()> {
    match opt.command {
        Commands::Watch(watch_opt) => run_watch(watch_opt).await?,
        Commands::Config(config_opt) => {
            let config = load_config(&config_opt.source)?;
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}

/// Loads the configuration file if given, then applies flag overrides and validates.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the result is invalid.
pub fn load_config(source: &SourceOpt) -> anyhow::Result<RealtimeConfig> {
    let mut config = match &source.config {
        Some(path) => RealtimeConfig::from_toml_file(path)?,
        None => RealtimeConfig::default(),
    };

    if let Some(ws_url) = &source.ws_url {
        config.ws_url.clone_from(ws_url);
    }
    if let Some(http_url) = &source.http_url {
        config.http_url.clone_from(http_url);
    }

    config.validate()?;
    Ok(config)
}

async fn run_watch(opt: WatchOpt) -> anyhow::Result<()> {
    let config = load_config(&opt.source)?;
    tracing::info!(ws_url = %config.ws_url, http_url = %config.http_url, "Starting airfeed");

    let mut client = RealtimeClient::from_config(&config)?;
    let (handler, mut rx) = channel_message_handler();
    for topic in &opt.topics {
        client.subscribe(topic.as_str(), handler.clone());
    }

    let mut status_timer =
        tokio::time::interval(Duration::from_secs(opt.status_interval_secs.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(message) = rx.recv() => log_message(&message),
            _ = status_timer.tick() => {
                let countdowns: Vec<(String, Option<Duration>)> = opt
                    .topics
                    .iter()
                    .map(|topic| (topic.clone(), client.next_refresh_in(topic.as_str())))
                    .collect();
                tracing::info!("{}", status_line(&client.get_status(), &countdowns));
            }
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {e}");
                }
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

fn log_message(message: &TopicMessage) {
    tracing::info!(
        topic = %message.topic,
        source = %message.source,
        timestamp = message.source_timestamp.as_deref().unwrap_or("-"),
        "{}",
        message.payload
    );
}

/// Formats the status snapshot followed by each topic's time to next refresh.
#[must_use]
pub fn status_line(status: &StatusSnapshot, countdowns: &[(String, Option<Duration>)]) -> String {
    let refresh: Vec<String> = countdowns
        .iter()
        .map(|(topic, remaining)| match remaining {
            Some(remaining) => format!("{topic}:{}s", remaining.as_secs()),
            None => format!("{topic}:-"),
        })
        .collect();

    if refresh.is_empty() {
        status.to_string()
    } else {
        format!("{status} next_refresh=[{}]", refresh.join(","))
    }
}
