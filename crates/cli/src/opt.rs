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

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[clap(version, about, author)]
pub struct AirfeedCli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Parser, Debug)]
pub enum Commands {
    Watch(WatchOpt),
    Config(ConfigOpt),
}

/// Where the configuration comes from. Flags override values from the file.
#[derive(Parser, Debug, Clone, Default)]
pub struct SourceOpt {
    /// Path to a TOML configuration file.
    #[arg(long, env = "AIRFEED_CONFIG")]
    pub config: Option<PathBuf>,
    /// WebSocket endpoint for push delivery.
    #[arg(long, env = "AIRFEED_WS_URL")]
    pub ws_url: Option<String>,
    /// HTTP base URL for fallback polling.
    #[arg(long, env = "AIRFEED_HTTP_URL")]
    pub http_url: Option<String>,
}

#[derive(Parser, Debug, Clone)]
#[command(about = "Subscribe to topics and log every update", long_about = None)]
pub struct WatchOpt {
    #[clap(flatten)]
    pub source: SourceOpt,
    /// Topic to subscribe to (repeatable).
    #[arg(long = "topic", short = 't', required = true)]
    pub topics: Vec<String>,
    /// Seconds between status lines.
    #[arg(long, default_value_t = 10)]
    pub status_interval_secs: u64,
}

#[derive(Parser, Debug, Clone)]
#[command(about = "Print the effective configuration as TOML", long_about = None)]
pub struct ConfigOpt {
    #[clap(flatten)]
    pub source: SourceOpt,
}
