// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{Parser, Subcommand};
use relaykit::commands::list::ListCommand;
use relaykit::commands::locks::LocksCommand;
use relaykit::commands::open::OpenCommand;
use relaykit::commands::watch::WatchCommand;
use relaykit::config::RelayConfig;
use relaykit::error::{Result, format_error_chain, get_exit_code};
use relaykit::logging::setup_logger;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "relaykit")]
#[command(author, version, about = "Relay device discovery and lifecycle tool", long_about = None)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory containing relay.toml
    #[arg(long, value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Use the dummy driver with this many devices
    #[arg(long, value_name = "COUNT", global = true)]
    dummy: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List detected relays
    #[command(visible_alias = "ls")]
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Open a relay, hold it and close it again
    Open {
        /// Relay name as reported by `list`
        name: String,

        /// Seconds to keep the relay open
        #[arg(long, value_name = "SECONDS", default_value_t = 0)]
        hold: u64,
    },

    /// Print relays as they appear and disappear
    Watch {
        /// Seconds to watch for
        #[arg(long, value_name = "SECONDS", default_value_t = 10)]
        seconds: u64,
    },

    /// Show relay lock files
    Locks {
        /// Remove stale and abandoned lock files
        #[arg(long)]
        clean: bool,
    },
}

fn load_config(config_dir: Option<&PathBuf>) -> Result<RelayConfig> {
    match config_dir {
        Some(dir) => RelayConfig::load(dir),
        None => RelayConfig::load_default(),
    }
}

fn main() {
    let cli = Cli::parse();

    setup_logger(cli.verbose);

    let config = match load_config(cli.config_dir.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", format_error_chain(&e));
            std::process::exit(get_exit_code(&e));
        }
    };

    let result: Result<()> = (|| match cli.command {
        Commands::List { json } => {
            let command = ListCommand::new(&config, cli.dummy)?;
            command.execute(json)
        }
        Commands::Open { name, hold } => {
            let command = OpenCommand::new(&config, cli.dummy)?;
            command.execute(&name, Duration::from_secs(hold))
        }
        Commands::Watch { seconds } => {
            let command = WatchCommand::new(&config, cli.dummy)?;
            command.execute(Duration::from_secs(seconds))
        }
        Commands::Locks { clean } => {
            let command = LocksCommand::new(&config)?;
            command.execute(clean)
        }
    })();

    if let Err(e) = result {
        eprintln!("{}", format_error_chain(&e));
        std::process::exit(get_exit_code(&e));
    }
}
