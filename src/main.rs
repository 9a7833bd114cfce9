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
use memlock::commands::config::ConfigCommand;
use memlock::commands::contend::{ContendArgs, ContendCommand};
use memlock::config::new_memlock_config;
use memlock::error::{MemlockError, Result, format_error_with_color, get_exit_code};
use memlock::logging;
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "memlock")]
#[command(author, version, about = "Compare-and-swap distributed lock toolkit", long_about = None)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run concurrent workers against one lock key and verify mutual exclusion
    #[command(visible_alias = "c")]
    Contend {
        /// Lock key to contend on
        #[arg(long, default_value = "memlock:contend")]
        key: String,

        /// Number of worker threads
        #[arg(short, long, default_value_t = 2)]
        workers: usize,

        /// Critical sections attempted per worker
        #[arg(short, long, default_value_t = 100)]
        iterations: usize,

        /// Lock duration in seconds (defaults to configuration)
        #[arg(long, value_name = "SECONDS")]
        lock_duration: Option<f64>,

        /// Seconds each acquisition may wait (defaults to configuration)
        #[arg(long, value_name = "SECONDS")]
        wait: Option<f64>,

        /// Judge staleness from the token expiry instead of the store TTL
        #[arg(long)]
        self_expire_sync: bool,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config,
}

fn exit_with_error(error: &MemlockError) -> ! {
    let use_color = std::io::stderr().is_terminal();
    eprint!("{}", format_error_with_color(error, use_color));
    std::process::exit(get_exit_code(error));
}

fn main() {
    let cli = Cli::parse();

    logging::setup_logger(cli.verbose);

    let config = match new_memlock_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_with_error(&e),
    };

    let result: Result<()> = (|| match cli.command {
        Commands::Contend {
            key,
            workers,
            iterations,
            lock_duration,
            wait,
            self_expire_sync,
            json,
        } => {
            let command = ContendCommand::new(&config)?;
            command.execute(&ContendArgs {
                key,
                workers,
                iterations,
                lock_duration,
                wait,
                self_expire_sync,
                json,
            })
        }
        Commands::Config => {
            let command = ConfigCommand::new(&config)?;
            command.execute()
        }
    })();

    if let Err(e) = result {
        exit_with_error(&e);
    }
}
