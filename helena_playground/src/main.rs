// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Simulated helena clusters, hosted in one process

use std::env;

use clap::Parser;

mod simulation;

#[derive(Debug, clap::Subcommand)]
enum Cli {
    /// Deploy applications onto a stable cluster and watch them come up
    Deploy(simulation::DeployConfig),
    /// Deploy applications, then keep killing and adding nodes
    Churn(simulation::ChurnConfig),
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Cli,

    /// The log level (or `env_logger` filter directives) used when `RUST_LOG` is not set
    #[clap(short, long, default_value = "info")]
    log: String,
}

// MAIN //
#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let args = Args::parse();

    // if it's not set, take the log level from the command line
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", &args.log);
    }
    env_logger::builder().format_timestamp_millis().init();

    match args.command {
        Cli::Deploy(config) => simulation::deploy(config).await,
        Cli::Churn(config) => simulation::churn(config).await,
    }
}
