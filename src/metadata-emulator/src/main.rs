// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runs the metadata server emulator.

use clap::Parser;
use google_cloud_metadata_emulator::config::{Args, ServerConfig};
use google_cloud_metadata_emulator::server::MetadataServer;
use std::process::ExitCode;
use tokio::net::TcpListener;

// Invalid arguments, or the server cannot bind or serve.
const EXIT_FAILURE: u8 = 1;
// The process cannot set up the runtime or the HTTP clients.
const EXIT_INTERNAL: u8 = 99;

fn main() -> ExitCode {
    let args = Args::parse();
    enable_tracing(args.log_level);

    let config = match args.into_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("invalid arguments: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    tracing::debug!("{config:?}");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("cannot start the async runtime: {e}");
            return ExitCode::from(EXIT_INTERNAL);
        }
    };
    runtime.block_on(run(config))
}

async fn run(config: ServerConfig) -> ExitCode {
    let address = (config.host.clone(), config.port);
    let server = match MetadataServer::builder(config).build() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("cannot create the metadata server: {e}");
            return ExitCode::from(EXIT_INTERNAL);
        }
    };
    let listener = match TcpListener::bind((address.0.as_str(), address.1)).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("cannot listen on {}:{}: {e}", address.0, address.1);
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    match server.serve(listener).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("server error: {e}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn enable_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_level(true)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("cannot install the log subscriber: {e}");
    }
}
