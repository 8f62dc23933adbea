// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable that runs the multicast downlink scheduler.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use slog::{info, o, Drain};

use lorikeet::config::Config;
use lorikeet::gateway::mqtt::MqttBackend;
use lorikeet::rxinfo::InMemoryRxInfoStore;
use lorikeet::Server;

/// Uplink reception sets older than this no longer count as evidence a
/// gateway can reach a device.
const RX_INFO_TTL: Duration = Duration::from_secs(3600);

#[derive(Parser, Debug)]
struct Args {
    #[clap(long, action)]
    config_file: PathBuf,
}

fn logger(config: &Config) -> Result<slog::Logger, anyhow::Error> {
    let level = slog::Level::from_str(&config.log.level)
        .map_err(|_| anyhow!("unknown log level {:?}", config.log.level))?;

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    Ok(slog::Logger::root(drain, o!()))
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    let config_contents = std::fs::read_to_string(&args.config_file)
        .with_context(|| {
            format!("read config file {:?}", args.config_file)
        })?;
    let config: Config =
        toml::from_str(&config_contents).with_context(|| {
            format!("parse config file {:?}", args.config_file)
        })?;

    let log = logger(&config)?;
    info!(log, "starting lorikeet"; "config" => ?config);

    let backend =
        Arc::new(MqttBackend::new(&log, &config.backend.mqtt));
    let rxinfo = Arc::new(InMemoryRxInfoStore::new(RX_INFO_TTL));

    let server = Server::start(&log, &config, backend, rxinfo)
        .await
        .map_err(|e| anyhow!("failed to start server: {}", e))?;

    tokio::signal::ctrl_c().await.context("waiting for SIGINT")?;
    info!(log, "shutting down");
    drop(server);
    Ok(())
}
