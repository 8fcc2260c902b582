// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The `dfs-node` server binary (spec §6 CLI surface, C10 bootstrap).
//! Grounded on `sn_node/src/bin/safenode/main.rs` (`clap::Parser` CLI,
//! tracing init, spawning the node's background tasks) and
//! `kade_drive/core/network.py`'s `Server.listen`/`bootstrap` (bind a
//! sequential port, mint a random node id, start the maintenance and
//! solitude-detector threads).

use clap::{Parser, Subcommand};
use dfs_networking::dht::{Dht, DhtHandler};
use dfs_networking::{Config, NetworkContext};
use dfs_protocol::{digest, NodeDescriptor};
use eyre::{Result, WrapErr};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(name = "dfs-node", version = env!("CARGO_PKG_VERSION"))]
struct Opt {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start this process as a participating DHT node.
    Start {
        /// The interface to bind the RPC listener and the discovery
        /// heartbeat to. The special value `0.0.0.0` binds to every
        /// interface (spec §6).
        #[clap(long = "host-ip", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
        host_ip: IpAddr,

        /// Minimum severity emitted to stderr.
        #[clap(long = "log-level", value_enum, default_value_t = LogLevel::Info)]
        log_level: LogLevel,

        /// Port to start binding from; retried sequentially until free.
        #[clap(long, env = "DFS_PORT", default_value_t = dfs_networking::config::DEFAULT_PORT)]
        port: u16,

        /// Directory holding `values/`, `metadata/`, `keys/`, `timestamps/`.
        #[clap(long, env = "DFS_STORAGE_DIR", default_value = "static")]
        storage_dir: PathBuf,

        /// Replication factor and bucket capacity.
        #[clap(long, env = "DFS_KSIZE", default_value_t = 2)]
        ksize: usize,

        /// Crawler concurrency per round.
        #[clap(long, env = "DFS_ALPHA", default_value_t = 3)]
        alpha: usize,

        /// Seconds after which a non-integrity record is garbage collected.
        #[clap(long, env = "DFS_TTL_SECS", default_value_t = 3600)]
        ttl_secs: u64,

        /// Maintenance-loop period, in seconds.
        #[clap(long, env = "DFS_REFRESH_SLEEP_SECS", default_value_t = 300)]
        refresh_sleep_secs: u64,

        /// Bytes per chunk in the put pipeline.
        #[clap(long, env = "DFS_CHUNK_SIZE", default_value_t = 500)]
        chunk_size: usize,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LogLevel {
    Info,
    Debug,
    Warning,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Warning => "warn",
        }
    }
}

fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level.as_filter()))
        .init();
}

/// Mints a fresh node id from a random seed, per spec §4.1 ("a random
/// seed" is one of the permitted inputs to `digest`).
fn random_node_id() -> dfs_protocol::Id {
    let seed: [u8; 32] = rand::random();
    digest(&seed)
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    let Command::Start {
        host_ip,
        log_level,
        port,
        storage_dir,
        ksize,
        alpha,
        ttl_secs,
        refresh_sleep_secs,
        chunk_size,
    } = opt.command;

    init_tracing(log_level);

    let config = Config {
        ksize,
        alpha,
        ttl_secs,
        refresh_sleep_secs,
        chunk_size,
        storage_dir,
        port,
        ..Config::default()
    };

    let store = dfs_networking::LocalStore::open(&config.storage_dir)
        .wrap_err_with(|| format!("could not open the local store at {}", config.storage_dir.display()))?;

    let (listener, bound_port) = dfs_networking::transport::bind_sequential(&host_ip.to_string(), config.port)
        .await
        .wrap_err("could not bind a TCP port for the RPC listener")?;

    let self_descriptor = NodeDescriptor::new(random_node_id(), host_ip.to_string(), bound_port);
    tracing::info!(node = %self_descriptor, "node id minted");

    let ctx = Arc::new(NetworkContext::new(self_descriptor.clone(), store, config));
    let dht = Dht::new(Arc::clone(&ctx));
    let handler: Arc<dyn dfs_networking::transport::RequestHandler> = Arc::new(DhtHandler::new(dht));

    let bound_addr = listener.local_addr().wrap_err("could not read the bound listener address")?;
    let serve_task = tokio::spawn(dfs_networking::transport::serve_on(listener, handler));
    tracing::info!(%bound_addr, "listening for peer and client RPCs");

    let discovery = dfs_networking::discovery::Discovery::new(host_ip.to_string(), bound_port);
    let announce_task = tokio::spawn({
        let discovery = discovery.clone();
        async move {
            if let Err(err) = discovery.announce_forever().await {
                tracing::warn!(%err, "discovery heartbeat stopped");
            }
        }
    });
    let solitude_task = tokio::spawn(dfs_networking::maintenance::run_solitude_detector(
        Arc::clone(&ctx),
        discovery,
    ));
    let maintenance_task = tokio::spawn(dfs_networking::maintenance::run_forever(Arc::clone(&ctx)));

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received, stopping"),
        Err(err) => tracing::warn!(%err, "failed to listen for shutdown signal"),
    }

    serve_task.abort();
    announce_task.abort();
    solitude_task.abort();
    maintenance_task.abort();
    Ok(())
}
