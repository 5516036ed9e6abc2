// src/main.rs

//! The main entry point for the cluster controller node process.

use anyhow::{Context as _, Result};
use cluster_ctl::bus::NullForwardingProxy;
use cluster_ctl::config::ControllerConfig;
use cluster_ctl::controller::{Collaborators, Controller};
use cluster_ctl::fatal::RealProcessTerminator;
use cluster_ctl::node_info::{Endpoint, NodeInfo};
use std::env;
use std::sync::Arc;
use tracing::info;

struct NoopLogDatabase;

#[async_trait::async_trait]
impl cluster_ctl::bus::LogDatabase for NoopLogDatabase {
    async fn close(&self) -> Result<(), cluster_ctl::error::ControllerError> {
        Ok(())
    }
}

struct NoopWorkerHandler;

impl cluster_ctl::bus::WorkerHandler for NoopWorkerHandler {
    fn stop(&self) {}
}

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    if args.contains(&"--version".to_string()) {
        println!("cluster-ctl-node version {VERSION}");
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .compact()
        .init();

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let config = match std::fs::read_to_string(config_path) {
        Ok(contents) => ControllerConfig::from_toml_str(&contents)
            .with_context(|| format!("parsing config file {config_path}"))?,
        Err(_) => {
            info!(config_path, "no config file found, using defaults");
            ControllerConfig::default()
        }
    };

    let node_info = NodeInfo {
        instance_id: cluster_ctl::ids::new_id(),
        http_endpoint: Endpoint::new("0.0.0.0", 2113),
        tcp_endpoint: Endpoint::new("0.0.0.0", 1112),
        secure_tcp_endpoint: None,
        is_read_only_replica: config.read_only,
    };

    let collaborators = Collaborators {
        forwarding_proxy: Arc::new(NullForwardingProxy),
        log_database: Arc::new(NoopLogDatabase),
        worker_handler: Arc::new(NoopWorkerHandler),
        terminator: Arc::new(RealProcessTerminator),
    };

    info!(instance_id = %node_info.instance_id, "starting cluster controller node");
    let (controller, handles) = Controller::new(node_info, config, collaborators);
    handles
        .queue
        .post(cluster_ctl::message::Message::SystemInit)
        .await
        .context("posting SystemInit to a freshly constructed controller")?;
    controller.run().await;
    Ok(())
}
