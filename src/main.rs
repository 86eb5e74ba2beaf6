use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use ledger_node::coordinator::CoordinatorLink;
use ledger_node::replica::{self, AddMissing};
use ledger_node::{NodeConfig, WorkerNode};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "usage: ledger-node <node_id> <coordinator_ip> <coordinator_port> <bind_ip> <bind_port> <data_dir>";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 7 {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }
    let node_id: u32 = args[1].parse().expect("node_id must be an integer");
    let coordinator = format!(
        "{}:{}",
        args[2],
        args[3].parse::<u16>().expect("coordinator_port must be a port number")
    );
    let bind_ip = args[4].clone();
    let bind_port: u16 = args[5].parse().expect("bind_port must be a port number");
    let data_dir = PathBuf::from(&args[6]);

    let config = NodeConfig::new(node_id, coordinator, bind_ip.clone(), bind_port, data_dir);
    let node = WorkerNode::open(config)
        .await
        .expect("failed to prepare data directory");

    let listener = TcpListener::bind((bind_ip.as_str(), bind_port))
        .await
        .expect("failed to bind listener");
    info!(node = node_id, addr = %format!("{bind_ip}:{bind_port}"), "worker node listening");

    let link = CoordinatorLink::new(node.config(), node.partition_ids());
    tokio::spawn(link.run());
    tokio::spawn(replica::run_reconciler(Arc::clone(&node), AddMissing));

    node.serve(listener).await;
}
