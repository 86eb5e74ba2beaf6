//! Link to the coordinator process: registration on connect, periodic
//! heartbeats, reconnect with fixed backoff.
//!
//! The link owns its connection handle and its state outright. Losing the
//! coordinator never affects request serving; the link just keeps retrying
//! for the node's lifetime.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{HEARTBEAT_INTERVAL, NodeConfig, RECONNECT_BACKOFF};
use crate::model::PartitionId;

enum LinkState {
    Disconnected,
    Connected(TcpStream),
}

pub struct CoordinatorLink {
    node_id: u32,
    coordinator: String,
    registration: String,
    heartbeat: String,
    state: LinkState,
}

impl CoordinatorLink {
    pub fn new(config: &NodeConfig, served: impl Iterator<Item = PartitionId>) -> Self {
        let served: Vec<String> = served.map(|p| format!("CUENTA:{p}")).collect();
        let registration = format!(
            "REGISTRO|{}|{}|{}|{}\n",
            config.node_id,
            config.bind_ip,
            config.bind_port,
            served.join(",")
        );
        Self {
            node_id: config.node_id,
            coordinator: config.coordinator.clone(),
            registration,
            heartbeat: format!("HEARTBEAT|{}\n", config.node_id),
            state: LinkState::Disconnected,
        }
    }

    /// Runs the link forever: connect and register, then heartbeat on a fixed
    /// interval; any send failure tears the connection down and re-enters the
    /// reconnect path, which re-registers on success.
    pub async fn run(mut self) {
        loop {
            self.state = match std::mem::replace(&mut self.state, LinkState::Disconnected) {
                LinkState::Disconnected => match self.connect_and_register().await {
                    Ok(stream) => {
                        info!(node = self.node_id, coordinator = %self.coordinator, "registered with coordinator");
                        LinkState::Connected(stream)
                    }
                    Err(err) => {
                        warn!(coordinator = %self.coordinator, error = %err, "coordinator unreachable, retrying");
                        sleep(RECONNECT_BACKOFF).await;
                        LinkState::Disconnected
                    }
                },
                LinkState::Connected(mut stream) => {
                    sleep(HEARTBEAT_INTERVAL).await;
                    match stream.write_all(self.heartbeat.as_bytes()).await {
                        Ok(()) => LinkState::Connected(stream),
                        Err(err) => {
                            warn!(error = %err, "heartbeat failed, reconnecting");
                            LinkState::Disconnected
                        }
                    }
                }
            };
        }
    }

    async fn connect_and_register(&self) -> std::io::Result<TcpStream> {
        let mut stream = TcpStream::connect(&self.coordinator).await?;
        stream.write_all(self.registration.as_bytes()).await?;
        Ok(stream)
    }
}
