use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{error, info};

use super::endpoint::Endpoint;
use super::pool::ServerPool;
use super::supervisor::{ConnectFailure, ConnectionSupervisor, SupervisorConfig};
use super::Tunnel;
use crate::config::VpnConfig;
use crate::error::{CollectorError, Result};

/// Server pool plus supervisor for one VPN service
pub struct VpnHandler {
    pool: ServerPool,
    supervisor: ConnectionSupervisor,
    config_dir: PathBuf,
}

impl VpnHandler {
    /// Fails when the service's credentials file is missing
    pub fn new(config: &VpnConfig) -> Result<Self> {
        if !config.credentials_file.is_file() {
            return Err(CollectorError::CredentialsNotFound {
                path: config.credentials_file.clone(),
            });
        }

        Ok(Self {
            pool: ServerPool::new(),
            supervisor: ConnectionSupervisor::new(SupervisorConfig::from(config)),
            config_dir: config.config_dir.clone(),
        })
    }

    pub fn load_server_list(&mut self) -> Result<usize> {
        self.pool.load(&self.config_dir)
    }

    /// Connect to the next endpoint in the rotation
    pub async fn connect_to_next_server(&mut self) -> bool {
        let endpoint = match self.pool.next() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                error!("Cannot pick a VPN server: {}", e);
                return false;
            }
        };

        info!(
            endpoint = %endpoint,
            config = %endpoint.config_path.display(),
            "Selected VPN server"
        );
        self.supervisor.connect(&endpoint).await
    }

    pub async fn disconnect(&mut self) {
        self.supervisor.disconnect().await;
    }

    pub fn is_connected(&mut self) -> bool {
        self.supervisor.is_connected()
    }

    pub fn active_endpoint(&self) -> Option<&Endpoint> {
        self.supervisor.active_endpoint()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn last_failure(&self) -> Option<&ConnectFailure> {
        self.supervisor.last_failure()
    }
}

#[async_trait]
impl Tunnel for VpnHandler {
    async fn connect_next(&mut self) -> bool {
        self.connect_to_next_server().await
    }

    async fn disconnect(&mut self) {
        VpnHandler::disconnect(self).await;
    }

    fn is_connected(&mut self) -> bool {
        VpnHandler::is_connected(self)
    }

    fn describe(&self) -> Option<String> {
        self.active_endpoint().map(ToString::to_string)
    }

    fn pool_size(&self) -> usize {
        VpnHandler::pool_size(self)
    }
}
