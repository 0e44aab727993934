//! VPN rotation: endpoint pool, client process supervision and config rendering

pub mod artifact;
pub mod endpoint;
pub mod handler;
pub mod output;
pub mod pool;
pub mod supervisor;

use async_trait::async_trait;

pub use endpoint::Endpoint;
pub use handler::VpnHandler;
pub use pool::ServerPool;
pub use supervisor::{ConnectFailure, ConnectionState, ConnectionSupervisor, SupervisorConfig};

/// Egress tunnel the collection loop rotates through
#[async_trait]
pub trait Tunnel: Send {
    /// Bring up a tunnel to the next endpoint; false when it did not come up
    async fn connect_next(&mut self) -> bool;

    async fn disconnect(&mut self);

    fn is_connected(&mut self) -> bool;

    /// Human readable description of the active endpoint
    fn describe(&self) -> Option<String>;

    fn pool_size(&self) -> usize;
}
