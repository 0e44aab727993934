//! Collection loop and the request budget that drives VPN rotation

pub mod budget;
pub mod pending;
pub mod runner;

pub use budget::RequestBudget;
pub use pending::PendingUpdates;
pub use runner::{CollectionLoop, RunStats};
