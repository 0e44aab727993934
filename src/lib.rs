//! Bio Collector - profile metadata collection behind rotating VPN servers
//!
//! ## Features
//!
//! - Round-robin rotation over every `remote` found in a directory of OpenVPN configs
//! - Supervision of a single OpenVPN client process group per tunnel
//! - Rotation after a request budget is spent, with a penalty for rate limits
//! - Batched per-profile status updates in PostgreSQL
//! - Delivery of scraped profiles to a downstream HTTP API

pub mod api;
pub mod collector;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod repository;
pub mod scraper;
pub mod vpn;

pub use config::Config;
pub use database::Database;
pub use error::{CollectorError, Result};
