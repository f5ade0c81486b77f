//! Toolpin core library
//!
//! Reconciles an installation directory of plugins and the tools they manage
//! against catalog documents: [`catalog::CatalogLoader`] builds the catalog,
//! [`update::UpdateCalculator`] plans, [`update::UpdateExecutor`] applies the
//! plan behind hash and signature checks.

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod installed;
pub mod platform;
pub mod plugin;
pub mod trust;
pub mod update;

pub use error::{Result, UpdateError};
