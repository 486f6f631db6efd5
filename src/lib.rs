//! # Flowprov
//!
//! Flowprov provisions the credentials a workflow template needs on an
//! n8n-style orchestration engine and deploys the template for a user.
//!
//! ## Pipeline
//!
//! - **Analyze**: find which credential slots the template's nodes need
//! - **Form**: describe the fields a user has to fill in per slot
//! - **Normalize**: turn raw user input into protocol-correct credential payloads
//! - **Materialize**: get-or-create one engine credential per slot, by deterministic name
//! - **Inject**: wire the credentials into a patched copy of the template
//! - **Deploy**: create or update the workflow and activate it, retrying once
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowprov::{Config, DeployRequest, DeployerBuilder};
//!
//! let config = Config::create("flowprov.toml")?;
//! let deployer = DeployerBuilder::new(config).build()?;
//!
//! let request = DeployRequest::new("mail-assistant", "user-42")
//!     .with("mail-inbound.host", "imap.example.com")
//!     .with("mail-inbound.port", "993")
//!     .with("mail-inbound.user", "a@example.com")
//!     .with("mail-inbound.password", "secret");
//! let response = deployer.deploy(&request).await;
//! println!("{}", response.result.user_message());
//! ```

mod builder;
mod config;
mod error;
mod model;
mod utils;

pub mod analyzer;
pub mod client;
pub mod deployer;
pub mod form;
pub mod injector;
pub mod materializer;
pub mod normalizer;
pub mod registry;
pub mod store;

use std::sync::{Arc, RwLock};

pub use builder::DeployerBuilder;
pub use config::*;
pub use deployer::{DeployOptions, Deployer, RetryPolicy, Sleeper, TokioSleeper};
pub use error::ProvisionError;
pub use model::*;
pub use registry::{CredentialKind, Registry};

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
