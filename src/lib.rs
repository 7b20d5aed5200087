//! Agent runtime core.
//!
//! An [`AgentRuntime`] hosts one agent: it registers plugins in dependency
//! order, composes per-message state from providers, runs the actions a
//! response names and the evaluators that follow, schedules tasks, and routes
//! model calls to the most recently registered handler.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use eliza_runtime::{parse_character, AgentRuntime, InMemoryDatabaseAdapter, RuntimeOptions};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let character = parse_character(r#"{"name": "TestAgent", "bio": "A test agent"}"#)?;
//!     let runtime = AgentRuntime::new(RuntimeOptions {
//!         character: Some(character),
//!         adapter: Some(Arc::new(InMemoryDatabaseAdapter::new())),
//!         ..Default::default()
//!     })
//!     .await?;
//!     runtime.initialize().await?;
//!     Ok(())
//! }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod adapters;
pub mod character;
pub mod error;
pub mod logging;
pub mod plugin;
pub mod roles;
pub mod runtime;
pub mod semaphore;
pub mod services;
pub mod settings;
pub mod template;
pub mod types;

pub use adapters::InMemoryDatabaseAdapter;
pub use character::{load_character_file, merge_character_defaults, parse_character, validate_character};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LogLevel;
pub use plugin::PluginCatalog;
pub use runtime::{AgentRuntime, RuntimeOptions};
pub use semaphore::Semaphore;
pub use settings::{RuntimeSettings, SettingValue};
pub use types::agent::{Bio, Character};
pub use types::plugin::Plugin;
pub use types::primitives::{create_unique_uuid, string_to_uuid, UUID};

/// Install the default tracing subscriber from `RUST_LOG` / `LOG_LEVEL`.
/// Returns `false` when a subscriber was already installed.
pub fn init() -> bool {
    logging::init_from_env()
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
