//! Built-in services.

pub mod task;

use std::sync::Arc;
use std::time::Duration;

use crate::types::plugin::Plugin;
use crate::types::service::{service_type, Service, ServiceRegistration};

pub use task::TaskService;

/// Name of the plugin carrying the built-in services
pub const CORE_PLUGIN_NAME: &str = "core";

/// The plugin every runtime registers first: the task scheduler.
pub fn core_plugin(tick: Duration) -> Plugin {
    Plugin::new(CORE_PLUGIN_NAME, "Built-in runtime services").with_service(
        ServiceRegistration::new(service_type::TASK, move |runtime| async move {
            let service: Arc<dyn Service> = TaskService::start(&runtime, tick);
            Ok(service)
        }),
    )
}
