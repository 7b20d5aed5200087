//! Long-lived services and how plugins declare them.

use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use crate::runtime::AgentRuntime;

/// Core service type names
pub mod service_type {
    /// Task scheduler
    pub const TASK: &str = "task";
}

/// A long-lived capability module. One instance per type per runtime.
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    /// Registry key
    fn service_type(&self) -> &str;

    fn capability_description(&self) -> &str {
        ""
    }

    /// Upcast for downcasting to the concrete service.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Stop the service. In-flight work may finish or be abandoned.
    async fn stop(&self) -> anyhow::Result<()>;
}

/// Starts a service against the runtime that registers it.
pub type ServiceStartFn = Arc<
    dyn Fn(Arc<AgentRuntime>) -> BoxFuture<'static, anyhow::Result<Arc<dyn Service>>>
        + Send
        + Sync,
>;

/// A service a plugin declares: its type key and how to start it.
#[derive(Clone)]
pub struct ServiceRegistration {
    pub service_type: String,
    pub start: ServiceStartFn,
}

impl ServiceRegistration {
    pub fn new<F, Fut>(service_type: impl Into<String>, start: F) -> Self
    where
        F: Fn(Arc<AgentRuntime>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Arc<dyn Service>>> + Send + 'static,
    {
        ServiceRegistration {
            service_type: service_type.into(),
            start: Arc::new(move |runtime| Box::pin(start(runtime))),
        }
    }
}

impl std::fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("service_type", &self.service_type)
            .finish_non_exhaustive()
    }
}
