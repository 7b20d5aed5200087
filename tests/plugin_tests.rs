//! Plugin registration: ordering, idempotence, rollback and model routing.

mod common;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use common::{Harness, SpyAction};
use eliza_runtime::services::TaskService;
use eliza_runtime::types::model::ModelType;
use eliza_runtime::types::service::{service_type, Service, ServiceRegistration};
use eliza_runtime::{Plugin, RuntimeError};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct EchoService {
    kind: &'static str,
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl Service for EchoService {
    fn service_type(&self) -> &str {
        self.kind
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn echo_service(kind: &'static str, stopped: &Arc<AtomicBool>) -> ServiceRegistration {
    let stopped = stopped.clone();
    ServiceRegistration::new(kind, move |_| {
        let stopped = stopped.clone();
        async move { Ok(Arc::new(EchoService { kind, stopped }) as Arc<dyn Service>) }
    })
}

fn classify(err: &anyhow::Error) -> Option<&RuntimeError> {
    err.downcast_ref::<RuntimeError>()
}

#[tokio::test]
async fn test_initialize_registers_the_task_service() {
    let harness = Harness::new(vec![]).await;

    assert!(harness.runtime.has_plugin("core").await);
    assert!(harness.runtime.has_service(service_type::TASK).await);
    let service = harness
        .runtime
        .get_service_as::<TaskService>(service_type::TASK)
        .await
        .unwrap();
    assert!(service.is_running());
}

#[tokio::test]
async fn test_registering_a_plugin_twice_is_a_no_op() {
    let harness = Harness::new(vec![]).await;
    let inits = Arc::new(AtomicUsize::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));

    let plugin = || {
        let inits = inits.clone();
        Plugin::new("greeter", "Says hello")
            .with_action(Arc::new(SpyAction::new("GREET", &log)))
            .with_init(move |_, _| {
                let inits = inits.clone();
                async move {
                    inits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
    };

    harness.runtime.register_plugin(plugin()).await.unwrap();
    harness.runtime.register_plugin(plugin()).await.unwrap();

    assert_eq!(inits.load(Ordering::SeqCst), 1);
    let greeters = harness
        .runtime
        .plugin_names()
        .await
        .into_iter()
        .filter(|n| n == "greeter")
        .count();
    assert_eq!(greeters, 1);
    assert_eq!(
        harness
            .runtime
            .list_action_definitions()
            .await
            .iter()
            .filter(|a| a.name == "GREET")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_plugins_register_dependencies_first() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let plugin = |name: &'static str, deps: &[&str]| {
        let order = order.clone();
        deps.iter()
            .fold(Plugin::new(name, "ordered"), |p, d| p.with_dependency(d))
            .with_init(move |_, _| {
                let order = order.clone();
                async move {
                    order.lock().unwrap().push(name);
                    Ok(())
                }
            })
    };

    let harness = Harness::new(vec![
        plugin("app", &["storage", "search"]),
        plugin("search", &["storage"]),
        plugin("storage", &[]),
    ])
    .await;

    assert_eq!(*order.lock().unwrap(), vec!["storage", "search", "app"]);
    let names = harness.runtime.plugin_names().await;
    let position = |n: &str| names.iter().position(|x| x == n).unwrap();
    assert!(position("storage") < position("search"));
    assert!(position("search") < position("app"));
}

#[tokio::test]
async fn test_dependency_cycle_is_rejected() {
    let harness = Harness::new(vec![]).await;
    let err = harness
        .runtime
        .register_plugins(vec![
            Plugin::new("a", "cyclic").with_dependency("b"),
            Plugin::new("b", "cyclic").with_dependency("a"),
        ])
        .await
        .unwrap_err();

    assert!(matches!(
        classify(&err),
        Some(RuntimeError::DependencyCycle(_))
    ));
    assert!(!harness.runtime.has_plugin("a").await);
    assert!(!harness.runtime.has_plugin("b").await);
}

#[tokio::test]
async fn test_missing_dependency_is_rejected() {
    let harness = Harness::new(vec![]).await;
    let err = harness
        .runtime
        .register_plugin(Plugin::new("lonely", "needs a friend").with_dependency("friend"))
        .await
        .unwrap_err();

    match classify(&err) {
        Some(RuntimeError::MissingDependency { plugin, dependency }) => {
            assert_eq!(plugin, "lonely");
            assert_eq!(dependency, "friend");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_service_start_rolls_back_the_plugin() {
    let harness = Harness::new(vec![]).await;
    let stopped = Arc::new(AtomicBool::new(false));
    let log = Arc::new(Mutex::new(Vec::new()));

    let plugin = Plugin::new("flaky", "Starts one service, fails the next")
        .with_action(Arc::new(SpyAction::new("FLAKY_ACTION", &log)))
        .with_service(echo_service("echo", &stopped))
        .with_service(ServiceRegistration::new("broken", |_| async {
            Err::<Arc<dyn Service>, _>(anyhow!("no backend"))
        }));

    let err = harness.runtime.register_plugin(plugin).await.unwrap_err();

    assert!(matches!(
        classify(&err),
        Some(RuntimeError::ServiceStart { service, .. }) if service == "broken"
    ));
    assert!(stopped.load(Ordering::SeqCst));
    assert!(!harness.runtime.has_service("echo").await);
    assert!(!harness.runtime.has_plugin("flaky").await);
    assert!(harness.runtime.get_action("FLAKY_ACTION").await.is_none());
}

#[tokio::test]
async fn test_init_hook_reruns_when_registration_is_retried() {
    let harness = Harness::new(vec![]).await;
    let inits = Arc::new(AtomicUsize::new(0));
    let backend_up = Arc::new(AtomicBool::new(false));
    let stopped = Arc::new(AtomicBool::new(false));

    let plugin = || {
        let inits = inits.clone();
        let backend_up = backend_up.clone();
        Plugin::new("retrying", "Needs its backend")
            .with_init(move |_, _| {
                let inits = inits.clone();
                async move {
                    inits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_service(echo_service("cache", &stopped))
            .with_service(ServiceRegistration::new("backend", move |_| {
                let up = backend_up.load(Ordering::SeqCst);
                let stopped = Arc::new(AtomicBool::new(false));
                async move {
                    if !up {
                        return Err(anyhow!("backend offline"));
                    }
                    Ok(Arc::new(EchoService { kind: "backend", stopped }) as Arc<dyn Service>)
                }
            }))
    };

    assert!(harness.runtime.register_plugin(plugin()).await.is_err());
    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert!(stopped.load(Ordering::SeqCst));
    assert!(!harness.runtime.has_plugin("retrying").await);

    backend_up.store(true, Ordering::SeqCst);
    harness.runtime.register_plugin(plugin()).await.unwrap();
    assert_eq!(inits.load(Ordering::SeqCst), 2);
    assert!(harness.runtime.has_service("cache").await);
    assert!(harness.runtime.has_service("backend").await);
}

#[tokio::test]
async fn test_duplicate_service_type_is_rejected() {
    let harness = Harness::new(vec![]).await;
    let first = Arc::new(AtomicBool::new(false));
    let second = Arc::new(AtomicBool::new(false));

    harness
        .runtime
        .register_plugin(Plugin::new("one", "first echo").with_service(echo_service("echo", &first)))
        .await
        .unwrap();
    let err = harness
        .runtime
        .register_plugin(Plugin::new("two", "second echo").with_service(echo_service("echo", &second)))
        .await
        .unwrap_err();

    assert!(matches!(
        classify(&err),
        Some(RuntimeError::DuplicateService(kind)) if kind == "echo"
    ));
    assert!(!first.load(Ordering::SeqCst));
    assert!(harness.runtime.has_service("echo").await);
}

#[tokio::test]
async fn test_failing_init_hook_registers_nothing() {
    let harness = Harness::new(vec![]).await;
    let log = Arc::new(Mutex::new(Vec::new()));
    let plugin = Plugin::new("grumpy", "Refuses to start")
        .with_action(Arc::new(SpyAction::new("GRUMPY", &log)))
        .with_init(|_, _| async { Err(anyhow!("missing API key")) });

    let err = harness.runtime.register_plugin(plugin).await.unwrap_err();

    assert!(matches!(
        classify(&err),
        Some(RuntimeError::PluginInit { plugin, .. }) if plugin == "grumpy"
    ));
    assert!(harness.runtime.get_action("GRUMPY").await.is_none());
}

#[tokio::test]
async fn test_latest_model_registration_wins() {
    let harness = Harness::new(vec![
        Plugin::new("openai", "first provider")
            .with_model(ModelType::TextSmall, |_| async { Ok(json!("from openai")) }),
        Plugin::new("local", "second provider")
            .with_model(ModelType::TextSmall, |_| async { Ok(json!("from local")) }),
    ])
    .await;
    let runtime = &harness.runtime;

    assert_eq!(
        runtime.model_providers(ModelType::TextSmall).await,
        vec!["openai".to_string(), "local".to_string()]
    );
    assert_eq!(
        runtime.use_model(ModelType::TextSmall, json!({})).await.unwrap(),
        json!("from local")
    );

    let err = runtime
        .use_model(ModelType::Image, json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        classify(&err),
        Some(RuntimeError::ModelNotFound(ModelType::Image))
    ));
}
