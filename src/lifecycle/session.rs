use crate::query::Query;
use factgraph_core::{FactError, Provider, Registry, Result, Runtime, Schema, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one query, as printed by the CLI.
///
/// Serializes to the field value itself, to `{"error": "..."}` or to `{"pending": true}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Value(Value),
    Error { error: String },
    Pending { pending: bool },
}

impl Outcome {
    fn error(err: impl std::fmt::Display) -> Self {
        Self::Error {
            error: err.to_string(),
        }
    }

    fn pending() -> Self {
        Self::Pending { pending: true }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// One CLI invocation: a registry with the OS pack, a runtime bound to a provider, and the
/// queries evaluated against it.
///
/// # Example
///
/// ```ignore
/// let session = Session::new(Arc::new(LocalProvider::new()))?;
/// let results = session.run(&queries, "factgraph", Duration::from_secs(2)).await?;
/// session.shutdown();
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    runtime: Runtime,
}

impl Session {
    pub fn new(provider: Arc<dyn Provider>) -> Result<Self> {
        let registry = Registry::new();
        factgraph_os::init(&registry)?;
        let runtime = Runtime::new(registry, provider)?;
        info!(provider = runtime.provider().name(), resources = runtime.registry().len(), "session started");
        Ok(Self { runtime })
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn schema(&self, include_private: bool) -> Schema {
        self.runtime.registry().schema(include_private)
    }

    /// Evaluates every query on the blocking pool, one task per query.
    ///
    /// Query `i` subscribes as `{watcher}/{i}` and unregisters once it has a result, so
    /// queries that share fields still compute them once.
    #[tracing::instrument(skip(self, queries), fields(count = queries.len()))]
    pub async fn run(
        &self,
        queries: &[String],
        watcher: &str,
        timeout: Duration,
    ) -> anyhow::Result<BTreeMap<String, Outcome>> {
        let handles: Vec<_> = queries
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let session = self.clone();
                let raw = raw.clone();
                let watcher = format!("{watcher}/{i}");
                tokio::task::spawn_blocking(move || {
                    let outcome = session.query(&raw, &watcher, timeout);
                    (raw, outcome)
                })
            })
            .collect();

        let mut results = BTreeMap::new();
        for handle in handles {
            let (raw, outcome) = handle.await?;
            results.insert(raw, outcome);
        }
        Ok(results)
    }

    /// Evaluates one query, blocking for at most `timeout` when the field is being computed
    /// by someone else.
    pub fn query(&self, raw: &str, watcher: &str, timeout: Duration) -> Outcome {
        let outcome = self
            .try_query(raw, watcher, timeout)
            .unwrap_or_else(Outcome::from);
        if let Err(e) = self.runtime.unregister(watcher) {
            warn!(watcher, error = %e, "failed to release query subscriptions");
        }
        outcome
    }

    fn try_query(&self, raw: &str, watcher: &str, timeout: Duration) -> Result<Outcome> {
        let query = Query::parse(raw, self.runtime.registry())?;
        debug!(%query, watcher, "evaluating query");
        let resource = self
            .runtime
            .create_resource(&query.resource, query.args.clone())?;

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        self.runtime
            .watch_and_update(resource.as_ref(), &query.field, watcher, move |result| {
                let _ = tx.lock().unwrap_or_else(PoisonError::into_inner).send(result);
            })?;

        Ok(match rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Outcome::Value(value),
            Ok(Err(e)) => Outcome::error(e),
            Err(_) => {
                debug!(%query, watcher, "query still pending");
                Outcome::pending()
            }
        })
    }

    /// Logs what the session leaves behind. Every query unregisters itself, so a non-empty
    /// observer graph here means a subscription leaked.
    pub fn shutdown(self) {
        let observers = self.runtime.observers();
        if !observers.is_empty() {
            warn!(
                fields = observers.field_count(),
                watchers = observers.watcher_count(),
                "observer graph not empty at shutdown"
            );
        }
        info!(instances = self.runtime.instance_count(), "session closed");
    }
}

impl From<FactError> for Outcome {
    fn from(err: FactError) -> Self {
        Outcome::error(err)
    }
}
