//! # Runtime
//!
//! The runtime owns the resource instance store and the observer graph, and is the only
//! component that touches caches and observers together. It exposes four protocol steps:
//!
//! - **watch + update** ([`Runtime::watch_and_update`]): subscribe a terminal consumer to a
//!   field and hand it the value once the field is valid.
//! - **watch + compute** ([`Runtime::watch_and_compute`]): wire a producer → producer edge;
//!   when the source field changes, the destination field is recomputed and triggered.
//! - **register**: a resource wires its own upstream edges for a field (resource-supplied).
//! - **trigger** ([`Runtime::trigger`]): compute a field once, or fan a valid field out to
//!   its watchers.
//!
//! ## Pull, then push
//!
//! The first subscription to a field pulls: it registers the field's dependencies (which
//! computes them), computes the field directly and then pushes the result to everyone
//! already watching. Anything that was not ready at that point is pushed later, through the
//! watch + compute edges, when the dependency is triggered.
//!
//! ## Ownership
//!
//! `Runtime` is a cheap handle around shared state; clone it freely. Observer callbacks
//! hold a [`WeakRuntime`], so the graph never keeps the runtime alive, and they look
//! resources up by id instead of holding them.

use crate::cache::CacheEntry;
use crate::concurrent::ConcurrentMap;
use crate::error::{FactError, Result};
use crate::observers::{Callback, Observers};
use crate::provider::Provider;
use crate::registry::{Registry, ResourceClass};
use crate::resource::{Resource, ResourceHandle, ResourceId, StaticResource};
use crate::value::{Args, Value, ID_ARG};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace, warn};

struct RuntimeInner {
    registry: Arc<Registry>,
    provider: Arc<dyn Provider>,
    instances: ConcurrentMap<String, ResourceHandle>,
    observers: Observers,
}

/// Handle to a resource runtime bound to one registry and one provider.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Non-owning runtime handle held by observer callbacks.
#[derive(Clone)]
pub struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

/// Builder for [`Runtime`]; both the registry and the provider are required.
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    registry: Option<Arc<Registry>>,
    provider: Option<Arc<dyn Provider>>,
}

impl RuntimeBuilder {
    pub fn registry(mut self, registry: impl Into<Arc<Registry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn build(self) -> Result<Runtime> {
        let registry = self.registry.ok_or_else(|| {
            FactError::validation("cannot initialize a runtime without a registry")
        })?;
        let provider = self.provider.ok_or_else(|| {
            FactError::validation("cannot initialize a runtime without a provider")
        })?;
        debug!(provider = provider.name(), resources = registry.len(), "runtime created");
        Ok(Runtime {
            inner: Arc::new(RuntimeInner {
                registry,
                provider,
                instances: ConcurrentMap::new(),
                observers: Observers::new(),
            }),
        })
    }
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn new(registry: impl Into<Arc<Registry>>, provider: Arc<dyn Provider>) -> Result<Self> {
        Self::builder().registry(registry).provider(provider).build()
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn provider(&self) -> &dyn Provider {
        self.inner.provider.as_ref()
    }

    pub fn observers(&self) -> &Observers {
        &self.inner.observers
    }

    /// Number of live resource instances.
    pub fn instance_count(&self) -> usize {
        self.inner.instances.len()
    }

    // =========================================================================
    // RESOURCE INSTANCES
    // =========================================================================

    pub fn create_resource(&self, name: &str, args: Args) -> Result<ResourceHandle> {
        self.create_resource_with_id(name, "", args)
    }

    /// Creates a resource from the flat `(key, value, ...)` argument convention.
    pub fn create_resource_from_pairs(&self, name: &str, pairs: Vec<Value>) -> Result<ResourceHandle> {
        self.create_resource(name, Args::from_pairs(pairs)?)
    }

    /// Creates (or returns the existing) instance of `name`.
    ///
    /// A non-empty `id` is forced onto the new instance through the reserved
    /// [`ID_ARG`] argument. There is exactly one live instance per identity: when one already
    /// exists it is returned and the freshly built candidate is dropped without validation.
    pub fn create_resource_with_id(&self, name: &str, id: &str, mut args: Args) -> Result<ResourceHandle> {
        let class = self.inner.registry.resolve(name)?;
        let Some(factory) = class.factory.clone() else {
            return self.create_static(&class, id, args);
        };

        if !id.is_empty() {
            args.insert(ID_ARG, id);
        }
        let forced = args.get(ID_ARG).and_then(Value::as_str).map(str::to_string);

        let resource = factory(self, args).map_err(|e| match e {
            FactError::Validation(_) | FactError::NotFound(_) | FactError::DuplicateName(_) => e,
            other => FactError::compute(&class.name, "<factory>", other),
        })?;

        let rid = resource.id().clone();
        if let Some(forced) = forced {
            if rid.id != forced {
                return Err(FactError::validation(format!(
                    "factory for resource '{}' ignored the forced id '{forced}'",
                    class.name
                )));
            }
        }

        if let Some(existing) = self.inner.instances.load(&rid.uid()) {
            trace!(resource = %rid.name, id = %rid.id, "reusing existing resource");
            return Ok(existing);
        }

        resource.validate().map_err(|e| match e {
            FactError::Validation(_) => e,
            other => FactError::validation(format!(
                "failed to create resource '{}': {other}",
                rid.name
            )),
        })?;

        let (stored, existed) = self.inner.instances.load_or_store(rid.uid(), resource);
        debug!(resource = %rid.name, id = %rid.id, existed, "created resource");
        Ok(stored)
    }

    fn create_static(&self, class: &ResourceClass, id: &str, args: Args) -> Result<ResourceHandle> {
        if !args.is_empty() {
            return Err(FactError::validation(format!(
                "static resources don't take any arguments, the resource '{}' doesn't have a factory",
                class.name
            )));
        }
        if !id.is_empty() {
            return Err(FactError::validation(format!(
                "cannot force id '{id}' on static resource '{}'",
                class.name
            )));
        }

        let uid = ResourceId::new(class.name.clone(), "").uid();
        if let Some(existing) = self.inner.instances.load(&uid) {
            return Ok(existing);
        }
        let resource: ResourceHandle = Arc::new(StaticResource::new(class));
        let (stored, existed) = self.inner.instances.load_or_store(uid, resource);
        if !existed {
            debug!(resource = %class.name, "created static resource");
        }
        Ok(stored)
    }

    /// Looks up a live instance by class name (or alias) and id.
    pub fn get_resource(&self, name: &str, id: &str) -> Result<ResourceHandle> {
        let canonical = self
            .inner
            .registry
            .resolve(name)
            .map(|class| class.name.clone())
            .unwrap_or_else(|_| name.to_string());
        self.handle(&ResourceId::new(canonical, id))
    }

    pub fn handle(&self, id: &ResourceId) -> Result<ResourceHandle> {
        self.inner
            .instances
            .load(&id.uid())
            .ok_or_else(|| FactError::not_found(format!("cannot find cached resource {id}")))
    }

    // =========================================================================
    // WATCH / COMPUTE / TRIGGER
    // =========================================================================

    /// Subscribes `watcher` to `field` of `resource` and calls `callback` with the field's
    /// value once it is valid.
    ///
    /// The first subscription to a field registers and computes it, then notifies every
    /// watcher of the field; a `NotReady` outcome is swallowed and the callback runs later,
    /// when the field is triggered. A later subscription to an already valid field gets the
    /// cached value immediately. Re-watching with the same watcher replaces the callback and
    /// does nothing else.
    ///
    /// Fields never change once valid, so `callback` runs at most once per subscription.
    pub fn watch_and_update<F>(
        &self,
        resource: &dyn Resource,
        field: &str,
        watcher: &str,
        callback: F,
    ) -> Result<()>
    where
        F: Fn(Result<Value>) + Send + Sync + 'static,
    {
        let rid = resource.id().clone();
        let fields = self.inner.registry.fields(&rid.name)?;
        if !fields.contains_key(field) {
            return Err(FactError::unknown_field(&rid.name, field));
        }
        let field_uid = rid.field_uid(field);

        let process = self.update_callback(rid.clone(), field, callback);
        let outcome = self
            .inner
            .observers
            .watch(&field_uid, watcher, process.clone())?;
        debug!(
            resource = %rid,
            field,
            watcher,
            initial = outcome.initial,
            exists = outcome.existed,
            "w+u> watch and update"
        );
        if outcome.existed {
            return Ok(());
        }

        if outcome.initial {
            match resource.register(self, field) {
                Ok(()) | Err(FactError::NotReady) => {}
                Err(e) => return Err(FactError::compute(&rid.name, field, e)),
            }
            match resource.compute(self, field) {
                Err(FactError::NotReady) => {
                    trace!(resource = %rid, field, "w+u> waiting for dependencies");
                    return Ok(());
                }
                Err(e) => return Err(FactError::compute(&rid.name, field, e)),
                Ok(()) => {}
            }
        }

        if !resource.base().cache().is_valid(field) {
            return Ok(());
        }
        if outcome.initial {
            // watchers that subscribed while the field was computing are waiting too
            self.propagate(&rid, field)
        } else {
            trace!(resource = %rid, field, watcher, "w+u> process field result");
            process();
            Ok(())
        }
    }

    fn update_callback<F>(&self, rid: ResourceId, field: &str, callback: F) -> Callback
    where
        F: Fn(Result<Value>) + Send + Sync + 'static,
    {
        let runtime = self.downgrade();
        let field = field.to_string();
        let delivered = AtomicBool::new(false);
        Arc::new(move || {
            let Some(runtime) = runtime.upgrade() else {
                return;
            };
            let result = runtime.handle(&rid).and_then(|res| res.field(&field));
            if matches!(result, Err(FactError::NotReady)) || delivered.swap(true, Ordering::AcqRel) {
                return;
            }
            callback(result);
        })
    }

    /// Recomputes `dst.dfield` whenever `src.sfield` is triggered, then triggers
    /// `dst.dfield` in turn.
    ///
    /// The destination field's uid is the watcher id, which is what lets
    /// [`Runtime::unregister`] release the edge once nobody watches the destination.
    pub fn watch_and_compute(
        &self,
        src: &dyn Resource,
        sfield: &str,
        dst: &dyn Resource,
        dfield: &str,
    ) -> Result<()> {
        let sid = src.id().field_uid(sfield);
        let fid = dst.id().field_uid(dfield);

        let callback = self.compute_callback(dst.id().clone(), dfield);
        let outcome = self.inner.observers.watch(&sid, &fid, callback)?;
        debug!(
            src = %src.id(),
            sfield,
            dst = %dst.id(),
            dfield,
            initial = outcome.initial,
            exists = outcome.existed,
            "w+c> watch and compute"
        );
        if outcome.existed || !outcome.initial {
            return Ok(());
        }

        match src.register(self, sfield) {
            Ok(()) | Err(FactError::NotReady) => {}
            Err(e) => {
                error!(src = %src.id(), sfield, error = %e, "w+c> initial register failed");
                return Err(FactError::compute(&src.id().name, sfield, e));
            }
        }
        match src.compute(self, sfield) {
            Ok(()) if src.base().cache().is_valid(sfield) => self.propagate(src.id(), sfield),
            Ok(()) | Err(FactError::NotReady) => Ok(()),
            Err(e) => {
                error!(src = %src.id(), sfield, error = %e, "w+c> initial compute failed");
                Err(FactError::compute(&src.id().name, sfield, e))
            }
        }
    }

    fn compute_callback(&self, dst: ResourceId, dfield: &str) -> Callback {
        let runtime = self.downgrade();
        let dfield = dfield.to_string();
        Arc::new(move || {
            let Some(runtime) = runtime.upgrade() else {
                return;
            };
            let resource = match runtime.handle(&dst) {
                Ok(resource) => resource,
                Err(e) => {
                    warn!(dst = %dst, field = %dfield, error = %e, "w+c> destination resource is gone");
                    return;
                }
            };
            match resource.compute(&runtime, &dfield) {
                Ok(()) => {}
                Err(FactError::NotReady) => return,
                Err(e) => {
                    error!(dst = %dst, field = %dfield, error = %e, "w+c> failed to compute resource field");
                    return;
                }
            }
            match runtime.trigger(resource.as_ref(), &dfield) {
                Ok(()) | Err(FactError::NotReady) => {}
                Err(e) => {
                    error!(dst = %dst, field = %dfield, error = %e, "w+c> failed to trigger resource field");
                }
            }
        })
    }

    /// Computes `field` once, or propagates it to its watchers if it is already valid.
    ///
    /// - already valid: every watcher is notified (a field nobody watches is a no-op);
    /// - pending: `NotReady`, someone else is computing it or it waits on dependencies;
    /// - absent: the resource computes it, exactly once even under concurrent triggers.
    ///   A hard failure is stored as the field's value and returned as `Compute`.
    pub fn trigger(&self, resource: &dyn Resource, field: &str) -> Result<()> {
        if field.is_empty() {
            return Err(FactError::validation(
                "cannot trigger a resource without specifying a field",
            ));
        }
        let rid = resource.id();
        if !resource.fields().iter().any(|f| f.name == field) {
            return Err(FactError::unknown_field(&rid.name, field));
        }
        trace!(resource = %rid, field, "trigger> trigger resource");

        let cache = resource.base().cache();
        let (entry, existed) = cache.load_or_store(field, CacheEntry::pending());
        if existed {
            if entry.valid {
                return self.propagate(rid, field);
            }
            return Err(FactError::NotReady);
        }

        match resource.compute(self, field) {
            Ok(()) => {}
            Err(FactError::NotReady) => {
                cache.discard_pending(field);
                return Err(FactError::NotReady);
            }
            Err(e) => {
                if !cache.is_valid(field) {
                    cache.store(field, CacheEntry::failed(e.clone()));
                }
                return Err(FactError::compute(&rid.name, field, e));
            }
        }

        if cache.is_valid(field) {
            self.propagate(rid, field)
        } else {
            Ok(())
        }
    }

    fn propagate(&self, rid: &ResourceId, field: &str) -> Result<()> {
        match self.inner.observers.trigger(&rid.field_uid(field)) {
            Err(FactError::NotFound(_)) => {
                trace!(resource = %rid, field, "trigger> no watchers");
                Ok(())
            }
            other => other,
        }
    }

    /// Pulls a field: registers its dependencies, computes it once and reads the result.
    ///
    /// Returns `NotReady` if a dependency is still pending elsewhere. The dependency edges
    /// the pull wires are released again unless someone subscribed to the field meanwhile.
    pub fn get_field(&self, resource: &dyn Resource, field: &str) -> Result<Value> {
        let cache = resource.base().cache();
        if cache.is_valid(field) {
            return resource.field(field);
        }
        let pulled = self.pull(resource, field);
        self.inner
            .observers
            .release_unwatched(&resource.id().field_uid(field))?;
        pulled?;
        resource.field(field)
    }

    fn pull(&self, resource: &dyn Resource, field: &str) -> Result<()> {
        match resource.register(self, field) {
            Ok(()) | Err(FactError::NotReady) => {}
            Err(e) => return Err(FactError::compute(&resource.id().name, field, e)),
        }
        match self.trigger(resource, field) {
            Ok(()) | Err(FactError::NotReady) | Err(FactError::Compute { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Releases everything `watcher` subscribed to, cascading through fields that are no
    /// longer watched by anyone.
    pub fn unregister(&self, watcher: &str) -> Result<()> {
        debug!(watcher, "w+u> unregister");
        self.inner.observers.unwatch_all(watcher)
    }

    /// Runs `hook` once, when `watcher` is unregistered.
    pub fn on_unregister<F>(&self, watcher: &str, hook: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.observers.set_unwatch_hook(watcher, Arc::new(hook))
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("provider", &self.inner.provider.name())
            .field("resources", &self.inner.registry.len())
            .field("instances", &self.inner.instances.len())
            .field("observers", &self.inner.observers)
            .finish()
    }
}

impl fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRuntime")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use crate::registry::{FieldInfo, FieldType};
    use crate::resource::ResourceBase;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// `echo(text)`: `raw` runs `echo <text>`, `upper` derives from `raw`.
    #[derive(Debug)]
    struct Echo {
        base: ResourceBase,
        text: String,
        computes: Arc<AtomicUsize>,
    }

    impl Resource for Echo {
        fn base(&self) -> &ResourceBase {
            &self.base
        }

        fn fields(&self) -> Vec<FieldInfo> {
            echo_class(Arc::default()).fields.into_values().collect()
        }

        fn register(&self, runtime: &Runtime, field: &str) -> Result<()> {
            match field {
                "upper" => runtime.watch_and_compute(self, "raw", self, "upper"),
                _ => Ok(()),
            }
        }

        fn compute(&self, runtime: &Runtime, field: &str) -> Result<()> {
            match field {
                "text" => Ok(()),
                "raw" => self.base.compute_field("raw", || {
                    self.computes.fetch_add(1, Ordering::SeqCst);
                    let out = runtime.provider().run_command(&format!("echo {}", self.text))?;
                    Ok(out.stdout.trim_end().into())
                }),
                "upper" => self.base.compute_field("upper", || {
                    let raw = self.base.value("raw")?;
                    Ok(raw.expect_str("raw")?.to_uppercase().into())
                }),
                other => Err(FactError::unknown_field("echo", other)),
            }
        }

        fn validate(&self) -> Result<()> {
            self.base.require(&["text"])
        }
    }

    fn echo_class(computes: Arc<AtomicUsize>) -> ResourceClass {
        ResourceClass::new("echo")
            .field(FieldInfo::new("text", FieldType::String).mandatory())
            .field(FieldInfo::new("raw", FieldType::String))
            .field(FieldInfo::new("upper", FieldType::String).refs(["raw"]))
            .factory(move |_rt, mut args| {
                let id = args.take_id()?;
                let text = args.take_str("text")?.unwrap_or_default();
                let base = ResourceBase::new("echo", id.unwrap_or_else(|| text.clone()));
                if !text.is_empty() {
                    base.cache().store_value("text", text.clone().into());
                }
                Ok(Arc::new(Echo {
                    base,
                    text,
                    computes: computes.clone(),
                }) as ResourceHandle)
            })
    }

    /// `door.state` derives from `gate.open`, which stays not-ready until opened.
    #[derive(Debug)]
    struct Gate {
        base: ResourceBase,
        open: Arc<AtomicBool>,
    }

    impl Resource for Gate {
        fn base(&self) -> &ResourceBase {
            &self.base
        }

        fn fields(&self) -> Vec<FieldInfo> {
            vec![FieldInfo::new("open", FieldType::Bool)]
        }

        fn register(&self, _runtime: &Runtime, _field: &str) -> Result<()> {
            Ok(())
        }

        fn compute(&self, _runtime: &Runtime, field: &str) -> Result<()> {
            self.base.compute_field(field, || {
                if self.open.load(Ordering::SeqCst) {
                    Ok(true.into())
                } else {
                    Err(FactError::NotReady)
                }
            })
        }
    }

    #[derive(Debug)]
    struct Door {
        base: ResourceBase,
    }

    impl Resource for Door {
        fn base(&self) -> &ResourceBase {
            &self.base
        }

        fn fields(&self) -> Vec<FieldInfo> {
            vec![FieldInfo::new("state", FieldType::String)]
        }

        fn register(&self, runtime: &Runtime, field: &str) -> Result<()> {
            let gate = runtime.create_resource("gate", Args::new())?;
            runtime.watch_and_compute(gate.as_ref(), "open", self, field)
        }

        fn compute(&self, runtime: &Runtime, field: &str) -> Result<()> {
            self.base.compute_field(field, || {
                let gate = runtime.get_resource("gate", "")?;
                let open = gate.field("open")?;
                Ok(if open.as_bool() == Some(true) { "open" } else { "closed" }.into())
            })
        }
    }

    fn gate_registry(open: Arc<AtomicBool>) -> Registry {
        let registry = Registry::new();
        registry
            .add(
                ResourceClass::new("gate")
                    .field(FieldInfo::new("open", FieldType::Bool))
                    .factory(move |_rt, _args| {
                        Ok(Arc::new(Gate {
                            base: ResourceBase::new("gate", ""),
                            open: open.clone(),
                        }) as ResourceHandle)
                    }),
            )
            .unwrap();
        registry
            .add(
                ResourceClass::new("door")
                    .field(FieldInfo::new("state", FieldType::String).refs(["gate.open"]))
                    .factory(|_rt, _args| {
                        Ok(Arc::new(Door {
                            base: ResourceBase::new("door", ""),
                        }) as ResourceHandle)
                    }),
            )
            .unwrap();
        registry
    }

    fn echo_runtime() -> (Runtime, Arc<MockProvider>, Arc<AtomicUsize>) {
        crate::tracing::try_setup_tracing();
        let computes = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new();
        registry.add(echo_class(computes.clone())).unwrap();
        let mock = Arc::new(MockProvider::new());
        mock.expect_command("echo hello").return_ok("hello\n");
        let runtime = Runtime::builder()
            .registry(registry)
            .provider(mock.clone())
            .build()
            .unwrap();
        (runtime, mock, computes)
    }

    fn collect() -> (Arc<Mutex<Vec<Result<Value>>>>, impl Fn(Result<Value>) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |v| sink.lock().unwrap().push(v))
    }

    #[test]
    fn builder_requires_registry_and_provider() {
        let err = Runtime::builder().build().unwrap_err();
        assert!(err.is_validation());
        let err = Runtime::builder().registry(Registry::new()).build().unwrap_err();
        assert!(err.is_validation());
        let mock: Arc<dyn Provider> = Arc::new(MockProvider::new());
        assert!(Runtime::new(Registry::new(), mock).is_ok());
    }

    #[test]
    fn create_resource_shares_instances() {
        let (rt, _, _) = echo_runtime();
        let a = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();
        let b = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(rt.instance_count(), 1);
        assert!(Arc::ptr_eq(&a, &rt.get_resource("echo", "hello").unwrap()));
    }

    #[test]
    fn create_resource_validates_new_instances() {
        let (rt, _, _) = echo_runtime();
        let err = rt.create_resource("echo", Args::new()).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(rt.instance_count(), 0);

        let err = rt.create_resource("nope", Args::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn create_resource_from_pairs_rejects_odd_arity() {
        let (rt, _, _) = echo_runtime();
        let err = rt
            .create_resource_from_pairs("echo", vec!["text".into()])
            .unwrap_err();
        assert!(err.is_validation());
        let res = rt
            .create_resource_from_pairs("echo", vec!["text".into(), "hello".into()])
            .unwrap();
        assert_eq!(res.id().id, "hello");
    }

    #[test]
    fn create_resource_with_forced_id() {
        let (rt, _, _) = echo_runtime();
        let res = rt
            .create_resource_with_id("echo", "custom", Args::new().with("text", "hello"))
            .unwrap();
        assert_eq!(res.id().id, "custom");
        assert!(rt.get_resource("echo", "custom").is_ok());
    }

    #[test]
    fn static_resource_rejects_arguments() {
        let registry = Registry::new();
        registry
            .add(ResourceClass::new("motd").field(FieldInfo::new("text", FieldType::String).constant("hi")))
            .unwrap();
        let rt = Runtime::new(registry, Arc::new(MockProvider::new())).unwrap();

        let err = rt.create_resource("motd", Args::new().with("x", 1)).unwrap_err();
        assert!(err.is_validation());

        let motd = rt.create_resource("motd", Args::new()).unwrap();
        assert_eq!(motd.field("text").unwrap(), Value::from("hi"));
        assert!(Arc::ptr_eq(&motd, &rt.create_resource("motd", Args::new()).unwrap()));
    }

    #[test]
    fn implicit_parent_is_created_as_static_resource() {
        let registry = Registry::new();
        registry
            .add(ResourceClass::new("sshd.config").field(FieldInfo::new("params", FieldType::Any)))
            .unwrap();
        let rt = Runtime::new(registry, Arc::new(MockProvider::new())).unwrap();

        let sshd = rt.create_resource("sshd", Args::new()).unwrap();
        let config = sshd.field("config").unwrap();
        assert_eq!(config.as_resource().map(|r| r.name.as_str()), Some("sshd.config"));
        assert!(!rt.registry().class("sshd").unwrap().private);
    }

    #[test]
    fn watch_and_update_delivers_computed_value() {
        let (rt, mock, _) = echo_runtime();
        let echo = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();
        let (seen, sink) = collect();

        rt.watch_and_update(echo.as_ref(), "upper", "q1", sink).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_ref().unwrap(), &Value::from("HELLO"));
        assert_eq!(mock.command_calls("echo hello"), 1);
        mock.verify();
    }

    #[test]
    fn watch_and_update_rejects_unknown_field() {
        let (rt, _, _) = echo_runtime();
        let echo = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();
        let err = rt
            .watch_and_update(echo.as_ref(), "nope", "q1", |_| {})
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(rt.observers().is_empty());
    }

    #[test]
    fn second_watcher_gets_cached_value_without_recompute() {
        let (rt, mock, computes) = echo_runtime();
        let echo = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();
        rt.watch_and_update(echo.as_ref(), "raw", "q1", |_| {}).unwrap();

        let (seen, sink) = collect();
        rt.watch_and_update(echo.as_ref(), "raw", "q2", sink).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(computes.load(Ordering::SeqCst), 1);
        assert_eq!(mock.command_calls("echo hello"), 1);
    }

    #[test]
    fn rewatch_does_not_deliver_twice() {
        let (rt, _, _) = echo_runtime();
        let echo = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();
        let (seen, sink) = collect();
        rt.watch_and_update(echo.as_ref(), "raw", "q1", sink).unwrap();
        let (again, sink) = collect();
        rt.watch_and_update(echo.as_ref(), "raw", "q1", sink).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(again.lock().unwrap().is_empty());
    }

    #[test]
    fn provider_failure_becomes_field_error() {
        let (rt, mock, _) = echo_runtime();
        mock.expect_command("echo boom")
            .return_err(crate::ProviderError::CommandNotFound("echo".into()));
        let echo = rt.create_resource("echo", Args::new().with("text", "boom")).unwrap();
        let (seen, sink) = collect();
        rt.watch_and_update(echo.as_ref(), "raw", "q1", sink).unwrap();

        let seen = seen.lock().unwrap();
        assert!(matches!(seen[0], Err(FactError::Provider(_))));
        // the sibling field is unaffected
        assert_eq!(echo.field("text").unwrap(), Value::from("boom"));
    }

    #[test]
    fn not_ready_field_is_pushed_when_dependency_arrives() {
        let open = Arc::new(AtomicBool::new(false));
        let rt = Runtime::new(gate_registry(open.clone()), Arc::new(MockProvider::new())).unwrap();
        let door = rt.create_resource("door", Args::new()).unwrap();
        let (seen, sink) = collect();

        rt.watch_and_update(door.as_ref(), "state", "q1", sink).unwrap();
        assert!(seen.lock().unwrap().is_empty());
        assert!(door.field("state").unwrap_err().is_not_ready());

        open.store(true, Ordering::SeqCst);
        let gate = rt.get_resource("gate", "").unwrap();
        rt.trigger(gate.as_ref(), "open").unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_ref().unwrap(), &Value::from("open"));
    }

    #[test]
    fn trigger_on_pending_field_is_not_ready() {
        let open = Arc::new(AtomicBool::new(false));
        let rt = Runtime::new(gate_registry(open), Arc::new(MockProvider::new())).unwrap();
        let gate = rt.create_resource("gate", Args::new()).unwrap();
        gate.base().cache().load_or_store("open", CacheEntry::pending());
        assert!(rt.trigger(gate.as_ref(), "open").unwrap_err().is_not_ready());
    }

    #[test]
    fn trigger_rejects_empty_and_unknown_fields() {
        let (rt, _, _) = echo_runtime();
        let echo = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();
        assert!(rt.trigger(echo.as_ref(), "").unwrap_err().is_validation());
        assert!(rt.trigger(echo.as_ref(), "nope").unwrap_err().is_not_found());
    }

    #[test]
    fn concurrent_trigger_computes_exactly_once() {
        let (rt, mock, computes) = echo_runtime();
        let echo = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rt = rt.clone();
                let echo = echo.clone();
                std::thread::spawn(move || {
                    let _ = rt.trigger(echo.as_ref(), "raw");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(computes.load(Ordering::SeqCst), 1);
        assert_eq!(mock.command_calls("echo hello"), 1);
        assert_eq!(echo.field("raw").unwrap(), Value::from("hello"));
    }

    #[test]
    fn get_field_pulls_dependencies() {
        let (rt, _, _) = echo_runtime();
        let echo = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();
        assert_eq!(rt.get_field(echo.as_ref(), "upper").unwrap(), Value::from("HELLO"));
    }

    #[test]
    fn get_field_leaves_no_edges_behind() {
        let (rt, mock, _) = echo_runtime();
        let echo = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();

        assert_eq!(rt.get_field(echo.as_ref(), "upper").unwrap(), Value::from("HELLO"));
        assert!(rt.observers().is_empty());
        assert_eq!(rt.get_field(echo.as_ref(), "upper").unwrap(), Value::from("HELLO"));
        assert_eq!(mock.command_calls("echo hello"), 1);
    }

    #[test]
    fn get_field_keeps_edges_other_watchers_need() {
        let (rt, _, _) = echo_runtime();
        let echo = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();
        rt.watch_and_update(echo.as_ref(), "raw", "q", |_| {}).unwrap();

        assert_eq!(rt.get_field(echo.as_ref(), "upper").unwrap(), Value::from("HELLO"));
        let raw = echo.id().field_uid("raw");
        assert_eq!(rt.observers().watchers(&raw), vec!["q"]);
        assert_eq!(rt.observers().watcher_count(), 1);
    }

    #[test]
    fn unregister_releases_dependency_edges() {
        let (rt, _, _) = echo_runtime();
        let echo = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();
        let hook_runs = Arc::new(AtomicUsize::new(0));
        let runs = hook_runs.clone();
        rt.on_unregister("q1", move || {
            runs.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        rt.watch_and_update(echo.as_ref(), "upper", "q1", |_| {}).unwrap();
        let raw = echo.id().field_uid("raw");
        assert_eq!(rt.observers().watchers(&raw), vec![echo.id().field_uid("upper")]);

        rt.unregister("q1").unwrap();
        assert!(rt.observers().is_empty());
        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
        // cached values survive for the runtime's lifetime
        assert_eq!(echo.field("upper").unwrap(), Value::from("HELLO"));
    }

    #[test]
    fn callbacks_do_not_keep_runtime_alive() {
        let (rt, _, _) = echo_runtime();
        let echo = rt.create_resource("echo", Args::new().with("text", "hello")).unwrap();
        rt.watch_and_update(echo.as_ref(), "upper", "q1", |_| {}).unwrap();
        let weak = rt.downgrade();
        drop(rt);
        assert!(weak.upgrade().is_none());
    }
}
