//! The actor system: registry, worker pool and module table

use crate::actor::ActorProcess;
use crate::actor_ref::ActorRef;
use crate::address::Address;
use crate::builder::{ActorBuilder, Init};
use crate::config::SystemConfig;
use crate::envelope::Envelope;
use crate::error::{ActorError, Result};
use crate::image::ActorImage;
use crate::mailbox::{Mailbox, ResponseCollector};
use crate::module::{evaluate_module, DirectoryBroker, ModuleBroker};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strand_kernel::{Complete, CompleteRec};
use tokio::runtime::{Handle, Runtime};
use tracing::Instrument;

pub(crate) type Registry = Arc<RwLock<BTreeMap<Address, ActorRef>>>;

struct Shared {
    config: SystemConfig,
    handle: Handle,
    /// Present when the system owns its worker pool
    runtime: Mutex<Option<Runtime>>,
    registry: Registry,
    modules: RwLock<BTreeMap<String, CompleteRec>>,
    broker: RwLock<Option<Arc<dyn ModuleBroker>>>,
    next_reply: AtomicU64,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

/// A registry of live actors sharing one worker pool
///
/// Cloning gives another handle to the same system. The owned runtime (if
/// any) is shut down when the last handle is dropped.
#[derive(Clone)]
pub struct ActorSystem {
    shared: Arc<Shared>,
}

static GLOBAL: OnceCell<ActorSystem> = OnceCell::new();

impl ActorSystem {
    /// Create a system with its own multi-thread runtime
    pub fn new(config: SystemConfig) -> Result<Self> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder
            .enable_all()
            .thread_name(format!("{}-worker", config.name));
        if config.worker_threads > 0 {
            builder.worker_threads(config.worker_threads);
        }
        let runtime = builder
            .build()
            .map_err(|err| ActorError::Runtime(err.to_string()))?;
        let handle = runtime.handle().clone();
        Ok(Self::assemble(config, handle, Some(runtime)))
    }

    /// Create a system scheduling its actors on an existing runtime
    pub fn with_handle(config: SystemConfig, handle: Handle) -> Self {
        Self::assemble(config, handle, None)
    }

    fn assemble(config: SystemConfig, handle: Handle, runtime: Option<Runtime>) -> Self {
        let broker = config
            .module_dir()
            .map(|dir| Arc::new(DirectoryBroker::new(dir)) as Arc<dyn ModuleBroker>);
        tracing::debug!(name = %config.name, owned = runtime.is_some(), "created actor system");
        Self {
            shared: Arc::new(Shared {
                config,
                handle,
                runtime: Mutex::new(runtime),
                registry: Arc::new(RwLock::new(BTreeMap::new())),
                modules: RwLock::new(BTreeMap::new()),
                broker: RwLock::new(broker),
                next_reply: AtomicU64::new(1),
            }),
        }
    }

    /// The process-wide default system, created on first use
    pub fn global() -> Result<&'static ActorSystem> {
        GLOBAL.get_or_try_init(|| ActorSystem::new(SystemConfig::default()))
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &SystemConfig {
        &self.shared.config
    }

    pub fn handle(&self) -> &Handle {
        &self.shared.handle
    }

    pub fn builder(&self) -> ActorBuilder<Init> {
        ActorBuilder::new(self.clone())
    }

    // Registry

    /// The actor registered at `address`, if any
    pub fn actor_at(&self, address: &Address) -> Option<ActorRef> {
        self.shared.registry.read().get(address).cloned()
    }

    /// Registered addresses in order
    pub fn addresses(&self) -> Vec<Address> {
        self.shared.registry.read().keys().cloned().collect()
    }

    pub fn actor_count(&self) -> usize {
        self.shared.registry.read().len()
    }

    /// Register `image` at `address` and start its task
    ///
    /// The address is claimed before the actor initializes. An actor whose
    /// init fails removes itself from the registry, after which the
    /// address can be claimed again.
    pub(crate) fn spawn_image(&self, image: ActorImage, address: Address) -> Result<ActorRef> {
        let (actor, mailbox) = self.mailbox(address.clone());
        {
            let mut registry = self.shared.registry.write();
            if registry.contains_key(&address) {
                return Err(ActorError::AddressInUse(address.to_string()));
            }
            registry.insert(address.clone(), actor.clone());
        }

        let trace = image.cfg().trace || self.shared.config.trace;
        let process = ActorProcess::new(
            actor.clone(),
            image,
            mailbox,
            Arc::clone(&self.shared.registry),
            trace,
        );
        self.shared
            .handle
            .spawn(process.run().instrument(self.actor_span(&address)));

        tracing::info!(actor = %address, "spawned actor");
        Ok(actor)
    }

    /// Stop the actor at `address`; false if nothing is registered there
    pub fn stop(&self, address: &Address) -> bool {
        let removed = self.shared.registry.write().remove(address);
        match removed {
            Some(actor) => {
                // Already stopped on its own
                let _ = actor.send(Envelope::Stop);
                tracing::debug!(actor = %address, "stopping actor");
                true
            }
            None => false,
        }
    }

    /// Stop every registered actor
    pub fn shutdown(&self) {
        let actors = std::mem::take(&mut *self.shared.registry.write());
        tracing::info!(actors = actors.len(), "shutting down actor system");
        for actor in actors.values() {
            let _ = actor.send(Envelope::Stop);
        }
    }

    // Factories

    pub fn mailbox(&self, address: Address) -> (ActorRef, Mailbox) {
        Mailbox::new(address)
    }

    /// The span every log line of one actor is recorded under
    pub fn actor_span(&self, address: &Address) -> tracing::Span {
        tracing::info_span!("actor", system = %self.shared.config.name, address = %address)
    }

    // Messaging from outside the system

    pub fn tell(&self, target: &ActorRef, message: Complete) -> Result<()> {
        target.tell(message)
    }

    /// Ask `target`, collecting its responses with the configured timeout
    pub fn ask(&self, target: &ActorRef, message: Complete) -> Result<ResponseCollector> {
        let id = self.shared.next_reply.fetch_add(1, Ordering::Relaxed);
        let address = Address::create(&format!("$ask/{}", id))?;
        let (reply_to, mailbox) = self.mailbox(address);
        let (request, envelope) = Envelope::ask(reply_to.clone(), message);
        target.send(envelope)?;
        Ok(ResponseCollector::new(
            reply_to,
            mailbox,
            request,
            self.shared.config.collect_timeout(),
            self.shared.handle.clone(),
        ))
    }

    // Modules

    pub fn set_broker(&self, broker: Arc<dyn ModuleBroker>) {
        *self.shared.broker.write() = Some(broker);
    }

    pub fn add_module(&self, path: impl Into<String>, module: CompleteRec) {
        self.shared.modules.write().insert(path.into(), module);
    }

    /// Evaluate `source` and add it to the module table
    pub fn load_module(&self, path: &str, source: &str) -> Result<()> {
        let module = evaluate_module(path, source)?;
        self.add_module(path, module);
        Ok(())
    }

    /// Resolve a module from the table, falling back to the broker
    ///
    /// Modules loaded through the broker are cached in the table.
    pub fn module(&self, path: &str) -> Result<CompleteRec> {
        if let Some(module) = self.shared.modules.read().get(path) {
            return Ok(module.clone());
        }

        let broker = self.shared.broker.read().clone();
        let source = broker
            .and_then(|broker| broker.source(path))
            .ok_or_else(|| ActorError::ModuleNotFound(path.to_string()))?;

        let module = evaluate_module(path, &source)?;
        tracing::debug!(module = path, "loaded module from broker");
        self.add_module(path, module.clone());
        Ok(module)
    }

    /// Paths in the module table
    pub fn module_paths(&self) -> Vec<String> {
        self.shared.modules.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("name", &self.shared.config.name)
            .field("actors", &self.actor_count())
            .finish()
    }
}
