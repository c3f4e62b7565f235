//! The shutdown coordinator.
//!
//! A [`Guillotine`] collects finalizers while the process runs, and runs all of them, once,
//! when shutdown is triggered:
//!
//! - [`Guillotine::trigger`] starts execution in a background task and returns immediately.
//!   Only the first call (across every clone and every task) starts it.
//! - [`Guillotine::wait`] resolves once every finalizer ran, with the errors they produced.
//!   Any number of tasks may wait, before or after the trigger, and they all receive the
//!   same slice.
//! - [`Guillotine::execute`] does both.
//!
//! Finalizers run sequentially, from the last registered to the first, so components can
//! rely on whatever was registered before them while they shut down.

use std::{
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    callback::BoxCallback,
    config::Config,
    finalizer::{BoxError, Close, Error, Finalizer, Registry},
    logger::Logger,
};

struct Inner {
    id: Uuid,
    registry: Mutex<Registry>,
    logger: Logger,
    cancel: CancellationToken,
    triggered: AtomicBool,
    done: watch::Sender<Option<Arc<[Error]>>>,
}

impl Inner {
    async fn execute(self: Arc<Self>) {
        self.cancel.cancel();

        let finalizers = self.registry.lock().seal();
        info!(id = %self.id, count = finalizers.len(), "Running finalizers...");

        let mut errors = Vec::new();
        for (index, finalizer) in finalizers.into_iter().enumerate().rev() {
            debug!(id = %self.id, index, "Running finalizer...");

            if let Some(error) = finalizer.run().await {
                error!(id = %self.id, index, %error, "A finalizer failed.");
                errors.push(error);
            }
        }

        info!(id = %self.id, failures = errors.len(), "Finalizers completed.");
        self.done.send_replace(Some(errors.into()));
    }
}

/// Shuts down a system made of multiple components.
///
/// Cloning is cheap, and every clone drives the same shutdown.
#[derive(Clone)]
pub struct Guillotine {
    inner: Arc<Inner>,
}

impl Guillotine {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let (done, _) = watch::channel(None);

        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                registry: Mutex::new(Registry::default()),
                logger: config.logger,
                cancel: CancellationToken::new(),
                triggered: AtomicBool::new(false),
                done,
            }),
        }
    }

    /// Unique identifier, attached to every log record of this instance.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Registers a finalizer.
    ///
    /// Registration must happen before execution starts: once the finalizers are running,
    /// new ones are dropped and a warning is logged.
    pub fn add(&self, finalizer: Finalizer) {
        let pushed = self.inner.registry.lock().push(finalizer);

        self.inner.logger.in_scope(|| match pushed {
            Ok(count) => debug!(id = %self.inner.id, count, "Finalizer registered."),
            Err(_) => warn!(id = %self.inner.id, "Execution already started, ignoring finalizer."),
        });
    }

    /// Registers a fallible function.
    pub fn add_finalizer<F, E>(&self, finalizer: F, callbacks: Vec<BoxCallback>)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        self.add(Finalizer::from_fn(finalizer, callbacks));
    }

    /// Registers a fallible async function.
    pub fn add_async_finalizer<F, Fut, E>(&self, finalizer: F, callbacks: Vec<BoxCallback>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.add(Finalizer::from_async_fn(finalizer, callbacks));
    }

    /// Registers a function that cannot fail.
    pub fn add_action<F>(&self, action: F, callbacks: Vec<BoxCallback>)
    where
        F: FnOnce() + Send + 'static,
    {
        self.add(Finalizer::from_action(action, callbacks));
    }

    /// Registers a resource to close.
    pub fn add_closeable<C: Close>(&self, resource: C, callbacks: Vec<BoxCallback>) {
        self.add(Finalizer::from_closeable(resource, callbacks));
    }

    /// Starts running the finalizers in a background task.
    ///
    /// Returns `true` if this call started the execution, `false` if it was already started.
    /// Never waits for the finalizers, see [`Guillotine::wait`].
    ///
    /// Outside of a Tokio runtime nothing is started and `false` is returned, so a later
    /// call from within a runtime can still trigger the execution.
    pub fn trigger(&self) -> bool {
        let Ok(runtime) = Handle::try_current() else {
            self.inner.logger.in_scope(|| {
                error!(id = %self.inner.id, "No Tokio runtime, execution not triggered.");
            });
            return false;
        };

        if self
            .inner
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let inner = Arc::clone(&self.inner);
        runtime.spawn(self.inner.logger.attach(inner.execute()));

        true
    }

    /// Waits for the finalizers to complete and returns the errors they produced.
    ///
    /// An empty slice means every finalizer succeeded.
    pub async fn wait(&self) -> Arc<[Error]> {
        let mut done = self.inner.done.subscribe();

        done.wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|errors| (*errors).clone())
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Triggers the execution and waits for it to complete.
    pub async fn execute(&self) -> Arc<[Error]> {
        self.trigger();
        self.wait().await
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.done.borrow().is_some()
    }

    /// Returns a token cancelled as soon as execution starts.
    ///
    /// Cancelling the returned token does not trigger the execution.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.child_token()
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    pub(crate) fn cancelled(&self) -> impl Future<Output = ()> + Send + '_ {
        self.inner.cancel.cancelled()
    }
}

impl Default for Guillotine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl fmt::Debug for Guillotine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guillotine")
            .field("id", &self.inner.id)
            .field("triggered", &self.is_triggered())
            .field("done", &self.is_done())
            .finish_non_exhaustive()
    }
}
