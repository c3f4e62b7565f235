//! Finalizers and the registry that holds them until shutdown.
//!
//! A [`Finalizer`] is a lazily-run future that resolves to the (possibly transformed) error
//! of a cleanup action. Nothing runs until the execution engine polls it, so registering a
//! finalizer never performs any work.

use std::{any::Any, error, future::Future, io, panic::AssertUnwindSafe, result};

use futures::{FutureExt, future::BoxFuture};
use thiserror::Error;
use tokio::{fs::File, io::AsyncWriteExt, net::TcpStream};

use crate::callback::{self, BoxCallback};

/// A type-erased error produced by a finalizer or a resource.
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

/// A failure collected while running finalizers.
#[derive(Error, Debug)]
pub enum Error {
    /// An error synthesized by a callback.
    #[error("{0}")]
    Message(String),
    /// An error wrapped with additional context.
    #[error("{message}: {source}")]
    WithMessage {
        message: String,
        #[source]
        source: Box<Self>,
    },
    /// An error returned by the finalizer itself.
    #[error(transparent)]
    Failed(BoxError),
    /// The finalizer or one of its callbacks panicked.
    #[error("finalizer panicked: {0}")]
    Panicked(String),
}

impl Error {
    pub fn failed<E: Into<BoxError>>(error: E) -> Self {
        Self::Failed(error.into())
    }

    fn panicked(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_owned());

        Self::Panicked(message)
    }

    #[must_use]
    pub fn with_message<M: Into<String>>(self, message: M) -> Self {
        Self::WithMessage {
            message: message.into(),
            source: Box::new(self),
        }
    }
}

/// A resource that can be closed during shutdown.
pub trait Close: Send + 'static {
    type Error: Into<BoxError>;

    /// Consumes and closes the resource.
    fn close(self) -> impl Future<Output = result::Result<(), Self::Error>> + Send;
}

impl Close for File {
    type Error = io::Error;

    async fn close(mut self) -> io::Result<()> {
        self.flush().await
    }
}

impl Close for TcpStream {
    type Error = io::Error;

    async fn close(mut self) -> io::Result<()> {
        self.shutdown().await
    }
}

/// A cleanup action composed with its callback chain.
pub struct Finalizer {
    future: BoxFuture<'static, Option<Error>>,
}

impl Finalizer {
    fn wrap<Fut>(future: Fut, callbacks: Vec<BoxCallback>) -> Self
    where
        Fut: Future<Output = Option<Error>> + Send + 'static,
    {
        Self {
            future: Box::pin(async move { callback::run(future.await, &callbacks) }),
        }
    }

    pub fn from_fn<F, E>(finalizer: F, callbacks: Vec<BoxCallback>) -> Self
    where
        F: FnOnce() -> result::Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::wrap(async move { finalizer().err().map(Error::failed) }, callbacks)
    }

    pub fn from_async_fn<F, Fut, E>(finalizer: F, callbacks: Vec<BoxCallback>) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = result::Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::wrap(
            async move { finalizer().await.err().map(Error::failed) },
            callbacks,
        )
    }

    pub fn from_action<F>(action: F, callbacks: Vec<BoxCallback>) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::wrap(
            async move {
                action();
                None
            },
            callbacks,
        )
    }

    pub fn from_closeable<C: Close>(resource: C, callbacks: Vec<BoxCallback>) -> Self {
        Self::wrap(
            async move { resource.close().await.err().map(Error::failed) },
            callbacks,
        )
    }

    /// Runs the action and its callbacks, returning the resulting error.
    ///
    /// A panic is caught and reported as [`Error::Panicked`].
    pub async fn run(self) -> Option<Error> {
        AssertUnwindSafe(self.future)
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Some(Error::panicked(&*payload)))
    }
}

/// Ordered, append-only collection of finalizers.
///
/// Once sealed, the registry hands its entries over to the execution engine and rejects
/// any further registration.
#[derive(Default)]
pub(crate) struct Registry {
    finalizers: Vec<Finalizer>,
    sealed: bool,
}

impl Registry {
    /// Appends a finalizer and returns the number of registered entries.
    ///
    /// A sealed registry hands the finalizer back instead.
    pub(crate) fn push(&mut self, finalizer: Finalizer) -> result::Result<usize, Finalizer> {
        if self.sealed {
            return Err(finalizer);
        }

        self.finalizers.push(finalizer);
        Ok(self.finalizers.len())
    }

    /// Seals the registry and takes its entries, in registration order.
    pub(crate) fn seal(&mut self) -> Vec<Finalizer> {
        self.sealed = true;
        std::mem::take(&mut self.finalizers)
    }
}
