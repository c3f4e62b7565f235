//! Logging for the coordinator and the process embedding it.
//!
//! [`Logger`] is the capability a [`Guillotine`](crate::Guillotine) reports progress to. It
//! wraps a [`Dispatch`], so any `tracing` subscriber can receive the coordinator's events,
//! and defaults to discarding them.
//!
//! [`install`] sets up the global subscriber used by the demo binary:
//!
//! ```no_run
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     guillotine::logger::install("debug")?;
//!     Ok(())
//! }
//! ```

use std::{future::Future, result};

use thiserror::Error;
use tracing::{
    Dispatch, Instrument, dispatcher,
    instrument::WithSubscriber,
    subscriber::{NoSubscriber, SetGlobalDefaultError, set_global_default},
};
use tracing_subscriber::{EnvFilter, Registry, fmt::layer, layer::SubscriberExt};

#[derive(Error, Debug)]
pub enum Error {
    #[error("setup tracing failed")]
    SetGlobalDefault(#[source] SetGlobalDefaultError),
}

pub type Result<T, E = Error> = result::Result<T, E>;

/// Destination of the events emitted by a [`Guillotine`](crate::Guillotine).
#[derive(Debug, Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    pub const fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// A logger that drops every event.
    ///
    /// The subscriber is registered with `tracing`, so callsites stay enabled for loggers
    /// forwarding to other subscribers.
    #[must_use]
    pub fn discard() -> Self {
        Self::new(Dispatch::new(NoSubscriber::default()))
    }

    /// A logger that forwards to the caller's current default subscriber.
    #[must_use]
    pub fn current() -> Self {
        Self::new(dispatcher::get_default(Dispatch::clone))
    }

    /// Runs `f` with this logger as the default subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, f)
    }

    /// Binds `future` to this logger and to the caller's current span.
    pub(crate) fn attach<F: Future>(&self, future: F) -> impl Future<Output = F::Output> + use<F> {
        future.in_current_span().with_subscriber(self.dispatch.clone())
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::discard()
    }
}

/// Installs a global tracing subscriber with the given log level.
///
/// The level applies to the `guillotine` target; file names and line numbers are included
/// in every record.
///
/// # Errors
///
/// Returns an [`Error::SetGlobalDefault`] if a global subscriber is already installed.
pub fn install<L: AsRef<str>>(log_level: L) -> Result<()> {
    let env_filter = EnvFilter::new(format!("guillotine={}", log_level.as_ref()));
    let format_layer = layer().with_file(true).with_line_number(true);

    set_global_default(Registry::default().with(env_filter).with(format_layer))
        .map_err(Error::SetGlobalDefault)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use tracing::info;
    use tracing_test::traced_test;

    use super::*;

    #[test]
    #[traced_test]
    fn test_discard_drops_events() {
        Logger::discard().in_scope(|| info!("Dropped on the floor."));

        assert!(!logs_contain("Dropped on the floor."));
    }

    #[test]
    #[traced_test]
    fn test_current_forwards_events() {
        Logger::current().in_scope(|| info!("Forwarded to the subscriber."));

        assert!(logs_contain("Forwarded to the subscriber."));
    }

    #[test]
    #[traced_test]
    fn test_default_is_discard() {
        Logger::default().in_scope(|| info!("Nobody is listening."));

        assert!(!logs_contain("Nobody is listening."));
    }

    #[test]
    #[traced_test]
    fn test_discard_keeps_callsite_enabled() {
        fn shared_callsite(logger: &Logger, label: &str) {
            logger.in_scope(|| info!(label, "Shared callsite."));
        }

        shared_callsite(&Logger::discard(), "discarded");
        shared_callsite(&Logger::current(), "forwarded");

        assert!(!logs_contain("discarded"));
        assert!(logs_contain("forwarded"));
    }
}
