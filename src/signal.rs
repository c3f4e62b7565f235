//! Triggers a [`Guillotine`] when the process receives a signal.
//!
//! ## Platform-Specific Behavior
//!
//! - **Unix:**
//!   Every [`Signal`] maps to its POSIX counterpart (`SIGINT`, `SIGTERM`, ...).
//!
//! - **Windows:**
//!   [`Signal::Interrupt`] maps to CTRL_C, [`Signal::Quit`] to CTRL_BREAK, [`Signal::Hangup`]
//!   to CTRL_CLOSE and [`Signal::Terminate`] to CTRL_SHUTDOWN. User signals are not supported.
//!
//! ## Usage
//!
//! ```no_run
//! use guillotine::Guillotine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let guillotine = Guillotine::default();
//!     guillotine.listen_for_termination()?;
//!
//!     // Register finalizers, run the application...
//!
//!     let errors = guillotine.wait().await;
//!     println!("Shut down with {} failure(s).", errors.len());
//!     Ok(())
//! }
//! ```

use std::{fmt, io, result};

use futures::future::select_all;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::guillotine::Guillotine;

#[derive(Error, Debug)]
pub enum Error {
    #[error("register listener for {1} failed")]
    RegisterSignal(#[source] io::Error, Signal),
}

pub type Result<T, E = Error> = result::Result<T, E>;

/// A process signal that can trigger a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Interrupt,
    Terminate,
    Hangup,
    Quit,
    User1,
    User2,
}

impl Signal {
    /// The signals a process receives when asked to stop.
    pub const TERMINATION: [Self; 2] = [Self::Interrupt, Self::Terminate];
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Hangup => "SIGHUP",
            Self::Quit => "SIGQUIT",
            Self::User1 => "SIGUSR1",
            Self::User2 => "SIGUSR2",
        })
    }
}

#[cfg(unix)]
mod platform {
    use std::io;

    use tokio::signal::unix::{self, SignalKind};

    use super::Signal;

    pub struct Receiver(unix::Signal);

    pub fn register(signal: Signal) -> io::Result<Receiver> {
        let kind = match signal {
            Signal::Interrupt => SignalKind::interrupt(),
            Signal::Terminate => SignalKind::terminate(),
            Signal::Hangup => SignalKind::hangup(),
            Signal::Quit => SignalKind::quit(),
            Signal::User1 => SignalKind::user_defined1(),
            Signal::User2 => SignalKind::user_defined2(),
        };

        unix::signal(kind).map(Receiver)
    }

    impl Receiver {
        pub async fn recv(&mut self) -> Option<()> {
            self.0.recv().await
        }
    }
}

#[cfg(windows)]
mod platform {
    use std::io;

    use tokio::signal::windows;

    use super::Signal;

    pub enum Receiver {
        CtrlC(windows::CtrlC),
        CtrlBreak(windows::CtrlBreak),
        CtrlClose(windows::CtrlClose),
        CtrlShutdown(windows::CtrlShutdown),
    }

    pub fn register(signal: Signal) -> io::Result<Receiver> {
        match signal {
            Signal::Interrupt => windows::ctrl_c().map(Receiver::CtrlC),
            Signal::Quit => windows::ctrl_break().map(Receiver::CtrlBreak),
            Signal::Hangup => windows::ctrl_close().map(Receiver::CtrlClose),
            Signal::Terminate => windows::ctrl_shutdown().map(Receiver::CtrlShutdown),
            Signal::User1 | Signal::User2 => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{signal} is not available on Windows"),
            )),
        }
    }

    impl Receiver {
        pub async fn recv(&mut self) -> Option<()> {
            match self {
                Self::CtrlC(receiver) => receiver.recv().await,
                Self::CtrlBreak(receiver) => receiver.recv().await,
                Self::CtrlClose(receiver) => receiver.recv().await,
                Self::CtrlShutdown(receiver) => receiver.recv().await,
            }
        }
    }
}

/// Resolves with the first signal received by any of `receivers`.
///
/// A receiver whose stream ended never resolves.
async fn first_signal(receivers: &mut [(Signal, platform::Receiver)]) -> Signal {
    let pending = receivers.iter_mut().map(|(signal, receiver)| {
        Box::pin(async move {
            if receiver.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
            *signal
        })
    });

    select_all(pending).await.0
}

impl Guillotine {
    /// Triggers the execution when the process receives one of `signals`.
    ///
    /// Handlers are registered before this returns, then a background task waits for the
    /// first signal. The task exits without triggering if the execution is started by any
    /// other means first. An empty set of signals stands for [`Signal::TERMINATION`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error::RegisterSignal`] if a signal handler cannot be registered.
    ///
    /// # Panics
    ///
    /// Panics if called from outside of a Tokio runtime.
    pub fn listen_for_signals<I>(&self, signals: I) -> Result<JoinHandle<()>>
    where
        I: IntoIterator<Item = Signal>,
    {
        let mut signals = signals.into_iter().collect::<Vec<_>>();
        if signals.is_empty() {
            signals.extend(Signal::TERMINATION);
        }

        let mut receivers = signals
            .into_iter()
            .map(|signal| {
                platform::register(signal)
                    .map(|receiver| (signal, receiver))
                    .map_err(|error| Error::RegisterSignal(error, signal))
            })
            .collect::<Result<Vec<_>>>()?;

        let guillotine = self.clone();
        let listener = async move {
            debug!(id = %guillotine.id(), "Listening for execution signals...");

            tokio::select! {
                biased;
                () = guillotine.cancelled() => {
                    debug!(id = %guillotine.id(), "Execution started elsewhere, listener stopped.");
                }
                signal = first_signal(&mut receivers) => {
                    info!(id = %guillotine.id(), %signal, "Received execution signal.");
                    guillotine.trigger();
                }
            }
        };

        Ok(tokio::spawn(self.logger().attach(listener)))
    }

    /// Triggers the execution on [`Signal::TERMINATION`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error::RegisterSignal`] if a signal handler cannot be registered.
    pub fn listen_for_termination(&self) -> Result<JoinHandle<()>> {
        self.listen_for_signals(Signal::TERMINATION)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use tokio::time::timeout;
    use tracing_test::traced_test;

    use super::*;
    use crate::{config::Config, logger::Logger};

    fn counted(runs: &Arc<AtomicUsize>) -> Guillotine {
        let guillotine = Guillotine::new(Config::default().with_logger(Logger::current()));
        let counter = Arc::clone(runs);
        guillotine.add_action(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            vec![],
        );
        guillotine
    }

    #[test]
    fn test_signal_display() {
        assert_eq!(Signal::Interrupt.to_string(), "SIGINT");
        assert_eq!(Signal::Terminate.to_string(), "SIGTERM");
        assert_eq!(Signal::User2.to_string(), "SIGUSR2");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_listener_stops_when_executed_elsewhere() {
        let runs = Arc::new(AtomicUsize::new(0));
        let guillotine = counted(&runs);

        let listener = guillotine
            .listen_for_termination()
            .expect("Should register listener");

        let errors = guillotine.execute().await;
        timeout(Duration::from_secs(1), listener)
            .await
            .expect("Listener should stop")
            .expect("Listener should not fail");

        assert!(errors.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Execution started elsewhere, listener stopped."));
        assert!(!logs_contain("Received execution signal."));
    }

    #[tokio::test]
    async fn test_listeners_share_cancellation() {
        let runs = Arc::new(AtomicUsize::new(0));
        let guillotine = counted(&runs);

        let listeners = [
            guillotine.listen_for_termination().expect("Should register"),
            guillotine
                .listen_for_signals([Signal::Hangup])
                .expect("Should register"),
            guillotine
                .listen_for_signals(Vec::new())
                .expect("Should register"),
        ];

        guillotine.execute().await;
        for listener in listeners {
            timeout(Duration::from_secs(1), listener)
                .await
                .expect("Listener should stop")
                .expect("Listener should not fail");
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listener_after_execution_stops_immediately() {
        let guillotine = Guillotine::default();
        guillotine.execute().await;

        let listener = guillotine
            .listen_for_termination()
            .expect("Should register listener");

        timeout(Duration::from_secs(1), listener)
            .await
            .expect("Listener should stop")
            .expect("Listener should not fail");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_discarding_listener_does_not_silence_others() {
        let silent = Guillotine::default();
        let listener = silent.listen_for_termination().expect("Should register");
        silent.execute().await;
        timeout(Duration::from_secs(1), listener)
            .await
            .expect("Listener should stop")
            .expect("Listener should not fail");

        let runs = Arc::new(AtomicUsize::new(0));
        let logged = counted(&runs);
        let listener = logged.listen_for_termination().expect("Should register");
        logged.execute().await;
        timeout(Duration::from_secs(1), listener)
            .await
            .expect("Listener should stop")
            .expect("Listener should not fail");

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Listening for execution signals..."));
        assert!(logs_contain("Execution started elsewhere, listener stopped."));
    }

    #[cfg(unix)]
    #[tokio::test]
    #[traced_test]
    async fn test_signal_triggers_execution() {
        use nix::sys::signal::{Signal as NixSignal, raise};

        let runs = Arc::new(AtomicUsize::new(0));
        let guillotine = counted(&runs);

        let listener = guillotine
            .listen_for_signals([Signal::User1])
            .expect("Should register listener");

        raise(NixSignal::SIGUSR1).expect("Should raise SIGUSR1");

        let errors = timeout(Duration::from_secs(5), guillotine.wait())
            .await
            .expect("Signal should trigger the execution");
        listener.await.expect("Listener should not fail");

        assert!(errors.is_empty());
        assert!(guillotine.is_triggered());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Received execution signal."));
        assert!(logs_contain("SIGUSR1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_repeated_signals_execute_once() {
        use nix::sys::signal::{Signal as NixSignal, raise};

        let runs = Arc::new(AtomicUsize::new(0));
        let guillotine = counted(&runs);

        let first = guillotine
            .listen_for_signals([Signal::User2])
            .expect("Should register listener");
        let second = guillotine
            .listen_for_signals([Signal::User2, Signal::Hangup])
            .expect("Should register listener");

        raise(NixSignal::SIGUSR2).expect("Should raise SIGUSR2");

        timeout(Duration::from_secs(5), guillotine.wait())
            .await
            .expect("Signal should trigger the execution");
        first.await.expect("Listener should not fail");
        second.await.expect("Listener should not fail");

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
