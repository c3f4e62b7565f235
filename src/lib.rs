#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::missing_errors_doc, clippy::multiple_crate_versions)]

//! Coordinates the shutdown of a process made of independent components.
//!
//! Components register finalizers on a shared [`Guillotine`]. When shutdown is triggered,
//! by a signal, a failure or an explicit call, every finalizer runs exactly once, in reverse
//! registration order, and their errors are handed to everyone waiting for the shutdown.
//!
//! ```no_run
//! use guillotine::{Config, Guillotine, Logger, callback::with_prefix};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let guillotine = Guillotine::new(Config::default().with_logger(Logger::current()));
//!     guillotine.listen_for_termination()?;
//!
//!     let file = tokio::fs::File::create("output.txt").await?;
//!     guillotine.add_closeable(file, vec![with_prefix("closing output file")]);
//!
//!     let errors = guillotine.wait().await;
//!     for error in errors.iter() {
//!         eprintln!("A finalizer failed: {error}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod callback;
pub mod config;
pub mod finalizer;
pub mod guillotine;
pub mod logger;
pub mod signal;

pub use config::Config;
pub use finalizer::{BoxError, Close, Error, Finalizer};
pub use guillotine::Guillotine;
pub use logger::Logger;
pub use signal::Signal;
