//! Callbacks applied to the result of a finalizer.
//!
//! A callback receives the error produced by a finalizer (or `None`) and returns the error
//! to record in its place. Callbacks registered with a finalizer are applied left to right,
//! each one receiving the output of the previous one.

use std::fmt::Display;

use crate::finalizer::Error;

/// Post-processes the result of a finalizer.
pub trait Callback: Send + 'static {
    fn call(&self, error: Option<Error>) -> Option<Error>;
}

impl<F> Callback for F
where
    F: Fn(Option<Error>) -> Option<Error> + Send + 'static,
{
    fn call(&self, error: Option<Error>) -> Option<Error> {
        self(error)
    }
}

pub type BoxCallback = Box<dyn Callback>;

/// Threads `error` through every callback, in order.
pub fn run(error: Option<Error>, callbacks: &[BoxCallback]) -> Option<Error> {
    callbacks
        .iter()
        .fold(error, |error, callback| callback.call(error))
}

/// Wraps a finalizer error with `message`.
pub fn with_prefix<M: Into<String>>(message: M) -> BoxCallback {
    let message = message.into();

    Box::new(move |error: Option<Error>| error.map(|error| error.with_message(message.clone())))
}

/// Creates an error from `message` if the finalizer didn't return one.
///
/// Any [`Display`] value is accepted, so formatted messages work as well:
///
/// ```
/// use guillotine::callback::with_error;
///
/// let port = 8080;
/// let callback = with_error(format_args!("server on port {port} was already stopped"));
/// ```
pub fn with_error<M: Display>(message: M) -> BoxCallback {
    let message = message.to_string();

    Box::new(move |error: Option<Error>| error.or_else(|| Some(Error::Message(message.clone()))))
}

/// Runs `action` after the finalizer, leaving its error untouched.
pub fn with_func<F>(action: F) -> BoxCallback
where
    F: Fn() + Send + 'static,
{
    Box::new(move |error: Option<Error>| {
        action();
        error
    })
}

/// Lets `observer` look at the finalizer error, leaving it untouched.
pub fn inspect<F>(observer: F) -> BoxCallback
where
    F: Fn(Option<&Error>) + Send + 'static,
{
    Box::new(move |error: Option<Error>| {
        observer(error.as_ref());
        error
    })
}
