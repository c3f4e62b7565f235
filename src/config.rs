use crate::logger::Logger;

/// Configures a [`Guillotine`](crate::Guillotine).
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Where progress and finalizer failures are reported. Discards by default.
    pub logger: Logger,
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }
}
