use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Info,
    Debug,
    Trace,
}

impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        match self {
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Settings {
    /// Host of the demo server
    #[arg(long, default_value = "localhost", env = "GUILLOTINE_HOST")]
    pub host: String,

    /// Port number of the demo server
    #[arg(short, long, default_value_t = 8080, env = "GUILLOTINE_PORT")]
    pub port: u16,

    /// File served to every client
    #[arg(short, long, default_value = "resource.txt", env = "GUILLOTINE_RESOURCE")]
    pub resource: PathBuf,

    /// Log level
    #[arg(value_enum, long, default_value = "info", env = "GUILLOTINE_LOG_LEVEL")]
    pub log_level: LogLevel,
}

pub fn parse() -> Settings {
    Settings::parse()
}
