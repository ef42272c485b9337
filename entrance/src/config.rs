use std::str::FromStr;

use clap::Parser;
use reqwest::Url;

#[derive(Debug, Parser)]
#[command(name = "entrance", about = "Joins a channel and serves it as a local TCP listener")]
pub struct Config {
    /// Base URL of the rendezvous server, e.g. http://relay.example:8080/
    #[arg(long)]
    pub rendezvous: Url,

    /// Channel id to join, as printed by the exposer.
    #[arg(long)]
    pub channel: String,

    /// Optional peer token to disambiguate this entrance from the exposer
    /// behind shared NAT/source addresses.
    #[arg(long)]
    pub token: Option<String>,

    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}
