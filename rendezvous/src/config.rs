use std::net::SocketAddr;
use std::str::FromStr;

use clap::Parser;

/// CLI surface for the rendezvous server. Unlike the teacher's TOML-file
/// configuration, this binary's entire surface is a handful of scalars,
/// so flags alone are enough — no file/env layer.
#[derive(Debug, Parser)]
#[command(name = "rendezvous", about = "HTTP rendezvous server for the tunnel relay")]
pub struct Config {
    /// Address to bind the HTTP listener on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Bounded FIFO depth per direction, per channel.
    #[arg(long, default_value_t = 256)]
    pub queue_capacity: usize,

    /// Channels idle longer than this are reaped by the periodic sweep.
    #[arg(long, default_value_t = 300)]
    pub idle_timeout_secs: u64,

    /// How often the GET long-poll writes a heartbeat while idle.
    #[arg(long, default_value_t = 5)]
    pub heartbeat_interval_secs: u64,

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
