use std::fmt;
use std::str::FromStr;

use clap::Parser;
use reqwest::Url;

#[derive(Debug, Parser)]
#[command(name = "exposer", about = "Registers a channel and relays bytes to a local TCP target")]
pub struct Config {
    /// Base URL of the rendezvous server, e.g. http://relay.example:8080/
    #[arg(long)]
    pub rendezvous: Url,

    /// Target host:port this exposer dials for each incoming stream.
    #[arg(long)]
    pub target: Target,

    /// Optional peer token to disambiguate this exposer from the entrance
    /// behind shared NAT/source addresses.
    #[arg(long)]
    pub token: Option<String>,

    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,
}

/// A `host:port` pair. The host is not resolved at parse time — DNS
/// resolution happens per-dial, matching a target that may move.
#[derive(Debug, Clone)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got {s:?}"))?;
        let port: u16 = port
            .parse()
            .map_err(|_| format!("invalid port in {s:?}"))?;
        Ok(Target {
            host: host.to_string(),
            port,
        })
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parses_host_and_port() {
        let target: Target = "example.com:7".parse().unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 7);
    }

    #[test]
    fn target_rejects_missing_port() {
        assert!("example.com".parse::<Target>().is_err());
    }

    #[test]
    fn target_rejects_non_numeric_port() {
        assert!("example.com:http".parse::<Target>().is_err());
    }
}
