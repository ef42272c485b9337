use std::net::{IpAddr, SocketAddr};

/// Identity of a channel's peer: an explicit token when the caller sent
/// one, otherwise the connection's source IP (not the full socket
/// address — a peer's ephemeral source port changes across requests and
/// even across concurrent connections from the same client, so pinning
/// to it would misidentify a legitimate peer as a stranger).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PeerKey {
    Token(String),
    Addr(IpAddr),
}

impl PeerKey {
    pub fn resolve(token: Option<&str>, source: SocketAddr) -> Self {
        match token {
            Some(token) if !token.is_empty() => PeerKey::Token(token.to_string()),
            _ => PeerKey::Addr(source.ip()),
        }
    }
}
