//! Client key derivation.
//!
//! The client key is the address rate limits and logs are attributed to.
//! Forwarding headers are only honored when the direct peer is a trusted proxy.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use thiserror::Error;

/// Headers consulted, in order, when the peer is a trusted proxy.
const FORWARDING_HEADERS: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

/// Identity of the client a request is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Key used when the peer address is not available.
    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for ClientKey {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
#[error("`{0}` is not an IP address or CIDR block")]
pub struct ProxyRuleError(String);

impl ProxyRuleError {
    /// The offending list entry.
    pub fn entry(&self) -> &str {
        &self.0
    }
}

/// One entry of the trusted-proxy list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyRule {
    Addr(IpAddr),
    Cidr { network: IpAddr, prefix: u8 },
}

impl ProxyRule {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match *self {
            ProxyRule::Addr(addr) => addr.to_canonical() == ip.to_canonical(),
            ProxyRule::Cidr { network, prefix } => match (network, ip.to_canonical()) {
                (IpAddr::V4(net), IpAddr::V4(ip)) => {
                    let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
                    u32::from(net) & mask == u32::from(ip) & mask
                }
                (IpAddr::V6(net), IpAddr::V6(ip)) => {
                    let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
                    u128::from(net) & mask == u128::from(ip) & mask
                }
                _ => false,
            },
        }
    }
}

impl FromStr for ProxyRule {
    type Err = ProxyRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ProxyRuleError(s.to_string());

        let Some((network, prefix)) = s.split_once('/') else {
            return s.parse().map(ProxyRule::Addr).map_err(|_| err());
        };

        let network: IpAddr = network.parse().map_err(|_| err())?;
        let prefix: u8 = prefix.parse().map_err(|_| err())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(err());
        }
        Ok(ProxyRule::Cidr { network, prefix })
    }
}

/// The set of peers whose forwarding headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    rules: Vec<ProxyRule>,
}

impl TrustedProxies {
    pub fn new(rules: Vec<ProxyRule>) -> Self {
        Self { rules }
    }

    /// Parse the configured list.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, ProxyRuleError> {
        let rules = entries
            .iter()
            .map(|e| e.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        self.rules.iter().any(|rule| rule.contains(ip))
    }

    /// Resolve the originating client address for a request received from `peer`.
    pub fn client_ip(&self, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
        let peer = peer.to_canonical();
        if !self.is_trusted(peer) {
            return peer;
        }

        FORWARDING_HEADERS
            .iter()
            .filter_map(|name| headers.get(*name)?.to_str().ok())
            .find_map(|value| self.walk_forwarded(value))
            .unwrap_or(peer)
    }

    /// Walk a forwarding chain right-to-left, skipping trusted hops.
    fn walk_forwarded(&self, value: &str) -> Option<IpAddr> {
        let hops: Vec<&str> = value.split(',').map(str::trim).collect();
        for (i, hop) in hops.iter().enumerate().rev() {
            let ip: IpAddr = hop.parse().ok()?;
            if i == 0 || !self.is_trusted(ip) {
                return Some(ip.to_canonical());
            }
        }
        None
    }

    /// Client key for a request, using the peer address recorded by the server.
    pub fn client_key(&self, request: &Request) -> ClientKey {
        match request.extensions().get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(peer)) => self.client_ip(peer.ip(), request.headers()).into(),
            None => ClientKey::unknown(),
        }
    }
}
