//! Choosing the hostname the game should connect to.
//!
//! A server advertises a public `hostname` and, optionally, a
//! `private_hostname` that is valid inside its own LAN.  Which one works
//! depends on where the player sits:
//!
//! ```text
//! server public IP != our public IP   -> remote server, use `hostname`
//! same public IP, same private IP     -> server on this machine, use 127.0.0.1
//! same public IP, other private IP    -> server elsewhere on our LAN, use `private_hostname`
//! ```
//!
//! Sharing a public IP is taken to mean "behind the same NAT".  Under
//! carrier-grade NAT that assumption is wrong; this is accepted.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use super::server::ServerEntry;

/// Hostname handed to the game when the server runs on this machine.
pub const LOOPBACK_HOSTNAME: &str = "127.0.0.1";

/// Name resolution used by the resolver.
///
/// Implementations must resolve IPv4 literals to themselves.
pub trait HostLookup: Send + Sync {
    /// Resolves `host` to its first IPv4 address, or `None` on failure.
    fn lookup_ipv4(&self, host: &str) -> Option<Ipv4Addr>;
}

/// This machine's addresses, computed once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineAddresses {
    /// Address the internet sees us as.
    pub public: Option<Ipv4Addr>,
    /// Address of our primary LAN interface.
    pub private: Option<Ipv4Addr>,
}

/// Returns the hostname the game should connect to for `entry`.
///
/// A lookup failure for the public hostname, or an unknown local public
/// address, is treated as "remote".
pub fn resolve_connection_hostname(
    entry: &ServerEntry,
    local: &MachineAddresses,
    lookup: &dyn HostLookup,
) -> String {
    let host_ip = lookup.lookup_ipv4(&entry.hostname);
    if host_ip.is_none() || host_ip != local.public {
        return entry.hostname.clone();
    }

    let Some(private_hostname) = entry.private_hostname.as_deref().filter(|h| !h.is_empty()) else {
        return entry.hostname.clone();
    };

    let private_ip = lookup.lookup_ipv4(private_hostname);
    if private_ip.is_some() && private_ip == local.private {
        LOOPBACK_HOSTNAME.to_string()
    } else {
        private_hostname.to_string()
    }
}

/// Fixed hostname table; IPv4 literals resolve to themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticHostLookup {
    table: HashMap<String, Ipv4Addr>,
}

impl StaticHostLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mapping (builder style).
    pub fn with(mut self, host: impl Into<String>, ip: Ipv4Addr) -> Self {
        self.table.insert(host.into(), ip);
        self
    }
}

impl HostLookup for StaticHostLookup {
    fn lookup_ipv4(&self, host: &str) -> Option<Ipv4Addr> {
        host.parse().ok().or_else(|| self.table.get(host).copied())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
