//! Name resolution and local address detection.
//!
//! [`SystemHostLookup`] is the production [`HostLookup`]: it asks the OS
//! resolver and keeps the first IPv4 answer.  Lookups block, so async
//! callers run them on `tokio::task::spawn_blocking`.
//!
//! [`detect_machine_addresses`] runs once at startup.  The private address is
//! the one the OS would use for outbound LAN traffic.  The public address is
//! the configured override when there is one, otherwise whatever a
//! [`PublicAddressProvider`] reports.  [`HttpEchoProvider`] asks an echo
//! service that answers with the caller's address as plain text.  If neither
//! yields an address the resolver treats every server as remote.

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::time::Duration;

use ds3os_core::{HostLookup, MachineAddresses};
use tracing::{debug, info, warn};

/// [`HostLookup`] backed by the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHostLookup;

impl HostLookup for SystemHostLookup {
    fn lookup_ipv4(&self, host: &str) -> Option<Ipv4Addr> {
        let host = host.trim();
        if host.is_empty() {
            return None;
        }
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Some(ip);
        }
        // Port is required by ToSocketAddrs and ignored.
        match (host, 0u16).to_socket_addrs() {
            Ok(addrs) => addrs.into_iter().find_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            }),
            Err(e) => {
                debug!(host, "lookup failed: {e}");
                None
            }
        }
    }
}

// ── Public address ────────────────────────────────────────────────────────────

/// Source of this machine's public IPv4 address.
///
/// Implementations block and are called at most once per run.
#[cfg_attr(test, mockall::automock)]
pub trait PublicAddressProvider: Send + Sync {
    fn public_ipv4(&self) -> Option<Ipv4Addr>;
}

/// Provider used when echo lookup is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPublicAddress;

impl PublicAddressProvider for NoPublicAddress {
    fn public_ipv4(&self) -> Option<Ipv4Addr> {
        None
    }
}

/// Asks an HTTP echo service such as `https://api.ipify.org`.
///
/// The response body must be a bare dotted-quad address; surrounding
/// whitespace is ignored.
pub struct HttpEchoProvider {
    agent: ureq::Agent,
    url: String,
}

impl HttpEchoProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PublicAddressProvider for HttpEchoProvider {
    fn public_ipv4(&self) -> Option<Ipv4Addr> {
        let body = match self.agent.get(&self.url).call() {
            Ok(response) => response.into_string(),
            Err(e) => {
                warn!(url = %self.url, "public address lookup failed: {e}");
                return None;
            }
        };
        match body {
            Ok(body) => {
                let address = parse_echo_body(&body);
                if address.is_none() {
                    warn!(url = %self.url, "echo service did not answer with an IPv4 address");
                }
                address
            }
            Err(e) => {
                warn!(url = %self.url, "could not read echo response: {e}");
                None
            }
        }
    }
}

fn parse_echo_body(body: &str) -> Option<Ipv4Addr> {
    body.trim().parse().ok()
}

// ── Machine addresses ─────────────────────────────────────────────────────────

/// Determines this machine's addresses.
///
/// `public_override` is the configured public address.  `provider` is only
/// asked when there is no override.
pub fn detect_machine_addresses(
    public_override: Option<Ipv4Addr>,
    provider: &dyn PublicAddressProvider,
) -> MachineAddresses {
    let private = match local_ip_address::local_ip() {
        Ok(IpAddr::V4(ip)) => Some(ip),
        Ok(IpAddr::V6(ip)) => {
            warn!(%ip, "primary interface has no IPv4 address");
            None
        }
        Err(e) => {
            warn!("could not determine private address: {e}");
            None
        }
    };

    let public = match public_override {
        Some(ip) => Some(ip),
        None => {
            let detected = provider.public_ipv4();
            match detected {
                Some(ip) => info!(%ip, "detected public address"),
                None => info!("public address unknown; servers are treated as remote"),
            }
            detected
        }
    };

    let addresses = MachineAddresses { public, private };
    debug!(?addresses, "machine addresses");
    addresses
}
