//! Candidate URI derivation
//!
//! The configured URI always comes first so a plain Linux or macOS host pays
//! nothing for WSL support. Under WSL the loopback host of the URI is
//! rewritten to the detected Windows host and to each configured alternate.
//!
//! Rewriting is plain string replacement on `127.0.0.1` / `localhost`, not
//! URI parsing. Connection URIs here are always `scheme://host:port`.

use crate::config::ConnectionConfig;
use crate::environment::EnvironmentProbe;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

const LOOPBACK_IP: &str = "127.0.0.1";
const LOOPBACK_NAME: &str = "localhost";

/// Ordered, duplicate-free list of URIs to attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateAddressList {
    uris: Vec<String>,
}

impl CandidateAddressList {
    /// Build from a sequence, keeping the first occurrence of each URI
    pub fn new<I>(uris: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let uris = uris
            .into_iter()
            .filter(|uri| seen.insert(uri.clone()))
            .collect();
        Self { uris }
    }

    /// The URIs in attempt order
    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    /// Number of candidates
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    /// Whether there is nothing to try
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    /// Iterate in attempt order
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.uris.iter()
    }
}

impl IntoIterator for CandidateAddressList {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.uris.into_iter()
    }
}

impl<'a> IntoIterator for &'a CandidateAddressList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.uris.iter()
    }
}

/// What the probe reported, alongside the candidates derived from it
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    /// Whether a nested environment was detected
    pub nested: bool,
    /// Host address, if one was discovered
    pub host_address: Option<String>,
    /// Candidates in attempt order
    pub candidates: CandidateAddressList,
}

/// Derives candidate URIs from configuration and environment facts
#[derive(Clone)]
pub struct AddressResolver {
    probe: Arc<dyn EnvironmentProbe>,
}

impl AddressResolver {
    /// Create a resolver over the given probe
    pub fn new(probe: Arc<dyn EnvironmentProbe>) -> Self {
        Self { probe }
    }

    /// Candidate URIs for the given configuration
    pub async fn resolve(&self, config: &ConnectionConfig) -> CandidateAddressList {
        self.resolve_detailed(config).await.candidates
    }

    /// Candidate URIs together with the probe results behind them
    pub async fn resolve_detailed(&self, config: &ConnectionConfig) -> Resolution {
        let nested = self.probe.is_nested().await;
        let host_address = if nested {
            self.probe.host_address().await
        } else {
            None
        };

        let candidates = derive_candidates(config, nested, host_address.as_deref());
        if nested {
            info!(
                "WSL environment detected (host address: {}), {} candidate URI(s)",
                host_address.as_deref().unwrap_or("unknown"),
                candidates.len()
            );
        } else {
            debug!("Native environment, using configured URI only");
        }

        Resolution {
            nested,
            host_address,
            candidates,
        }
    }
}

/// Pure candidate derivation
///
/// Returns `[config.uri]` unless `nested` is set and a host address is known.
pub fn derive_candidates(
    config: &ConnectionConfig,
    nested: bool,
    host_address: Option<&str>,
) -> CandidateAddressList {
    let primary = config.uri.clone();
    let mut uris = vec![primary.clone()];

    if let (true, Some(host)) = (nested, host_address) {
        if primary.contains(LOOPBACK_IP) {
            uris.push(primary.replace(LOOPBACK_IP, host));
        } else if primary.contains(LOOPBACK_NAME) {
            uris.push(primary.replace(LOOPBACK_NAME, host));
        }

        for alternate in config.windows_host_ips.iter().filter(|ip| *ip != host) {
            uris.push(
                primary
                    .replace(LOOPBACK_IP, alternate)
                    .replace(LOOPBACK_NAME, alternate),
            );
        }
    }

    CandidateAddressList::new(uris)
}
