//! CA trust lifecycle for the outbound Redfish transport.
//!
//! The trust bundle comes from a file (mounted configmap) or from the
//! secure store's CA endpoint.  On change the manager rebuilds the
//! outbound client and swaps it under the engine's batch lock, so
//! in-flight batches finish against the old trust and the next batch picks
//! up the new one.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Certificate, Client};
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::error::{Result, ShepherdError};

/// How often the bundle source is polled for changes.
pub const POLL_PERIOD: Duration = Duration::from_secs(10);

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";

/// Split a PEM bundle into individual certificate blocks.
fn pem_blocks(bundle: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut rest = bundle;
    while let Some(start) = rest.find(PEM_BEGIN) {
        let tail = &rest[start..];
        match tail.find("-----END CERTIFICATE-----") {
            Some(end) => {
                let block_end = end + "-----END CERTIFICATE-----".len();
                blocks.push(tail[..block_end].to_string());
                rest = &tail[block_end..];
            }
            None => break,
        }
    }
    blocks
}

/// Build the outbound Redfish client.  With no bundle the transport falls
/// back to unvalidated TLS.
pub fn build_transport(bundle: Option<&str>) -> Result<Client> {
    let mut builder = Client::builder().use_rustls_tls();
    match bundle {
        Some(pem) => {
            let blocks = pem_blocks(pem);
            if blocks.is_empty() {
                return Err(ShepherdError::Internal(
                    "CA bundle contains no certificates".to_string(),
                ));
            }
            for block in blocks {
                builder = builder.add_root_certificate(Certificate::from_pem(block.as_bytes())?);
            }
        }
        None => {
            builder = builder.danger_accept_invalid_certs(true);
        }
    }
    Ok(builder.build()?)
}

/// Where the CA bundle comes from.
enum BundleSource {
    None,
    Path(String),
    /// `vault://` URI resolved through the secure store CA endpoint.
    Url(String),
}

pub struct TrustManager {
    engine: Arc<Engine>,
    source: BundleSource,
    updates: AtomicU32,
    last: RwLock<Option<String>>,
}

impl TrustManager {
    /// `ca_uri` may be empty (no trusted TLS), a filesystem path, or a
    /// `vault://` URI; a `vault://` URI requires `ca_url` to point at the
    /// store's CA chain endpoint.
    pub fn new(engine: Arc<Engine>, ca_uri: &str, ca_url: &str) -> TrustManager {
        let source = if ca_uri.is_empty() {
            BundleSource::None
        } else if ca_uri.starts_with("vault://") {
            BundleSource::Url(ca_url.to_string())
        } else {
            BundleSource::Path(ca_uri.to_string())
        };
        TrustManager {
            engine,
            source,
            updates: AtomicU32::new(0),
            last: RwLock::new(None),
        }
    }

    pub fn update_count(&self) -> u32 {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn has_source(&self) -> bool {
        !matches!(self.source, BundleSource::None)
    }

    async fn fetch_bundle(&self) -> Result<String> {
        match &self.source {
            BundleSource::None => Err(ShepherdError::Internal(
                "no CA bundle source configured".to_string(),
            )),
            BundleSource::Path(path) => Ok(tokio::fs::read_to_string(path).await?),
            BundleSource::Url(url) => {
                if url.is_empty() {
                    return Err(ShepherdError::Internal(
                        "vault:// CA URI with no CA URL configured".to_string(),
                    ));
                }
                let client = Client::builder()
                    .use_rustls_tls()
                    .danger_accept_invalid_certs(true)
                    .build()?;
                let rsp = client.get(url).send().await?;
                if !rsp.status().is_success() {
                    return Err(ShepherdError::Internal(format!(
                        "bad return status fetching CA chain: {}",
                        rsp.status().as_u16()
                    )));
                }
                let body = rsp.text().await?;
                // The CA endpoint answers either raw PEM or a JSON wrapper
                // with the chain under data.ca_chain.
                if body.contains(PEM_BEGIN) {
                    return Ok(body);
                }
                #[derive(serde::Deserialize)]
                struct CaData {
                    ca_chain: String,
                }
                #[derive(serde::Deserialize)]
                struct CaWrap {
                    data: CaData,
                }
                let wrap: CaWrap = serde_json::from_str(&body).map_err(|e| {
                    ShepherdError::Internal(format!("can't decode CA chain response: {}", e))
                })?;
                Ok(wrap.data.ca_chain)
            }
        }
    }

    /// Fetch the bundle and swap the engine transport.  All batches pause
    /// for the duration of the swap.
    pub async fn rebuild(&self) -> Result<()> {
        let pem = self.fetch_bundle().await?;
        let client = build_transport(Some(&pem))?;
        {
            let _paused = self.engine.lock_batches().await;
            self.engine.set_transport(client);
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
        *self.last.write().unwrap() = Some(pem);
        info!("CA bundle and Redfish HTTP transports updated");
        Ok(())
    }

    /// One poll cycle: rebuild if the bundle content changed since the last
    /// successful load.
    pub async fn check_once(&self) -> Result<bool> {
        let pem = self.fetch_bundle().await?;
        let changed = {
            let last = self.last.read().unwrap();
            last.as_deref() != Some(pem.as_str())
        };
        if changed {
            info!("updating CA bundle for Redfish HTTP transports");
            self.rebuild().await?;
        }
        Ok(changed)
    }

    /// Initial load with retries, then poll for changes forever.  Spawned
    /// as a background task at startup.
    pub async fn run(self: Arc<Self>) {
        if !self.has_source() {
            info!("no CA bundle specified; Redfish TLS stays unvalidated");
            return;
        }

        let mut loaded = false;
        for attempt in 1..=10u32 {
            match self.rebuild().await {
                Ok(()) => {
                    info!("CA trust bundle loaded successfully");
                    loaded = true;
                    break;
                }
                Err(e) => {
                    error!("can't get CA trust bundle (attempt {}): {}", attempt, e);
                    tokio::time::sleep(Duration::from_secs(3)).await;
                }
            }
        }
        if !loaded {
            error!("CA trust bundle load attempts exhausted, no trusted TLS operations possible");
            return;
        }

        let mut ticker = tokio::time::interval(POLL_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.check_once().await {
                warn!("CA bundle poll failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAKE_CERT: &str = "-----BEGIN CERTIFICATE-----\nnot-a-cert\n-----END CERTIFICATE-----\n";

    #[test]
    fn splits_bundles() {
        let single = pem_blocks(FAKE_CERT);
        assert_eq!(single.len(), 1);

        let bundle = format!("{}{}", FAKE_CERT, FAKE_CERT);
        assert_eq!(pem_blocks(&bundle).len(), 2);

        assert!(pem_blocks("garbage").is_empty());
        // truncated trailing block is dropped
        let partial = format!("{}-----BEGIN CERTIFICATE-----\nxx", FAKE_CERT);
        assert_eq!(pem_blocks(&partial).len(), 1);
    }

    #[test]
    fn empty_bundle_is_an_error() {
        assert!(build_transport(Some("")).is_err());
        assert!(build_transport(None).is_ok());
    }
}
