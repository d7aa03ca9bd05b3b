use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_with::skip_serializing_none;

pub mod api;
pub mod bios;
pub mod certs;
pub mod config;
pub mod creds;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod model;
pub mod nwp;
pub mod trust;
pub mod vault;
pub mod vendor;
pub mod xname;

pub use config::{OpParams, Settings};
pub use engine::Engine;
pub use error::{Result, ShepherdError};
pub use inventory::Hsm;
pub use trust::TrustManager;
pub use vault::{CertStore, CredStore};

use vault::CertBundle;

/// Per-target result record returned by the bulk endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    #[serde(rename = "Xname")]
    pub xname: String,
    #[serde(rename = "StatusCode")]
    pub status_code: u16,
    #[serde(rename = "StatusMsg")]
    pub status_msg: String,
}

impl TargetStatus {
    pub fn new(xname: impl Into<String>, status_code: u16) -> TargetStatus {
        TargetStatus {
            xname: xname.into(),
            status_code,
            status_msg: engine::status_msg(status_code),
        }
    }

    pub fn with_msg(
        xname: impl Into<String>,
        status_code: u16,
        msg: impl Into<String>,
    ) -> TargetStatus {
        TargetStatus {
            xname: xname.into(),
            status_code,
            status_msg: msg.into(),
        }
    }
}

/// Per-target result record with the network-protocol parameters a read
/// produced.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct CfgTargetStatus {
    #[serde(rename = "Xname")]
    pub xname: String,
    #[serde(rename = "StatusCode")]
    pub status_code: u16,
    #[serde(rename = "StatusMsg")]
    pub status_msg: String,
    #[serde(rename = "Params")]
    pub params: Option<nwp::CfgParams>,
}

/// Per-id result record for certificate operations.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct CertStatus {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "StatusCode")]
    pub status_code: u16,
    #[serde(rename = "StatusMsg")]
    pub status_msg: String,
    #[serde(rename = "Cert")]
    pub cert: Option<CertInfo>,
}

impl CertStatus {
    pub fn new(id: impl Into<String>, status_code: u16) -> CertStatus {
        CertStatus {
            id: id.into(),
            status_code,
            status_msg: engine::status_msg(status_code),
            cert: None,
        }
    }

    pub fn with_msg(id: impl Into<String>, status_code: u16, msg: impl Into<String>) -> CertStatus {
        CertStatus {
            id: id.into(),
            status_code,
            status_msg: msg.into(),
            cert: None,
        }
    }
}

/// Leaf cert material echoed back by the fetch endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CertInfo {
    #[serde(rename = "CertType")]
    pub cert_type: String,
    #[serde(rename = "CertData")]
    pub cert_data: String,
    #[serde(rename = "FQDN")]
    pub fqdn: String,
}

impl CertInfo {
    pub fn pem(bundle: &CertBundle) -> CertInfo {
        CertInfo {
            cert_type: "PEM".to_string(),
            cert_data: bundle.certificate.clone(),
            fqdn: bundle.fqdn.clone(),
        }
    }
}

/// Handle for runtime log-level changes via `/v1/params`.
pub type LogReloadHandle =
    tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>;

/// Everything a request handler needs.  Cheap to clone; the pieces are
/// shared behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub params: Arc<RwLock<OpParams>>,
    pub engine: Arc<Engine>,
    pub hsm: Arc<Hsm>,
    pub trust: Arc<TrustManager>,
    pub cert_store: Arc<RwLock<Option<Arc<dyn CertStore>>>>,
    pub log_reload: Option<LogReloadHandle>,
}

impl AppState {
    /// Wire up the core from settings.  The secure store and log reload
    /// handle are attached separately by the caller.
    pub fn new(settings: Settings) -> Result<AppState> {
        let params = Arc::new(RwLock::new(settings.op_params()));
        let scheme = if settings.default_http { "http" } else { "https" };
        let engine = Arc::new(Engine::new(
            Arc::clone(&params),
            scheme,
            settings.max_parallel,
        )?);
        let hsm = Arc::new(Hsm::new(&settings.smd_url)?);
        let trust = Arc::new(TrustManager::new(
            Arc::clone(&engine),
            &settings.ca_uri,
            &settings.vault_ca_url,
        ));
        Ok(AppState {
            settings: Arc::new(settings),
            params,
            engine,
            hsm,
            trust,
            cert_store: Arc::new(RwLock::new(None)),
            log_reload: None,
        })
    }

    pub fn cert_store(&self) -> Option<Arc<dyn CertStore>> {
        self.cert_store.read().unwrap().clone()
    }
}
