//! Process configuration.
//!
//! Everything comes from `SHEPHERD_`-prefixed environment variables (the
//! Vault variables keep their unprefixed names since the store's own
//! libraries read them too).  A subset of the settings is runtime-mutable
//! through the `/v1/params` endpoint.

use clap::{ArgAction, Parser};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN_PORT: u16 = 25309;

#[derive(Parser, Debug, Clone)]
#[command(name = "shepherd", version, about = "Redfish fleet configuration service")]
pub struct Settings {
    #[arg(long, env = "SHEPHERD_HTTP_LISTEN_PORT", default_value_t = DEFAULT_LISTEN_PORT)]
    pub http_listen_port: u16,

    #[arg(long, env = "SHEPHERD_HTTP_RETRIES", default_value_t = 5)]
    pub http_retries: u32,

    /// Per-task Redfish timeout, seconds.
    #[arg(long, env = "SHEPHERD_HTTP_TIMEOUT", default_value_t = 15)]
    pub http_timeout: u64,

    /// Fan-out parallelism cap for a single batch.
    #[arg(long, env = "SHEPHERD_MAX_PARALLEL", default_value_t = 64)]
    pub max_parallel: usize,

    #[arg(long, env = "SHEPHERD_UUID", default_value = "0")]
    pub uuid: String,

    /// TRACE, DEBUG, INFO, WARN or ERROR.
    #[arg(long, env = "SHEPHERD_LOG_LEVEL", default_value = "ERROR")]
    pub log_level: String,

    /// Task engine runs fan-out in-process (true) or via remote workers.
    #[arg(long, env = "SHEPHERD_LOCAL_MODE", default_value_t = true, action = ArgAction::Set)]
    pub local_mode: bool,

    /// Broker endpoint for worker-mode task distribution.  Unused in local
    /// mode.
    #[arg(long, env = "SHEPHERD_BROKER_URL", default_value = "")]
    pub broker_url: String,

    /// Hardware state manager base URL.
    #[arg(long, env = "SHEPHERD_SMD_URL", default_value = "http://cray-smd/hsm/v2")]
    pub smd_url: String,

    /// Talk plain http to controllers.  Testing only.
    #[arg(long, env = "SHEPHERD_DEFAULT_HTTP", default_value_t = false, action = ArgAction::Set)]
    pub default_http: bool,

    /// CA trust bundle: a filesystem path, or a vault:// URI resolved
    /// through the secure store CA endpoint.
    #[arg(long, env = "SHEPHERD_CA_URI", default_value = "")]
    pub ca_uri: String,

    #[arg(long, env = "SHEPHERD_VAULT_CA_URL", default_value = "")]
    pub vault_ca_url: String,

    #[arg(long, env = "SHEPHERD_VAULT_PKI_URL", default_value = "")]
    pub vault_pki_url: String,

    #[arg(long, env = "VAULT_ADDR", default_value = "http://cray-vault.vault:8200")]
    pub vault_addr: String,

    #[arg(long, env = "VAULT_KEYPATH", default_value = "secret/hms-creds")]
    pub vault_keypath: String,

    #[arg(long, env = "VAULT_CERT_KEYPATH", default_value = "secret/certs")]
    pub vault_cert_keypath: String,

    #[arg(long, env = "VAULT_ENABLE", default_value_t = true, action = ArgAction::Set)]
    pub vault_enable: bool,

    #[arg(long, env = "VAULT_TOKEN", default_value = "", hide_env_values = true)]
    pub vault_token: String,
}

impl Settings {
    pub fn op_params(&self) -> OpParams {
        OpParams {
            log_level: canonical_level(&self.log_level),
            local_mode: self.local_mode,
            broker_url: self.broker_url.clone(),
            smd_url: self.smd_url.clone(),
            http_listen_port: self.http_listen_port,
            http_retries: self.http_retries,
            http_timeout: self.http_timeout,
            uuid: self.uuid.clone(),
            vault_enable: self.vault_enable,
        }
    }
}

/// Operational parameters surfaced by `/v1/params`.  Log level, retries,
/// timeout and the store enable flag are mutable; the rest is fixed at
/// startup and echoed read-only.
#[derive(Debug, Clone, Serialize)]
pub struct OpParams {
    #[serde(rename = "LogLevel")]
    pub log_level: String,
    #[serde(rename = "LocalMode")]
    pub local_mode: bool,
    #[serde(rename = "BrokerURL")]
    pub broker_url: String,
    #[serde(rename = "SmdURL")]
    pub smd_url: String,
    #[serde(rename = "HTTPListenPort")]
    pub http_listen_port: u16,
    #[serde(rename = "HTTPRetries")]
    pub http_retries: u32,
    #[serde(rename = "HTTPTimeout")]
    pub http_timeout: u64,
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "VaultEnable")]
    pub vault_enable: bool,
}

/// Partial update body for PATCH `/v1/params`.  Absent fields are left
/// untouched; read-only fields are not accepted here at all.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ParamsPatch {
    #[serde(rename = "LogLevel")]
    pub log_level: Option<String>,
    #[serde(rename = "HTTPRetries")]
    pub http_retries: Option<u32>,
    #[serde(rename = "HTTPTimeout")]
    pub http_timeout: Option<u64>,
    #[serde(rename = "VaultEnable")]
    pub vault_enable: Option<bool>,
}

/// Map an operator-supplied level onto the canonical set.  Unknown names
/// fall back to ERROR, the startup default.
pub fn canonical_level(level: &str) -> String {
    match level.to_uppercase().as_str() {
        "TRACE" => "TRACE".to_string(),
        "DEBUG" => "DEBUG".to_string(),
        "INFO" => "INFO".to_string(),
        "WARN" => "WARN".to_string(),
        "ERROR" => "ERROR".to_string(),
        _ => "ERROR".to_string(),
    }
}

/// Translate a canonical level into a tracing env-filter directive.
pub fn level_filter(level: &str) -> &'static str {
    match canonical_level(level).as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARN" => "warn",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_settings_round_trip() {
        let settings = Settings::try_parse_from([
            "shepherd",
            "--http-listen-port",
            "1234",
            "--http-retries",
            "7",
            "--uuid",
            "11223344",
            "--log-level",
            "TRACE",
            "--local-mode",
            "true",
            "--broker-url",
            "localhost:9678",
            "--smd-url",
            "http://a.b.c.d/hsm/v2",
            "--vault-keypath",
            "vault_keypath",
            "--vault-enable",
            "true",
            "--default-http",
            "yes",
        ]);
        // "yes" is not a bool literal for clap; the state manager style
        // envs accept only true/false here.
        assert!(settings.is_err());

        let settings = Settings::try_parse_from([
            "shepherd",
            "--http-listen-port",
            "1234",
            "--http-retries",
            "7",
            "--log-level",
            "TRACE",
            "--default-http",
            "true",
        ])
        .unwrap();
        assert_eq!(settings.http_listen_port, 1234);
        assert_eq!(settings.http_retries, 7);
        assert_eq!(settings.log_level, "TRACE");
        assert!(settings.default_http);
        assert!(settings.local_mode);

        let params = settings.op_params();
        assert_eq!(params.http_retries, 7);
        assert_eq!(params.log_level, "TRACE");
    }

    #[test]
    fn level_fallback() {
        assert_eq!(canonical_level("debug"), "DEBUG");
        assert_eq!(canonical_level("bogus"), "ERROR");
        assert_eq!(level_filter("WARN"), "warn");
        assert_eq!(level_filter("FATAL"), "error");
    }

    #[test]
    fn params_patch_is_partial() {
        let patch: ParamsPatch = serde_json::from_str(r#"{"HTTPRetries": 3}"#).unwrap();
        assert_eq!(patch.http_retries, Some(3));
        assert!(patch.log_level.is_none());
        assert!(patch.vault_enable.is_none());
    }
}
