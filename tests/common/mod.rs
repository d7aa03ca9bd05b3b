//! In-process fake Redfish endpoints and a fake state manager, standing in
//! for the controller fleet the way the offline test rig always has.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// Request counters, keyed by whatever the fake wants to count.
#[derive(Clone, Default)]
pub struct Hits {
    inner: Arc<Mutex<HashMap<String, u32>>>,
}

impl Hits {
    pub fn new() -> Hits {
        Hits::default()
    }

    pub fn bump(&self, key: &str) {
        *self
            .inner
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert(0) += 1;
    }

    pub fn count(&self, key: &str) -> u32 {
        self.inner.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

/// Last-seen values, keyed by name (captured headers, bodies).
#[derive(Clone, Default)]
pub struct Captured {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl Captured {
    pub fn new() -> Captured {
        Captured::default()
    }

    pub fn put(&self, key: &str, value: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().get(key).cloned()
    }
}

/// Serve a router on an ephemeral loopback port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A Mountain controller that accepts network-protocol configuration.
pub fn mountain_nwp_router(hits: Hits, captured: Captured) -> Router {
    #[derive(Clone)]
    struct S {
        hits: Hits,
        captured: Captured,
    }
    let state = S { hits, captured };

    async fn nwp_patch(State(s): State<S>, body: String) -> impl IntoResponse {
        s.hits.bump("nwp-patch");
        s.captured.put("nwp-body", body);
        Json(json!({}))
    }

    Router::new()
        .route("/redfish/v1/", get(|| async { Json(json!({})) }))
        .route(
            "/redfish/v1/Chassis/Enclosure",
            get(|| async { Json(json!({})) }),
        )
        .route(
            "/redfish/v1/Managers/BMC/NetworkProtocol",
            get(|| async {
                Json(json!({
                    "NTP": {"NTPServers": ["10.2.2.2"], "ProtocolEnabled": false, "Port": 123},
                    "Oem": {"Syslog": {"SyslogServers": ["10.3.3.3"], "Port": 514}}
                }))
            })
            .patch(nwp_patch),
        )
        .with_state(state)
}

/// A controller hosting a four-slot account collection; `username` matches
/// at the lowest account id so a full descending walk is required.
pub fn account_walk_router(hits: Hits, captured: Captured, username: &str) -> Router {
    #[derive(Clone)]
    struct S {
        hits: Hits,
        captured: Captured,
        username: String,
    }
    let state = S {
        hits,
        captured,
        username: username.to_string(),
    };

    async fn account_get(State(s): State<S>, Path(id): Path<String>) -> impl IntoResponse {
        s.hits.bump(&format!("account-get-{}", id));
        s.hits.bump("account-gets");
        if id == "1" {
            Json(json!({"UserName": s.username, "@odata.etag": "W/\"etag-1\""}))
        } else {
            Json(json!({"UserName": format!("user{}", id)}))
        }
    }

    async fn account_patch(
        State(s): State<S>,
        Path(id): Path<String>,
        headers: HeaderMap,
        body: String,
    ) -> impl IntoResponse {
        s.hits.bump(&format!("account-patch-{}", id));
        if let Some(tag) = headers.get("If-None-Match") {
            s.captured
                .put("if-none-match", tag.to_str().unwrap_or("").to_string());
        }
        s.captured.put("account-patch-body", body);
        Json(json!({}))
    }

    Router::new()
        .route(
            "/redfish/v1/",
            get(|| async {
                Json(json!({"AccountService": {"@odata.id": "/redfish/v1/AccountService"}}))
            }),
        )
        .route(
            "/redfish/v1/AccountService",
            get(|| async {
                Json(json!({"Accounts": {"@odata.id": "/redfish/v1/AccountService/Accounts"}}))
            }),
        )
        .route(
            "/redfish/v1/AccountService/Accounts",
            get(|| async {
                Json(json!({"Members": [
                    {"@odata.id": "/redfish/v1/AccountService/Accounts/1"},
                    {"@odata.id": "/redfish/v1/AccountService/Accounts/2"},
                    {"@odata.id": "/redfish/v1/AccountService/Accounts/3"},
                    {"@odata.id": "/redfish/v1/AccountService/Accounts/4"}
                ]}))
            }),
        )
        .route(
            "/redfish/v1/AccountService/Accounts/:id",
            get(account_get).patch(account_patch),
        )
        .with_state(state)
}

/// A Cray-schema controller exposing the certificate replace action.
pub fn cray_cert_router(hits: Hits, captured: Captured) -> Router {
    #[derive(Clone)]
    struct S {
        hits: Hits,
        captured: Captured,
    }
    let state = S { hits, captured };

    async fn replace(State(s): State<S>, body: String) -> impl IntoResponse {
        s.hits.bump("cert-post");
        s.captured.put("cert-body", body);
        Json(json!({}))
    }

    Router::new()
        .route(
            "/redfish/v1/Chassis",
            get(|| async {
                Json(json!({"Members": [{"@odata.id": "/redfish/v1/Chassis/Enclosure"}]}))
            }),
        )
        .route(
            "/redfish/v1/CertificateService",
            get(|| async {
                Json(json!({
                    "Actions": {"#CertificateService.ReplaceCertificate":
                        {"target": "/redfish/v1/CertificateService/Actions/CertificateService.ReplaceCertificate"}},
                    "CertificateLocations": {"@odata.id": "/redfish/v1/CertificateService/CertificateLocations"}
                }))
            }),
        )
        .route(
            "/redfish/v1/CertificateService/CertificateLocations",
            get(|| async {
                Json(json!({"Links": {"Certificates": [
                    {"@odata.id": "/redfish/v1/Managers/BMC/NetworkProtocol/HTTPS/Certificates/1"}
                ]}}))
            }),
        )
        .route(
            "/redfish/v1/CertificateService/Actions/CertificateService.ReplaceCertificate",
            post(replace),
        )
        .with_state(state)
}

/// An iLO system with a current and a staged TPM state.
pub fn hpe_bios_router(current_tpm: &str, future_tpm: &str) -> Router {
    let current = current_tpm.to_string();
    let future = future_tpm.to_string();

    Router::new()
        .route(
            "/redfish/v1/Chassis",
            get(|| async { Json(json!({"Members": [{"@odata.id": "/redfish/v1/Chassis/1"}]})) }),
        )
        .route(
            "/redfish/v1/Systems",
            get(|| async { Json(json!({"Members": [{"@odata.id": "/redfish/v1/Systems/1"}]})) }),
        )
        .route(
            "/redfish/v1/Systems/1",
            get(|| async {
                Json(json!({"Bios": {"@odata.id": "/redfish/v1/Systems/1/Bios"}}))
            }),
        )
        .route(
            "/redfish/v1/Systems/1/Bios",
            get(move || {
                let tpm = current.clone();
                async move { Json(json!({"Attributes": {"TpmState": tpm}})) }
            }),
        )
        .route(
            "/redfish/v1/Systems/1/Bios/Settings",
            get(move || {
                let tpm = future.clone();
                async move { Json(json!({"Attributes": {"TpmState": tpm}})) }
            }),
        )
}

/// A state manager fake: one group plus a component state table.
pub fn hsm_router(groups: Value, components: Value) -> Router {
    let groups2 = groups.clone();
    let components2 = components.clone();

    Router::new()
        .route(
            "/groups",
            get(move || {
                let g = groups2.clone();
                async move { Json(g) }
            }),
        )
        .route(
            "/State/Components",
            get(move || {
                let c = components2.clone();
                async move { Json(c) }
            }),
        )
        .route(
            "/State/Components/Query",
            post(move |_body: String| {
                let c = components.clone();
                async move { Json(c) }
            }),
        )
        .route(
            "/Inventory/Discover",
            post(|| async { Json(json!([])) }),
        )
}
