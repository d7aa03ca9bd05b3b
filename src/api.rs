//! The north-side HTTP API: request marshalling around the walkers.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::bios::{self, TpmStatePatch};
use crate::certs;
use crate::config::{canonical_level, level_filter, OpParams, ParamsPatch};
use crate::creds;
use crate::error::ShepherdError;
use crate::nwp::{self, CfgParams, ParamSelection};
use crate::vault::{self, CompCred};
use crate::xname;
use crate::{AppState, CertStatus};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/params", get(params_get).patch(params_patch))
        .route("/v1/bmc/dumpcfg", post(dumpcfg_post))
        .route("/v1/bmc/loadcfg", post(loadcfg_post))
        .route("/v1/bmc/cfg/:xname", get(cfg_get).post(cfg_post))
        .route("/v1/bmc/discreetcreds", post(discreet_creds_post))
        .route("/v1/bmc/creds/:xname", post(creds_single_post))
        .route("/v1/bmc/globalcreds", post(global_creds_post))
        .route("/v1/bmc/creds", get(creds_get))
        .route("/v1/bmc/createcerts", post(create_certs_post))
        .route("/v1/bmc/deletecerts", post(delete_certs_post))
        .route("/v1/bmc/fetchcerts", post(fetch_certs_post))
        .route("/v1/bmc/setcerts", post(set_certs_post))
        .route("/v1/bmc/setcert/:xname", post(set_cert_single_post))
        .route(
            "/v1/bmc/bios/:xname/tpmstate",
            get(tpm_state_get).patch(tpm_state_patch),
        )
        .route("/v1/health", get(health_get))
        .route("/v1/liveness", get(liveness_get))
        .route("/v1/readiness", get(readiness_get))
        .route("/v1/version", get(version_get))
        .with_state(state)
}

// RFC 7807 problem details, the error shape shared by the whole service
// family.

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    kind: String,
    title: String,
    detail: String,
    instance: String,
    status: u16,
}

fn problem(title: &str, detail: String, instance: &str, code: StatusCode) -> Response {
    error!("{}", detail);
    let body = ProblemDetails {
        kind: "about:blank".to_string(),
        title: title.to_string(),
        detail,
        instance: instance.to_string(),
        status: code.as_u16(),
    };
    (
        code,
        [("Content-Type", "application/problem+json")],
        Json(body),
    )
        .into_response()
}

fn problem_from(err: &ShepherdError, title: &str, instance: &str) -> Response {
    problem(title, format!("ERROR: {}", err), instance, err.http_status())
}

// Shared request/response shapes.

#[derive(Debug, Serialize)]
struct TargetsRsp<T: Serialize> {
    #[serde(rename = "Targets")]
    targets: Vec<T>,
}

#[derive(Debug, Serialize)]
struct DomainIdsRsp {
    #[serde(rename = "DomainIDs")]
    domain_ids: Vec<CertStatus>,
}

#[derive(Debug, Serialize)]
struct StatusMsgRsp {
    #[serde(rename = "StatusMsg")]
    status_msg: String,
}

// ---- /v1/params ----

async fn params_get(State(state): State<AppState>) -> Json<OpParams> {
    Json(state.params.read().unwrap().clone())
}

async fn params_patch(
    State(state): State<AppState>,
    Json(patch): Json<ParamsPatch>,
) -> Response {
    let mut enable_store = false;
    {
        let mut params = state.params.write().unwrap();
        if let Some(level) = &patch.log_level {
            params.log_level = canonical_level(level);
            if let Some(handle) = &state.log_reload {
                let filter = tracing_subscriber::EnvFilter::new(level_filter(&params.log_level));
                if let Err(e) = handle.reload(filter) {
                    error!("unable to update log filter: {}", e);
                }
            }
        }
        if let Some(retries) = patch.http_retries {
            params.http_retries = retries;
        }
        if let Some(timeout) = patch.http_timeout {
            params.http_timeout = timeout;
        }
        if let Some(enable) = patch.vault_enable {
            let was = params.vault_enable;
            params.vault_enable = enable;
            if enable && !was {
                enable_store = true;
            }
        }
    }
    if enable_store && state.engine.cred_store().is_none() {
        tokio::spawn(vault::setup_store(state.clone()));
    }
    Json(state.params.read().unwrap().clone()).into_response()
}

// ---- /v1/bmc/dumpcfg ----

#[derive(Debug, Deserialize)]
struct DumpCfgPost {
    #[serde(rename = "Force", default)]
    force: bool,
    #[serde(rename = "Targets", default)]
    targets: Vec<String>,
    #[serde(rename = "Params", default)]
    params: Vec<String>,
}

async fn dumpcfg_post(
    State(state): State<AppState>,
    Json(req): Json<DumpCfgPost>,
) -> Response {
    let instance = "/v1/bmc/dumpcfg";
    if req.targets.is_empty() {
        return problem(
            "Bad request",
            "ERROR: No targets in request.".to_string(),
            instance,
            StatusCode::BAD_REQUEST,
        );
    }
    if req.params.is_empty() {
        return problem(
            "Missing parameters in request",
            "ERROR: No parameters in request.".to_string(),
            instance,
            StatusCode::BAD_REQUEST,
        );
    }
    let sel = ParamSelection::from_names(&req.params);
    match nwp::dump_cfg(&state, req.force, true, &req.targets, &sel).await {
        Ok(targets) => Json(TargetsRsp { targets }).into_response(),
        Err(e) => problem_from(&e, "NWP data fetch", instance),
    }
}

// ---- /v1/bmc/loadcfg ----

#[derive(Debug, Deserialize)]
struct LoadCfgPost {
    #[serde(rename = "Force", default)]
    force: bool,
    #[serde(rename = "Targets", default)]
    targets: Vec<String>,
    #[serde(rename = "Params", default)]
    params: CfgParams,
}

async fn loadcfg_post(
    State(state): State<AppState>,
    Json(req): Json<LoadCfgPost>,
) -> Response {
    let instance = "/v1/bmc/loadcfg";
    if req.targets.is_empty() {
        return problem(
            "Bad request",
            "ERROR: No targets in request.".to_string(),
            instance,
            StatusCode::BAD_REQUEST,
        );
    }
    match nwp::load_cfg(&state, req.force, true, &req.targets, &req.params).await {
        Ok(targets) => Json(TargetsRsp { targets }).into_response(),
        Err(e) => problem_from(&e, "NWP data load", instance),
    }
}

// ---- /v1/bmc/cfg/{xname} ----

#[derive(Debug, Serialize)]
struct CfgSingleRsp {
    #[serde(rename = "Force")]
    force: bool,
    #[serde(rename = "Params")]
    params: CfgParams,
}

async fn cfg_get(
    State(state): State<AppState>,
    Path(xname): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let instance = "/v1/bmc/cfg";
    let mut qvstr = query
        .get("params")
        .or_else(|| query.get("Params"))
        .cloned()
        .unwrap_or_default();
    if qvstr.is_empty() {
        qvstr = "NTPServerInfo SyslogServerInfo SSHKey SSHConsoleKey".to_string();
    }
    // allow params=force and get everything, forced
    if qvstr.eq_ignore_ascii_case("force") {
        qvstr = "Force NTPServerInfo SyslogServerInfo SSHKey SSHConsoleKey".to_string();
    }

    let tokens: Vec<String> = qvstr.split_whitespace().map(|s| s.to_string()).collect();
    let force = tokens.iter().any(|t| t.eq_ignore_ascii_case("force"));
    for tok in &tokens {
        if tok.eq_ignore_ascii_case("force") || ParamSelection::known_name(tok) {
            continue;
        }
        return problem(
            "Unknown query parameter",
            format!("ERROR: unknown parameter: '{}'", tok),
            instance,
            StatusCode::BAD_REQUEST,
        );
    }
    let sel = ParamSelection::from_names(&tokens);

    let targets = vec![xname];
    let rsp = match nwp::dump_cfg(&state, force, false, &targets, &sel).await {
        Ok(r) => r,
        Err(e) => return problem_from(&e, "NWP data fetch", instance),
    };
    let Some(first) = rsp.into_iter().next() else {
        return problem(
            "NWP data fetch",
            "ERROR: No responses from NWP read operation.".to_string(),
            instance,
            StatusCode::INTERNAL_SERVER_ERROR,
        );
    };
    if !crate::engine::ok_status(first.status_code) {
        return problem(
            "NWP data fetch status error",
            format!(
                "ERROR: Bad status fetching NWP data for '{}': {}",
                first.xname, first.status_code
            ),
            instance,
            StatusCode::INTERNAL_SERVER_ERROR,
        );
    }
    Json(CfgSingleRsp {
        force,
        params: first.params.unwrap_or_default(),
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct CfgSinglePost {
    #[serde(rename = "Force", default)]
    force: bool,
    #[serde(rename = "Params", default)]
    params: CfgParams,
}

async fn cfg_post(
    State(state): State<AppState>,
    Path(xname): Path<String>,
    Json(req): Json<CfgSinglePost>,
) -> Response {
    let instance = "/v1/bmc/cfg";
    let targ = xname::normalize(&xname);
    let rsp = match nwp::load_cfg(&state, req.force, true, &[targ], &req.params).await {
        Ok(r) => r,
        Err(e) => return problem_from(&e, "NWP data load", instance),
    };
    let Some(first) = rsp.into_iter().next() else {
        return problem(
            "Error setting NWP data",
            "ERROR: No responses from NWP set operation.".to_string(),
            instance,
            StatusCode::INTERNAL_SERVER_ERROR,
        );
    };
    let code =
        StatusCode::from_u16(first.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        code,
        Json(StatusMsgRsp {
            status_msg: crate::engine::status_msg(first.status_code),
        }),
    )
        .into_response()
}

// ---- credential endpoints ----

#[derive(Debug, Deserialize)]
struct CredsData {
    #[serde(rename = "Username", default)]
    username: String,
    #[serde(rename = "Password", default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct CredsTargElem {
    #[serde(rename = "Xname")]
    xname: String,
    #[serde(rename = "Creds")]
    creds: CredsData,
}

#[derive(Debug, Deserialize)]
struct DiscreetCredsPost {
    #[serde(rename = "Force", default)]
    force: bool,
    #[serde(rename = "Targets", default)]
    targets: Vec<CredsTargElem>,
}

async fn discreet_creds_post(
    State(state): State<AppState>,
    Json(req): Json<DiscreetCredsPost>,
) -> Response {
    let instance = "/v1/bmc/discreetcreds";
    let targets: Vec<(String, CompCred)> = req
        .targets
        .into_iter()
        .map(|t| {
            let cred = CompCred {
                xname: t.xname.clone(),
                username: t.creds.username,
                password: t.creds.password,
            };
            (t.xname, cred)
        })
        .collect();
    match creds::discreet_creds(&state, req.force, &targets).await {
        Ok(targets) => Json(TargetsRsp { targets }).into_response(),
        Err(e) => problem_from(&e, "Cred set error", instance),
    }
}

#[derive(Debug, Deserialize)]
struct GlobalCredsPost {
    #[serde(rename = "Force", default)]
    force: bool,
    #[serde(rename = "Username", default)]
    username: String,
    #[serde(rename = "Password", default)]
    password: String,
    #[serde(rename = "Targets", default)]
    targets: Vec<String>,
}

async fn global_creds_post(
    State(state): State<AppState>,
    Json(req): Json<GlobalCredsPost>,
) -> Response {
    let instance = "/v1/bmc/globalcreds";
    match creds::global_creds(&state, req.force, &req.username, &req.password, &req.targets).await
    {
        Ok(targets) => Json(TargetsRsp { targets }).into_response(),
        Err(e) => problem_from(&e, "User cred set error", instance),
    }
}

#[derive(Debug, Deserialize)]
struct CredsSinglePost {
    #[serde(rename = "Force", default)]
    force: bool,
    #[serde(rename = "Creds")]
    creds: CredsData,
}

async fn creds_single_post(
    State(state): State<AppState>,
    Path(xname): Path<String>,
    Json(req): Json<CredsSinglePost>,
) -> Response {
    let instance = "/v1/bmc/creds";
    match creds::single_creds(
        &state,
        req.force,
        &xname,
        &req.creds.username,
        &req.creds.password,
    )
    .await
    {
        Ok(status) => Json(StatusMsgRsp {
            status_msg: crate::engine::status_msg(status.status_code),
        })
        .into_response(),
        Err(e) => problem_from(&e, "User cred set error", instance),
    }
}

async fn creds_get(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let instance = "/v1/bmc/creds";

    let mut xnames: Vec<String> = Vec::new();
    if let Some(targets) = query.get("targets") {
        if targets.is_empty() {
            return problem(
                "Invalid query parameter",
                "ERROR: URL query parameter is empty.".to_string(),
                instance,
                StatusCode::BAD_REQUEST,
            );
        }
        let mut bad: Vec<String> = Vec::new();
        for tok in targets.split(',') {
            match xname::verify_normalize(tok) {
                Some(xn) => xnames.push(xn),
                None => bad.push(tok.to_string()),
            }
        }
        if !bad.is_empty() {
            return problem(
                "Bad XName(s) entered",
                format!("ERROR: Invalid Xnames: {}.", bad.join(",")),
                instance,
                StatusCode::BAD_REQUEST,
            );
        }
    }

    let mut kind: Option<&str> = None;
    if let Some(types) = query.get("type") {
        let toks: Vec<&str> = types.split(',').collect();
        if toks.len() > 1 {
            return problem(
                "Invalid query parameter 'type'",
                "ERROR: URL query parameter 'type' can only be a single value.".to_string(),
                instance,
                StatusCode::BAD_REQUEST,
            );
        }
        match xname::normalize_type(toks[0]) {
            Some(t) => kind = Some(t),
            None => {
                return problem(
                    "Invalid query parameter 'type'",
                    "ERROR: URL query parameter 'type' is invalid component type.".to_string(),
                    instance,
                    StatusCode::BAD_REQUEST,
                )
            }
        }
    }

    match creds::fetch_stored_creds(&state, &xnames, kind).await {
        Ok(targets) => Json(TargetsRsp { targets }).into_response(),
        Err(e) => problem_from(&e, "Credential read error", instance),
    }
}

// ---- certificate endpoints ----

#[derive(Debug, Deserialize)]
struct ManageCertsPost {
    #[serde(rename = "Domain", default)]
    domain: String,
    #[serde(rename = "DomainIDs", default)]
    domain_ids: Vec<String>,
    #[serde(rename = "FQDN", default)]
    fqdn: Option<String>,
}

async fn create_certs_post(
    State(state): State<AppState>,
    Json(req): Json<ManageCertsPost>,
) -> Response {
    let instance = "/v1/bmc/createcerts";
    match certs::create_certs(&state, &req.domain, &req.domain_ids, req.fqdn.as_deref()).await {
        Ok(domain_ids) => Json(DomainIdsRsp { domain_ids }).into_response(),
        Err(e) => problem_from(&e, "Certificate creation error", instance),
    }
}

async fn delete_certs_post(
    State(state): State<AppState>,
    Json(req): Json<ManageCertsPost>,
) -> Response {
    let instance = "/v1/bmc/deletecerts";
    match certs::delete_certs(&state, &req.domain, &req.domain_ids).await {
        Ok(domain_ids) => Json(DomainIdsRsp { domain_ids }).into_response(),
        Err(e) => problem_from(&e, "Certificate deletion error", instance),
    }
}

async fn fetch_certs_post(
    State(state): State<AppState>,
    Json(req): Json<ManageCertsPost>,
) -> Response {
    let instance = "/v1/bmc/fetchcerts";
    match certs::fetch_certs(&state, &req.domain, &req.domain_ids).await {
        Ok(domain_ids) => Json(DomainIdsRsp { domain_ids }).into_response(),
        Err(e) => problem_from(&e, "Certificate fetch error", instance),
    }
}

#[derive(Debug, Deserialize)]
struct SetCertsPost {
    #[serde(rename = "Force", default)]
    force: bool,
    #[serde(rename = "CertDomain", default)]
    cert_domain: String,
    #[serde(rename = "Targets", default)]
    targets: Vec<String>,
}

async fn set_certs_post(
    State(state): State<AppState>,
    Json(req): Json<SetCertsPost>,
) -> Response {
    let instance = "/v1/bmc/setcerts";
    match certs::apply_certs(&state, req.force, &req.cert_domain, &req.targets).await {
        Ok(targets) => Json(TargetsRsp { targets }).into_response(),
        Err(e) => problem_from(&e, "Certificate set operation error", instance),
    }
}

async fn set_cert_single_post(
    State(state): State<AppState>,
    Path(xname): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let instance = "/v1/bmc/setcert";
    let force = query.contains_key("Force") || query.contains_key("force");
    let domain = query
        .get("Domain")
        .or_else(|| query.get("domain"))
        .cloned()
        .unwrap_or_else(|| "cabinet".to_string());

    match certs::apply_cert_single(&state, force, &domain, &xname).await {
        Ok(status) => {
            let code = StatusCode::from_u16(status.status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (code, Json(status)).into_response()
        }
        Err(e) => problem_from(&e, "Certificate set operation error", instance),
    }
}

// ---- BIOS endpoints ----

async fn tpm_state_get(State(state): State<AppState>, Path(xname): Path<String>) -> Response {
    match bios::tpm_state(&state, &xname).await {
        Ok(tpm) => Json(tpm).into_response(),
        Err(e) => problem_from(&e, "Get BIOS TPM State", "/v1/bmc/bios/tpmstate"),
    }
}

async fn tpm_state_patch(
    State(state): State<AppState>,
    Path(xname): Path<String>,
    Json(req): Json<TpmStatePatch>,
) -> Response {
    match bios::set_tpm_state(&state, &xname, req.future).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => problem_from(&e, "Patch BIOS TPM State", "/v1/bmc/bios/tpmstate"),
    }
}

// ---- operational probes ----

#[derive(Debug, Serialize)]
struct HealthRsp {
    #[serde(rename = "TaskRunnerStatus")]
    task_runner_status: String,
    #[serde(rename = "TaskRunnerMode")]
    task_runner_mode: String,
    #[serde(rename = "VaultStatus")]
    vault_status: String,
}

async fn health_get(State(state): State<AppState>) -> Json<HealthRsp> {
    let (local_mode, vault_enable) = {
        let p = state.params.read().unwrap();
        (p.local_mode, p.vault_enable)
    };
    let task_runner_status = if state.engine.alive() {
        "Running"
    } else {
        "Not Running"
    };
    let vault_status = if !vault_enable {
        "Disabled"
    } else if state.engine.cred_store().is_some() {
        "Connected"
    } else {
        "Not Connected"
    };
    Json(HealthRsp {
        task_runner_status: task_runner_status.to_string(),
        task_runner_mode: if local_mode { "Local" } else { "Worker" }.to_string(),
        vault_status: vault_status.to_string(),
    })
}

async fn liveness_get() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn readiness_get(State(state): State<AppState>) -> StatusCode {
    let vault_enable = state.params.read().unwrap().vault_enable;
    let mut ready = state.engine.alive();
    if vault_enable && state.engine.cred_store().is_none() {
        ready = false;
    }
    if ready {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[derive(Debug, Serialize)]
struct VersionRsp {
    #[serde(rename = "Version")]
    version: String,
}

async fn version_get() -> Json<VersionRsp> {
    Json(VersionRsp {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
