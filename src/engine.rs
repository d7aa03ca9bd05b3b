//! Bulk Redfish task engine.
//!
//! A walk builds a [`Batch`] of [`HttpTask`]s (one per controller), runs it
//! through [`Engine::dispatch`], inspects per-task results, rewrites the
//! tasks for the next stage and dispatches again.  Tasks that fail a stage
//! get their `ignore` flag set and ride along untouched for the rest of the
//! walk.  Batches serialize on a process-wide lock so the trust manager can
//! swap the outbound transport without racing in-flight requests.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, MutexGuard, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::config::OpParams;
use crate::error::{Result, ShepherdError};
use crate::vault::CredStore;
use crate::xname::strip_port;

/// Sentinel for "no status information yet".
pub const STATUS_NONE: u16 = 600;

pub const CT_TYPE: &str = "Content-Type";
pub const CT_APPJSON: &str = "application/json";
pub const ET_IFNONE: &str = "If-None-Match";
pub const ET_IFMATCH: &str = "If-Match";

// Commonly used Redfish endpoints.

pub const RFROOT_API: &str = "/redfish/v1/";
pub const RFCHASSIS_API: &str = "/redfish/v1/Chassis";
pub const IS_MT_API: &str = "/redfish/v1/Chassis/Enclosure";
pub const RFMANAGERS_API: &str = "/redfish/v1/Managers";
pub const RFSYSTEMS_API: &str = "/redfish/v1/Systems";
pub const RFREGISTRIES_API: &str = "/redfish/v1/Registries";
pub const MT_NWP_API: &str = "/redfish/v1/Managers/BMC/NetworkProtocol";

/// Was the operation behind this status code successful?
pub fn ok_status(code: u16) -> bool {
    matches!(code, 200 | 201 | 202 | 204)
}

/// Human-readable message for a status code.
pub fn status_msg(code: u16) -> String {
    if ok_status(code) {
        return "OK".to_string();
    }
    if code >= 600 {
        return "Internal Server Error".to_string();
    }
    StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_string()
}

/// One outbound Redfish request plus its completion record.  Created by a
/// walker, mutated only by the engine inside a dispatch call, read by the
/// walker afterwards.
#[derive(Debug, Clone)]
pub struct HttpTask {
    /// Controller host, possibly with a `:port` suffix.
    pub target: String,
    pub method: Method,
    /// URI path on the target; the engine prepends scheme and host.
    pub path: String,
    pub body: Option<Vec<u8>>,
    pub headers: Vec<(String, String)>,
    /// Overrides the engine-wide per-task timeout when set.
    pub timeout: Option<Duration>,
    /// Skip this task; set after a failed stage in a multi-stage walk.
    pub ignore: bool,
    pub(crate) status: Option<u16>,
    pub(crate) completed: bool,
    pub response: Option<Vec<u8>>,
    pub err: Option<String>,
}

impl HttpTask {
    pub fn get(target: impl Into<String>, path: impl Into<String>) -> HttpTask {
        HttpTask {
            target: target.into(),
            method: Method::GET,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            timeout: None,
            ignore: false,
            status: None,
            completed: false,
            response: None,
            err: None,
        }
    }

    pub fn request(
        target: impl Into<String>,
        method: Method,
        path: impl Into<String>,
        body: Option<Vec<u8>>,
    ) -> HttpTask {
        let path = path.into();
        let mut task = HttpTask::get(target, path.clone());
        task.set_request(method, path, body);
        task
    }

    /// Point this task at a new GET, clearing any prior completion record.
    pub fn set_get(&mut self, path: impl Into<String>) {
        self.set_request(Method::GET, path, None);
    }

    /// Rewrite this task for the next stage of a walk.
    pub fn set_request(&mut self, method: Method, path: impl Into<String>, body: Option<Vec<u8>>) {
        self.method = method;
        self.path = path.into();
        self.headers.clear();
        if body.is_some() {
            self.headers
                .push((CT_TYPE.to_string(), CT_APPJSON.to_string()));
        }
        self.body = body;
        self.status = None;
        self.completed = false;
        self.response = None;
        self.err = None;
    }

    pub fn header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Mark this task failed outside the transport: records the error,
    /// discards any stale success status, and drops it from later stages.
    pub fn fail(&mut self, msg: impl Into<String>) {
        self.err = Some(msg.into());
        self.status = None;
        self.ignore = true;
    }

    /// Decode the completion record into an HTTP status.  A response's own
    /// code wins; a completed task with no response decodes as 204, or 500
    /// when the transport reported an error.  600 means the task has not
    /// run.
    pub fn status_code(&self) -> u16 {
        if let Some(code) = self.status {
            return code;
        }
        if self.err.is_some() {
            return 500;
        }
        if self.completed {
            return 204;
        }
        STATUS_NONE
    }

    /// "OK", or the failure reason tagged with the path that produced it.
    pub fn status_text(&self) -> String {
        let code = self.status_code();
        if ok_status(code) {
            return "OK".to_string();
        }
        format!("{}, URL: {}", status_msg(code), self.path)
    }

    /// Deserialize the response body.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        let body = self
            .response
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ShepherdError::MissingResponse {
                url: self.path.clone(),
            })?;
        serde_json::from_slice(body).map_err(|e| ShepherdError::Decode {
            url: self.path.clone(),
            source: e,
        })
    }
}

/// A set of tasks moving through a walk in lock-step.
#[derive(Debug, Default)]
pub struct Batch {
    pub tasks: Vec<HttpTask>,
}

impl Batch {
    pub fn new(tasks: Vec<HttpTask>) -> Batch {
        Batch { tasks }
    }

    /// One GET task per target at the given path.
    pub fn get(targets: &[String], path: &str) -> Batch {
        Batch {
            tasks: targets
                .iter()
                .map(|t| HttpTask::get(t.clone(), path))
                .collect(),
        }
    }

    pub async fn dispatch(&mut self, engine: &Engine) -> Result<()> {
        engine.dispatch(&mut self.tasks).await
    }

    /// Mark every live task whose last stage failed, so later stages skip
    /// it.  This is the partial-failure discipline of multi-stage walks.
    pub fn ignore_bad(&mut self) {
        for task in self.tasks.iter_mut() {
            if task.ignore {
                continue;
            }
            let code = task.status_code();
            if !ok_status(code) {
                trace!(
                    "target '{}' got bad status code {} from '{}'",
                    task.target,
                    code,
                    task.path
                );
                task.ignore = true;
            }
        }
    }

    /// Error out if any task in the batch failed.  Used by walks where a
    /// single failure invalidates the whole operation.
    pub fn check_status(&self) -> Result<()> {
        for task in &self.tasks {
            let code = task.status_code();
            if !ok_status(code) {
                return Err(ShepherdError::BadStatus {
                    url: format!("{}{}", task.target, task.path),
                    code,
                });
            }
        }
        Ok(())
    }

    pub fn live(&self) -> impl Iterator<Item = &HttpTask> {
        self.tasks.iter().filter(|t| !t.ignore)
    }

    pub fn live_mut(&mut self) -> impl Iterator<Item = &mut HttpTask> {
        self.tasks.iter_mut().filter(|t| !t.ignore)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// The bulk HTTP executor shared by every walker.
pub struct Engine {
    client: RwLock<Client>,
    batch_lock: Mutex<()>,
    scheme: String,
    max_parallel: usize,
    params: Arc<RwLock<OpParams>>,
    cred_store: RwLock<Option<Arc<dyn CredStore>>>,
}

impl Engine {
    /// Build an engine with an unvalidated-TLS transport.  The trust
    /// manager installs the real one once the CA bundle loads.
    pub fn new(params: Arc<RwLock<OpParams>>, scheme: &str, max_parallel: usize) -> Result<Engine> {
        let client = Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Engine {
            client: RwLock::new(client),
            batch_lock: Mutex::new(()),
            scheme: scheme.to_string(),
            max_parallel: max_parallel.max(1),
            params,
            cred_store: RwLock::new(None),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn params(&self) -> Arc<RwLock<OpParams>> {
        Arc::clone(&self.params)
    }

    /// Install a new outbound transport.  Callers swapping mid-operation
    /// must hold [`Engine::lock_batches`] across the swap.
    pub fn set_transport(&self, client: Client) {
        *self.client.write().unwrap() = client;
    }

    /// Serialize against in-flight batches.  Held by the trust manager for
    /// the duration of a transport swap.
    pub async fn lock_batches(&self) -> MutexGuard<'_, ()> {
        self.batch_lock.lock().await
    }

    pub fn set_cred_store(&self, store: Option<Arc<dyn CredStore>>) {
        *self.cred_store.write().unwrap() = store;
    }

    pub fn cred_store(&self) -> Option<Arc<dyn CredStore>> {
        self.cred_store.read().unwrap().clone()
    }

    /// The credential store, unless the operator has disabled store access
    /// at runtime.
    pub fn active_cred_store(&self) -> Option<Arc<dyn CredStore>> {
        if self.params.read().unwrap().vault_enable {
            self.cred_store()
        } else {
            None
        }
    }

    pub fn alive(&self) -> bool {
        self.client.read().is_ok()
    }

    /// Execute every non-ignored task in parallel and wait for all of them.
    /// Returns an error only when the batch itself cannot run (credential
    /// lookup failure); individual task failures land in the tasks.
    pub async fn dispatch(&self, tasks: &mut [HttpTask]) -> Result<()> {
        let _batch = self.batch_lock.lock().await;

        let (retries, default_timeout) = {
            let p = self.params.read().unwrap();
            (p.http_retries, Duration::from_secs(p.http_timeout))
        };
        // No secure store (or store disabled): requests go out with no
        // auth header at all.
        let store = self.active_cred_store();

        // Bind credentials up front; a missing credential aborts the batch.
        let mut auth: Vec<Option<(String, String)>> = vec![None; tasks.len()];
        let mut live = 0usize;
        for (ii, task) in tasks.iter().enumerate() {
            if task.ignore {
                continue;
            }
            live += 1;
            if let Some(store) = &store {
                let xname = strip_port(&task.target).to_string();
                let creds = store.get_creds(&xname).await.map_err(|e| {
                    ShepherdError::Internal(format!(
                        "can't get Redfish creds for '{}': {}",
                        task.target, e
                    ))
                })?;
                if !creds.xname.eq_ignore_ascii_case(&xname) {
                    debug!("creds for '{}' don't match xname: '{}'", xname, creds.xname);
                }
                auth[ii] = Some((creds.username, creds.password));
            }
        }
        if live == 0 {
            debug!("dispatch: no tasks to perform, all ignored");
            return Ok(());
        }

        let client = self.client.read().unwrap().clone();
        let sem = Arc::new(Semaphore::new(self.max_parallel));
        let mut set: JoinSet<(usize, std::result::Result<(u16, Vec<u8>), String>)> =
            JoinSet::new();

        for (ii, task) in tasks.iter_mut().enumerate() {
            if task.ignore {
                continue;
            }
            task.status = None;
            task.completed = false;
            task.response = None;
            task.err = None;

            let client = client.clone();
            let sem = Arc::clone(&sem);
            let url = format!("{}://{}{}", self.scheme, task.target, task.path);
            let method = task.method.clone();
            let body = task.body.clone();
            let headers = task.headers.clone();
            let creds = auth[ii].take();
            let timeout = task.timeout.unwrap_or(default_timeout);

            set.spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return (ii, Err("task semaphore closed".to_string())),
                };
                let mut attempt = 0u32;
                loop {
                    let mut req = client.request(method.clone(), url.as_str()).timeout(timeout);
                    if let Some(b) = &body {
                        req = req.body(b.clone());
                    }
                    for (name, value) in &headers {
                        req = req.header(name.as_str(), value.as_str());
                    }
                    if let Some((user, pw)) = &creds {
                        req = req.basic_auth(user, Some(pw));
                    }
                    match req.send().await {
                        Ok(rsp) => {
                            let status = rsp.status().as_u16();
                            let bytes = rsp.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
                            return (ii, Ok((status, bytes)));
                        }
                        Err(e) => {
                            if attempt >= retries {
                                return (ii, Err(e.to_string()));
                            }
                            attempt += 1;
                            trace!(
                                "retrying '{}' after transport error ({}/{}): {}",
                                url,
                                attempt,
                                retries,
                                e
                            );
                        }
                    }
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((ii, Ok((status, body)))) => {
                    debug!(
                        "task complete, URL: '{}', status code: {}",
                        tasks[ii].path, status
                    );
                    tasks[ii].status = Some(status);
                    tasks[ii].response = Some(body);
                    tasks[ii].completed = true;
                }
                Ok((ii, Err(emsg))) => {
                    debug!("task failed, URL: '{}': {}", tasks[ii].path, emsg);
                    tasks[ii].err = Some(emsg);
                    tasks[ii].completed = true;
                }
                Err(join_err) => {
                    return Err(ShepherdError::Internal(format!(
                        "task join failure: {}",
                        join_err
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_codes() {
        for code in [200u16, 201, 202, 204] {
            assert!(ok_status(code));
        }
        for code in [203u16, 400, 404, 422, 500, 600] {
            assert!(!ok_status(code));
        }
    }

    #[test]
    fn status_decode() {
        let mut task = HttpTask::get("x0c0s0b0", RFROOT_API);
        assert_eq!(task.status_code(), STATUS_NONE);

        task.completed = true;
        assert_eq!(task.status_code(), 204);

        task.err = Some("connection refused".to_string());
        assert_eq!(task.status_code(), 500);

        task.status = Some(403);
        assert_eq!(task.status_code(), 403);
    }

    #[test]
    fn status_messages() {
        assert_eq!(status_msg(200), "OK");
        assert_eq!(status_msg(204), "OK");
        assert_eq!(status_msg(404), "Not Found");
        assert_eq!(status_msg(600), "Internal Server Error");
        assert_eq!(status_msg(650), "Internal Server Error");
    }

    #[test]
    fn ignore_bad_marks_failures_only() {
        let targets: Vec<String> = ["x0c0s0b0", "x0c0s1b0", "x0c0s2b0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut batch = Batch::get(&targets, RFROOT_API);
        batch.tasks[0].status = Some(200);
        batch.tasks[0].completed = true;
        batch.tasks[1].status = Some(404);
        batch.tasks[1].completed = true;
        batch.tasks[2].err = Some("timed out".to_string());
        batch.tasks[2].completed = true;

        batch.ignore_bad();
        assert!(!batch.tasks[0].ignore);
        assert!(batch.tasks[1].ignore);
        assert!(batch.tasks[2].ignore);
        assert_eq!(batch.live().count(), 1);
    }

    #[test]
    fn stage_rewrite_clears_completion() {
        let mut task = HttpTask::get("x0c0s0b0", RFROOT_API);
        task.status = Some(200);
        task.completed = true;
        task.response = Some(b"{}".to_vec());

        task.set_request(Method::PATCH, "/redfish/v1/Next", Some(b"{}".to_vec()));
        assert_eq!(task.status_code(), STATUS_NONE);
        assert!(task.response.is_none());
        assert_eq!(task.headers.len(), 1);
        assert_eq!(task.headers[0].0, CT_TYPE);
    }

    #[test]
    fn check_status_flags_any_failure() {
        let targets: Vec<String> = vec!["x0c0s0b0".to_string(), "x0c0s1b0".to_string()];
        let mut batch = Batch::get(&targets, RFROOT_API);
        batch.tasks[0].status = Some(200);
        batch.tasks[1].status = Some(500);
        assert!(batch.check_status().is_err());
        batch.tasks[1].status = Some(204);
        assert!(batch.check_status().is_ok());
    }
}
