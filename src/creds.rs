/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: MIT
 *
 * Permission is hereby granted, free of charge, to any person obtaining a
 * copy of this software and associated documentation files (the "Software"),
 * to deal in the Software without restriction, including without limitation
 * the rights to use, copy, modify, merge, publish, distribute, sublicense,
 * and/or sell copies of the Software, and to permit persons to whom the
 * Software is furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
 * THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
 * FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
 * DEALINGS IN THE SOFTWARE.
 */

//! Redfish credential walker.
//!
//! There is no way to address a user record directly: account ids are
//! firmware-assigned, sparse, and differ per controller.  The walker
//! resolves the account collection for every target, then probes accounts
//! in lock-step batches from the highest known id downward until every
//! target has matched the requested username.  Only still-searching
//! targets are probed on each iteration.

use std::collections::HashMap;

use reqwest::Method;
use serde::Serialize;
use tracing::{error, info, trace};

use crate::engine::{Batch, Engine, ET_IFNONE, RFROOT_API};
use crate::error::{Result, ShepherdError};
use crate::inventory::{good_state, make_targets, Component, TargetInfo};
use crate::model::account_service::{AccountService, AccountUpdate, ManagerAccount, ServiceRoot};
use crate::model::MemberList;
use crate::nwp::append_bad_targets;
use crate::vault::CompCred;
use crate::xname::{self, strip_port};
use crate::{engine, AppState, TargetStatus};

const EMPTY: &str = "<empty>";

/// Strip any weak-validator decoration from an etag.
pub fn fix_etag(etag: &str) -> String {
    let tail = match etag.rsplit_once("W/") {
        Some((_, t)) => t,
        None => etag,
    };
    tail.trim_matches('"').to_string()
}

/// Per-target descending walk over the known account ids.
#[derive(Debug, Default)]
struct AccountCursor {
    base_path: String,
    ids: Vec<u64>,
    idx: usize,
    found: bool,
    etag: String,
}

impl AccountCursor {
    fn current_path(&self) -> String {
        format!("{}/{}", self.base_path, self.ids[self.idx])
    }

    fn advance(&mut self) {
        if self.idx + 1 < self.ids.len() {
            self.idx += 1;
        }
    }
}

/// Resolve the account URL matching each target's username, leaving every
/// task in the batch pointed at its account resource.  Returns one etag
/// per task ("" when the firmware sent none).
///
/// `usernames` holds either one name per task or a single name applied to
/// all of them.
pub async fn fetch_target_accounts(
    engine: &Engine,
    batch: &mut Batch,
    usernames: &[String],
) -> Result<Vec<String>> {
    if usernames.len() > 1 && usernames.len() != batch.len() {
        return Err(ShepherdError::Internal(
            "username list length does not match task list length".to_string(),
        ));
    }
    fn uname_for<'a>(usernames: &'a [String], ii: usize) -> &'a str {
        if usernames.len() == 1 {
            &usernames[0]
        } else {
            &usernames[ii]
        }
    }

    // Service root -> AccountService URI.
    batch.dispatch(engine).await?;
    batch.check_status()?;
    for task in batch.tasks.iter_mut() {
        let root: ServiceRoot = task.parse()?;
        let svc = root
            .account_service
            .ok_or_else(|| ShepherdError::Internal(format!(
                "no AccountService on '{}'",
                task.target
            )))?;
        trace!("account service for '{}': '{}'", task.target, svc.id);
        task.set_get(svc.id);
    }

    // AccountService -> Accounts collection URI.
    batch.dispatch(engine).await?;
    batch.check_status()?;
    for task in batch.tasks.iter_mut() {
        let svc: AccountService = task.parse()?;
        let accounts = svc.accounts.ok_or_else(|| {
            ShepherdError::Internal(format!("no Accounts collection on '{}'", task.target))
        })?;
        task.set_get(accounts.id);
    }

    // Accounts collection -> the id space to search.
    batch.dispatch(engine).await?;
    batch.check_status()?;
    let mut cursors: Vec<AccountCursor> = Vec::with_capacity(batch.len());
    let mut max_overall: u64 = 0;
    for task in batch.tasks.iter() {
        let members: MemberList = task.parse()?;
        if members.members.is_empty() {
            return Err(ShepherdError::Internal(format!(
                "no account members found for '{}'",
                task.path
            )));
        }
        let mut cursor = AccountCursor::default();
        let mut max_uri = "";
        let mut max_id: u64 = 0;
        for member in &members.members {
            // iLO quirk: member URIs can carry a trailing slash.
            let uri = member.id.trim_end_matches('/');
            let ord: u64 = uri
                .rsplit('/')
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    ShepherdError::Internal(format!("can't get account number from '{}'", uri))
                })?;
            if ord >= max_id {
                max_id = ord;
                max_uri = uri;
            }
            cursor.ids.push(ord);
        }
        cursor.ids.sort_unstable_by(|a, b| b.cmp(a));
        cursor.base_path = match max_uri.rsplit_once('/') {
            Some((base, _)) => base.to_string(),
            None => max_uri.to_string(),
        };
        max_overall = max_overall.max(max_id);
        cursors.push(cursor);
    }

    // Probe accounts from the highest id down.  Each iteration issues one
    // GET per still-searching target; the id space bounds the loop.
    let mut iterations = max_overall + 1;
    while iterations > 0 {
        iterations -= 1;

        let mut searching = false;
        for (task, cursor) in batch.tasks.iter_mut().zip(cursors.iter()) {
            if cursor.found {
                task.ignore = true;
            } else {
                task.ignore = false;
                task.set_get(cursor.current_path());
                searching = true;
            }
        }
        if !searching {
            break;
        }

        batch.dispatch(engine).await?;
        for (ii, (task, cursor)) in batch
            .tasks
            .iter()
            .zip(cursors.iter_mut())
            .enumerate()
        {
            if cursor.found {
                continue;
            }
            let code = task.status_code();
            if !engine::ok_status(code) {
                return Err(ShepherdError::BadStatus {
                    url: format!("{}{}", task.target, task.path),
                    code,
                });
            }
            let account: ManagerAccount = task.parse()?;
            if account.username == uname_for(usernames, ii) {
                cursor.found = true;
                if !account.etag.is_empty() {
                    cursor.etag = fix_etag(&account.etag);
                }
                trace!("target {} username match at '{}'", task.target, task.path);
            } else {
                cursor.advance();
            }
        }
    }

    if cursors.iter().any(|c| !c.found) {
        return Err(ShepherdError::NoMatchingAccount);
    }
    info!("found all relevant account service URLs");

    // Leave the batch live, one task per target at its account resource.
    for (task, cursor) in batch.tasks.iter_mut().zip(cursors.iter()) {
        task.ignore = false;
        task.set_get(cursor.current_path());
    }
    Ok(cursors.into_iter().map(|c| c.etag).collect())
}

/// PATCH the new password onto each resolved account URL.  Per-target
/// results stay on the tasks; only a launch failure errors out.
///
/// `passwords` holds either one password per task or a single password
/// applied to all of them.
pub async fn set_creds(
    engine: &Engine,
    batch: &mut Batch,
    passwords: &[String],
    etags: &[String],
) -> Result<()> {
    if passwords.len() > 1 && passwords.len() != batch.len() {
        return Err(ShepherdError::Internal(
            "password list length does not match task list length".to_string(),
        ));
    }
    for (ii, task) in batch.tasks.iter_mut().enumerate() {
        let pw = if passwords.len() == 1 {
            &passwords[0]
        } else {
            &passwords[ii]
        };
        let update = AccountUpdate {
            password: Some(pw.clone()),
            ..Default::default()
        };
        let body = serde_json::to_vec(&update)
            .map_err(|e| ShepherdError::Internal(format!("problem encoding account data: {}", e)))?;
        let path = task.path.clone();
        task.set_request(Method::PATCH, path, Some(body));
        if !etags[ii].is_empty() {
            task.header(ET_IFNONE, &etags[ii]);
        }
        trace!(
            "cred set task[{}] target '{}' path '{}'",
            ii,
            task.target,
            task.path
        );
    }
    batch.dispatch(engine).await
}

/// Walk the accounts and apply new credentials on a verified target list.
/// `unames`/`pws` hold one entry per element of `tlist`, or a single entry
/// for all.  Successful hardware writes are mirrored into the secure store
/// and queued for inventory rediscovery; a store failure downgrades that
/// target to 412.
async fn apply_creds(
    state: &AppState,
    targs: &[TargetInfo],
    tlist: &[String],
    unames: &[String],
    pws: &[String],
) -> Result<Vec<TargetStatus>> {
    let engine = &state.engine;
    let mut batch = Batch::get(tlist, RFROOT_API);

    let etags = fetch_target_accounts(engine, &mut batch, unames).await?;
    set_creds(engine, &mut batch, pws, &etags).await?;

    let pick = |list: &[String], ii: usize| -> String {
        if list.len() == 1 {
            list[0].clone()
        } else {
            list[ii].clone()
        }
    };

    let store = engine.active_cred_store();
    let mut rsp: Vec<TargetStatus> = Vec::new();
    let mut discovery: Vec<String> = Vec::new();
    for (ii, task) in batch.tasks.iter().enumerate() {
        let code = task.status_code();
        if engine::ok_status(code) {
            info!("Redfish creds for '{}' successfully updated", task.target);
            let xname = strip_port(&task.target).to_string();
            discovery.push(xname.clone());
            if let Some(store) = &store {
                let cred = CompCred {
                    xname,
                    username: pick(unames, ii),
                    password: pick(pws, ii),
                };
                if let Err(e) = store.store_creds(&cred).await {
                    // Hardware and store are now out of sync; surface it.
                    error!(
                        "unable to write Redfish creds to secure store for '{}': {}",
                        task.target, e
                    );
                    rsp.push(TargetStatus::with_msg(
                        task.target.clone(),
                        412,
                        format!("Credential store update failed: {}", e),
                    ));
                    continue;
                }
            }
        } else {
            error!(
                "Redfish cred set operation failed for '{}'/'{}', creds unchanged",
                task.target, task.path
            );
        }
        rsp.push(TargetStatus::new(task.target.clone(), code));
    }

    append_bad_targets(&mut rsp, targs, false);
    state.hsm.discover(&discovery).await;
    Ok(rsp)
}

/// Distinct credentials per target.
pub async fn discreet_creds(
    state: &AppState,
    force: bool,
    targets: &[(String, CompCred)],
) -> Result<Vec<TargetStatus>> {
    let raw: Vec<String> = targets.iter().map(|(x, _)| x.clone()).collect();
    let cred_map: HashMap<&str, &CompCred> =
        targets.iter().map(|(x, c)| (x.as_str(), c)).collect();

    let targs = state.hsm.verify(make_targets(&raw), force, false).await?;

    let mut tlist: Vec<String> = Vec::new();
    for targ in &targs {
        if good_state(targ.state) {
            tlist.push(targ.target.clone());
        }
    }
    if tlist.is_empty() {
        return Err(ShepherdError::NoValidTargets);
    }

    let mut unames: Vec<String> = Vec::with_capacity(tlist.len());
    let mut pws: Vec<String> = Vec::with_capacity(tlist.len());
    for t in &tlist {
        let cred = cred_map.get(t.as_str()).ok_or_else(|| {
            ShepherdError::Internal(format!("problem retrieving auth info for '{}'", t))
        })?;
        unames.push(cred.username.clone());
        pws.push(cred.password.clone());
    }

    apply_creds(state, &targs, &tlist, &unames, &pws).await
}

/// One username/password applied to a list of targets or groups.
pub async fn global_creds(
    state: &AppState,
    force: bool,
    username: &str,
    password: &str,
    targets: &[String],
) -> Result<Vec<TargetStatus>> {
    let targs = state.hsm.verify(make_targets(targets), force, true).await?;

    let mut tlist: Vec<String> = Vec::new();
    for targ in &targs {
        if good_state(targ.state) {
            tlist.push(targ.target.clone());
        }
    }
    if tlist.is_empty() {
        return Err(ShepherdError::NoValidTargets);
    }

    apply_creds(
        state,
        &targs,
        &tlist,
        &[username.to_string()],
        &[password.to_string()],
    )
    .await
}

/// Credentials for a single target.  Returns the status of the one
/// hardware write.
pub async fn single_creds(
    state: &AppState,
    force: bool,
    xname: &str,
    username: &str,
    password: &str,
) -> Result<TargetStatus> {
    let xn = xname::normalize(xname);
    let targs = state
        .hsm
        .verify(make_targets(&[xn.clone()]), force, false)
        .await?;
    let first = targs
        .first()
        .ok_or_else(|| ShepherdError::Internal("empty verification result".to_string()))?;
    if !good_state(first.state) {
        return Err(ShepherdError::TargetState {
            xname: first.target.clone(),
            state: first.state.to_string(),
        });
    }

    let rsp = apply_creds(
        state,
        &targs,
        &[xn.clone()],
        &[username.to_string()],
        &[password.to_string()],
    )
    .await?;
    rsp.into_iter()
        .next()
        .ok_or_else(|| ShepherdError::Internal("no response from cred set operation".to_string()))
}

/// Stored credential record returned by the read endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CredsRecord {
    #[serde(rename = "Xname")]
    pub xname: String,
    #[serde(rename = "Username", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "Password", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "StatusCode")]
    pub status_code: u16,
    #[serde(rename = "StatusMsg")]
    pub status_msg: String,
}

/// Read stored credentials for controllers the state manager knows, in a
/// good state, optionally filtered to specific xnames and one component
/// type.
pub async fn fetch_stored_creds(
    state: &AppState,
    xnames: &[String],
    kind: Option<&str>,
) -> Result<Vec<CredsRecord>> {
    let store = state
        .engine
        .active_cred_store()
        .ok_or(ShepherdError::SecureStoreDisabled)?;

    let comps: Vec<Component> = if xnames.is_empty() {
        state.hsm.components_of_type(kind).await?
    } else {
        state.hsm.components_query(xnames, kind).await?
    };

    let mut out: Vec<CredsRecord> = Vec::new();
    for comp in comps {
        if !xname::kind(&comp.id).is_controller() {
            continue;
        }
        if !good_state(crate::inventory::HsmState::parse(&comp.state)) {
            continue;
        }
        match store.get_creds(&comp.id).await {
            Err(e) => {
                error!("error getting credentials for '{}': {}", comp.id, e);
                out.push(CredsRecord {
                    xname: comp.id.clone(),
                    username: None,
                    password: None,
                    status_code: 500,
                    status_msg: "No credentials found.".to_string(),
                });
            }
            Ok(cred) => {
                let username = if cred.username.is_empty() {
                    EMPTY.to_string()
                } else {
                    cred.username.clone()
                };
                let password = if cred.password.is_empty() {
                    EMPTY.to_string()
                } else {
                    cred.password.clone()
                };
                let (status_code, status_msg) =
                    if (username == EMPTY || password == EMPTY) && cred.xname.is_empty() {
                        (404, "Not Found".to_string())
                    } else {
                        (200, "OK".to_string())
                    };
                out.push(CredsRecord {
                    xname: comp.id.clone(),
                    username: Some(username),
                    password: Some(password),
                    status_code,
                    status_msg,
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_fixups() {
        assert_eq!(fix_etag("W/\"12345\""), "12345");
        assert_eq!(fix_etag("\"12345\""), "12345");
        assert_eq!(fix_etag("12345"), "12345");
        assert_eq!(fix_etag(""), "");
    }

    #[test]
    fn cursor_walks_descending_and_pins_at_end() {
        let mut cursor = AccountCursor {
            base_path: "/redfish/v1/AccountService/Accounts".to_string(),
            ids: vec![9, 4, 2, 1],
            ..Default::default()
        };
        assert_eq!(
            cursor.current_path(),
            "/redfish/v1/AccountService/Accounts/9"
        );
        cursor.advance();
        cursor.advance();
        assert_eq!(
            cursor.current_path(),
            "/redfish/v1/AccountService/Accounts/2"
        );
        cursor.advance();
        cursor.advance();
        // never walks past the lowest id
        assert_eq!(
            cursor.current_path(),
            "/redfish/v1/AccountService/Accounts/1"
        );
    }
}
