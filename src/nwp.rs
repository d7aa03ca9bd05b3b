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

//! Network-protocol (NWP) walker.
//!
//! NTP, syslog and SSH key configuration is only exposed by the
//! liquid-cooled (Mountain) controllers, so every operation starts with a
//! two-step classification: the service root weeds out unreachable
//! targets, then `/redfish/v1/Chassis/Enclosure` separates Mountain from
//! the air-cooled COTS controllers.

use std::collections::HashMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tracing::{error, trace};

use crate::engine::{self, Batch, Engine, IS_MT_API, MT_NWP_API, RFROOT_API};
use crate::error::{Result, ShepherdError};
use crate::model::network_protocol::{NtpData, SyslogData};
use crate::inventory::{good_state, make_targets, TargetInfo};
use crate::model::network_protocol::{NetworkProtocol, OemData, SshAdminData};
use crate::{AppState, CfgTargetStatus, TargetStatus};

/// The administrative view of a controller's network-protocol settings.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CfgParams {
    #[serde(rename = "NTPServerInfo")]
    pub ntp_server_info: Option<NtpData>,
    #[serde(rename = "SyslogServerInfo")]
    pub syslog_server_info: Option<SyslogData>,
    #[serde(rename = "SSHKey")]
    pub ssh_key: Option<String>,
    #[serde(rename = "SSHConsoleKey")]
    pub ssh_console_key: Option<String>,
    #[serde(rename = "BootOrder")]
    pub boot_order: Option<String>,
}

/// Which parameters a read should project.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamSelection {
    pub ntp: bool,
    pub syslog: bool,
    pub ssh_key: bool,
    pub ssh_console_key: bool,
    pub boot_order: bool,
}

impl ParamSelection {
    pub const NAMES: [&'static str; 5] = [
        "NTPServerInfo",
        "SyslogServerInfo",
        "SSHKey",
        "SSHConsoleKey",
        "BootOrder",
    ];

    /// Build a selection from parameter names.  Unknown names are ignored;
    /// endpoints that want to reject them validate up front.
    pub fn from_names(names: &[String]) -> ParamSelection {
        let mut sel = ParamSelection::default();
        for name in names {
            match name.to_lowercase().as_str() {
                "ntpserverinfo" => sel.ntp = true,
                "syslogserverinfo" => sel.syslog = true,
                "sshkey" => sel.ssh_key = true,
                "sshconsolekey" => sel.ssh_console_key = true,
                "bootorder" => sel.boot_order = true,
                _ => {}
            }
        }
        sel
    }

    pub fn known_name(name: &str) -> bool {
        Self::NAMES
            .iter()
            .any(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn all() -> ParamSelection {
        ParamSelection {
            ntp: true,
            syslog: true,
            ssh_key: true,
            ssh_console_key: true,
            boot_order: true,
        }
    }
}

fn bad_state_msg(targ: &TargetInfo) -> String {
    match &targ.err {
        Some(e) => e.clone(),
        None => format!("Target '{}' in bad HSM state: {}", targ.target, targ.state),
    }
}

/// Append response entries for the targets no Redfish traffic went to:
/// group labels and targets in bad inventory state (422), plus
/// non-Mountain targets when the operation is Mountain-only (415).
pub(crate) fn append_bad_targets(
    rsp: &mut Vec<TargetStatus>,
    targs: &[TargetInfo],
    flag_non_mountain: bool,
) {
    for targ in targs {
        if !good_state(targ.state) {
            rsp.push(TargetStatus::with_msg(
                targ.target.clone(),
                422,
                bad_state_msg(targ),
            ));
        } else if flag_non_mountain && !targ.is_mountain {
            rsp.push(TargetStatus::with_msg(
                targ.target.clone(),
                415,
                format!("Target '{}' is COTS, not the correct type", targ.target),
            ));
        }
    }
}

/// Mountain/River classification.  Updates `status_code` and
/// `is_mountain` on each viable target; errors only when no target is
/// viable or a batch cannot launch.
pub async fn classify_rv_mt(engine: &Engine, targs: &mut [TargetInfo]) -> Result<()> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut tlist: Vec<String> = Vec::new();
    for (ii, targ) in targs.iter().enumerate() {
        index.insert(targ.target.clone(), ii);
        trace!("classify, targ: '{}', state: {}", targ.target, targ.state);
        if good_state(targ.state) {
            tlist.push(targ.target.clone());
        }
    }
    if tlist.is_empty() {
        error!("classify: no valid targets");
        return Err(ShepherdError::NoValidTargets);
    }

    // Service root first, to weed out unreachable controllers.
    let mut roots = Batch::get(&tlist, RFROOT_API);
    roots.dispatch(engine).await?;
    let mut survivors: Vec<String> = Vec::new();
    for task in &roots.tasks {
        let code = task.status_code();
        if let Some(&ii) = index.get(&task.target) {
            targs[ii].status_code = code;
        }
        if engine::ok_status(code) {
            survivors.push(task.target.clone());
        }
    }
    if survivors.is_empty() {
        return Ok(());
    }

    // The enclosure resource only exists on Mountain controllers.
    let mut enclosures = Batch::get(&survivors, IS_MT_API);
    enclosures.dispatch(engine).await?;
    for task in &enclosures.tasks {
        let code = task.status_code();
        if let Some(&ii) = index.get(&task.target) {
            targs[ii].status_code = code;
            if engine::ok_status(code) {
                targs[ii].is_mountain = true;
            }
        }
    }
    Ok(())
}

/// Read network-protocol data from every viable Mountain target and
/// project the requested parameters.
pub async fn get_nwp(
    engine: &Engine,
    sel: &ParamSelection,
    targs: &mut [TargetInfo],
) -> Result<Vec<CfgTargetStatus>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut tlist: Vec<String> = Vec::new();
    for (ii, targ) in targs.iter().enumerate() {
        index.insert(targ.target.clone(), ii);
        if good_state(targ.state) && targ.is_mountain {
            tlist.push(targ.target.clone());
        }
    }
    if tlist.is_empty() {
        error!("NWP read: no valid targets");
        return Err(ShepherdError::NoValidTargets);
    }

    let mut batch = Batch::get(&tlist, MT_NWP_API);
    batch.dispatch(engine).await?;

    let mut rsp: Vec<CfgTargetStatus> = Vec::new();
    for task in &batch.tasks {
        let code = task.status_code();
        if let Some(&ii) = index.get(&task.target) {
            targs[ii].status_code = code;
        }

        if !engine::ok_status(code) {
            error!(
                "bad return status from '{}': {}",
                task.path, code
            );
            rsp.push(CfgTargetStatus {
                xname: task.target.clone(),
                status_code: code,
                status_msg: task.status_text(),
                params: None,
            });
            continue;
        }

        if task.response.as_deref().map_or(true, |b| b.is_empty()) {
            rsp.push(CfgTargetStatus {
                xname: task.target.clone(),
                status_code: 412,
                status_msg: "Target contains no NWProtocol data.".to_string(),
                params: None,
            });
            continue;
        }

        let data: NetworkProtocol = match task.parse() {
            Ok(d) => d,
            Err(e) => {
                error!("problem decoding NWProtocol data: {}", e);
                rsp.push(CfgTargetStatus {
                    xname: task.target.clone(),
                    status_code: 500,
                    status_msg: "Error decoding controller data.".to_string(),
                    params: None,
                });
                continue;
            }
        };

        // Project only what was asked for.  A missing OEM subtree means
        // the fields are absent, not that the target failed.
        let mut params = CfgParams::default();
        if sel.ntp {
            params.ntp_server_info = data.ntp.clone();
        }
        if let Some(oem) = &data.oem {
            if sel.syslog {
                params.syslog_server_info = oem.syslog.clone();
            }
            if sel.ssh_key {
                params.ssh_key = oem.ssh_admin.as_ref().and_then(|k| k.authorized_keys.clone());
            }
            if sel.ssh_console_key {
                params.ssh_console_key = oem
                    .ssh_console
                    .as_ref()
                    .and_then(|k| k.authorized_keys.clone());
            }
        }
        rsp.push(CfgTargetStatus {
            xname: task.target.clone(),
            status_code: 200,
            status_msg: "OK".to_string(),
            params: Some(params),
        });
    }

    let mut tail: Vec<TargetStatus> = Vec::new();
    append_bad_targets(&mut tail, targs, true);
    rsp.extend(tail.into_iter().map(|t| CfgTargetStatus {
        xname: t.xname,
        status_code: t.status_code,
        status_msg: t.status_msg,
        params: None,
    }));

    Ok(rsp)
}

/// Build the Redfish PATCH body for a write.  The OEM subtree is omitted
/// entirely unless one of the OEM-backed fields is being set.
pub fn nwp_patch_body(params: &CfgParams) -> NetworkProtocol {
    let mut data = NetworkProtocol::default();
    let wants_oem = params.syslog_server_info.is_some()
        || params.ssh_key.is_some()
        || params.ssh_console_key.is_some();
    if wants_oem {
        let mut oem = OemData::default();
        oem.syslog = params.syslog_server_info.clone();
        if let Some(key) = &params.ssh_key {
            oem.ssh_admin = Some(SshAdminData {
                authorized_keys: Some(key.clone()),
            });
        }
        if let Some(key) = &params.ssh_console_key {
            oem.ssh_console = Some(SshAdminData {
                authorized_keys: Some(key.clone()),
            });
        }
        data.oem = Some(oem);
    }
    data.ntp = params.ntp_server_info.clone();
    data
}

/// Write network-protocol data to every viable Mountain target.
pub async fn set_nwp(
    engine: &Engine,
    params: &CfgParams,
    targs: &mut [TargetInfo],
) -> Result<Vec<TargetStatus>> {
    let body = serde_json::to_vec(&nwp_patch_body(params))
        .map_err(|e| ShepherdError::Internal(format!("problem encoding NWProtocol data: {}", e)))?;
    trace!("NWP patch body: '{}'", String::from_utf8_lossy(&body));

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut tlist: Vec<String> = Vec::new();
    for (ii, targ) in targs.iter().enumerate() {
        index.insert(targ.target.clone(), ii);
        if good_state(targ.state) && targ.is_mountain {
            tlist.push(targ.target.clone());
        }
    }
    if tlist.is_empty() {
        error!("NWP write: no valid targets");
        return Err(ShepherdError::NoValidTargets);
    }

    let mut batch = Batch::new(
        tlist
            .iter()
            .map(|t| {
                crate::engine::HttpTask::request(
                    t.clone(),
                    Method::PATCH,
                    MT_NWP_API,
                    Some(body.clone()),
                )
            })
            .collect(),
    );
    batch.dispatch(engine).await?;

    let mut rsp: Vec<TargetStatus> = Vec::new();
    for task in &batch.tasks {
        let code = task.status_code();
        if let Some(&ii) = index.get(&task.target) {
            targs[ii].status_code = code;
        }
        rsp.push(TargetStatus::new(task.target.clone(), code));
    }

    append_bad_targets(&mut rsp, targs, true);
    Ok(rsp)
}

/// Bulk read: verify targets, classify, fetch, project.
pub async fn dump_cfg(
    state: &AppState,
    force: bool,
    expand_groups: bool,
    targets: &[String],
    sel: &ParamSelection,
) -> Result<Vec<CfgTargetStatus>> {
    let mut targs = state
        .hsm
        .verify(make_targets(targets), force, expand_groups)
        .await?;
    classify_rv_mt(&state.engine, &mut targs).await?;
    get_nwp(&state.engine, sel, &mut targs).await
}

/// Bulk write: verify targets, classify, patch.
pub async fn load_cfg(
    state: &AppState,
    force: bool,
    expand_groups: bool,
    targets: &[String],
    params: &CfgParams,
) -> Result<Vec<TargetStatus>> {
    let mut targs = state
        .hsm
        .verify(make_targets(targets), force, expand_groups)
        .await?;
    classify_rv_mt(&state.engine, &mut targs).await?;
    set_nwp(&state.engine, params, &mut targs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::network_protocol::{NtpData, SyslogData};

    #[test]
    fn selection_parsing() {
        let sel = ParamSelection::from_names(&[
            "ntpserverinfo".to_string(),
            "SSHKey".to_string(),
            "nonsense".to_string(),
        ]);
        assert!(sel.ntp);
        assert!(sel.ssh_key);
        assert!(!sel.syslog);
        assert!(!sel.boot_order);
        assert!(ParamSelection::known_name("SyslogServerInfo"));
        assert!(!ParamSelection::known_name("nonsense"));
    }

    #[test]
    fn patch_body_omits_oem_when_unused() {
        let params = CfgParams {
            ntp_server_info: Some(NtpData {
                ntp_servers: Some(vec!["10.0.0.1".to_string()]),
                protocol_enabled: Some(true),
                port: Some(123),
            }),
            ..Default::default()
        };
        let body = nwp_patch_body(&params);
        assert!(body.oem.is_none());
        let wire = serde_json::to_string(&body).unwrap();
        assert!(!wire.contains("Oem"));
        assert!(wire.contains("NTPServers"));
    }

    #[test]
    fn patch_body_carries_oem_subtree() {
        let params = CfgParams {
            ssh_key: Some("ssh-ed25519 AAAA console".to_string()),
            syslog_server_info: Some(SyslogData {
                protocol_enabled: Some(true),
                syslog_servers: Some(vec!["10.1.1.1".to_string()]),
                transport: Some("udp".to_string()),
                port: Some(514),
            }),
            ..Default::default()
        };
        let body = nwp_patch_body(&params);
        let oem = body.oem.expect("oem subtree");
        assert!(oem.syslog.is_some());
        assert!(oem.ssh_admin.is_some());
        assert!(oem.ssh_console.is_none());
    }

    #[test]
    fn projection_tolerates_missing_oem() {
        // A River-ish payload with no OEM subtree must project as absent
        // fields, not an error.
        let data: NetworkProtocol =
            serde_json::from_str(r#"{"NTP":{"NTPServers":["10.0.0.1"],"Port":123}}"#).unwrap();
        assert!(data.oem.is_none());
        assert_eq!(
            data.ntp.unwrap().ntp_servers.unwrap(),
            vec!["10.0.0.1".to_string()]
        );
    }
}
