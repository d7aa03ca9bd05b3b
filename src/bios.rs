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

//! BIOS walker: vendor-neutral TPM state.
//!
//! Every vendor spells TPM presence differently: an attribute named
//! `TPM Control` with Enabled/Disabled on Cray nodes, a registry-described
//! `TPM State` on Gigabyte, `TpmState` with PresentEnabled-style values on
//! iLO, and integer `TpmOperation`/`Tpm2Operation` flags on Intel.  The
//! walker projects all of them onto {Enabled, Disabled, NotPresent} for
//! current and staged settings, and translates writes back into the
//! vendor's attribute after checking the value is one the registry
//! allows.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::engine::{
    Batch, Engine, HttpTask, ET_IFMATCH, RFCHASSIS_API, RFREGISTRIES_API, RFSYSTEMS_API,
};
use crate::error::{Result, ShepherdError};
use crate::inventory::make_targets;
use crate::model::bios::{
    AttributeRegistry, AttributeRegistryLocations, BiosCray, BiosGigabyte, BiosHpe, BiosSettings,
    RegistryAttribute, System,
};
use crate::model::MemberList;
use crate::vendor::{self, Vendor};
use crate::xname::{self, XnameKind};
use crate::{engine, AppState};

/// The administrative three-state TPM projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TpmState {
    Enabled,
    Disabled,
    NotPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BiosTpmState {
    #[serde(rename = "Current")]
    pub current: TpmState,
    #[serde(rename = "Future")]
    pub future: TpmState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TpmStatePatch {
    #[serde(rename = "Future")]
    pub future: TpmState,
}

// Per-vendor attribute names.
const TPM_ATTR_CRAY: &str = "TPM Control";
const TPM_ATTR_GIGABYTE: &str = "TPM State";
const TPM_ATTR_HPE: &str = "TpmState";
const TPM_ATTR_INTEL: &str = "TpmOperation";
const TPM_ATTR_INTEL2: &str = "Tpm2Operation";

// Per-vendor attribute values.
const ENABLED_CRAY: &str = "Enabled";
const DISABLED_CRAY: &str = "Disabled";
const ENABLED_GIGABYTE: &str = "Enabled";
const DISABLED_GIGABYTE: &str = "Disabled";
const ENABLED_HPE: &str = "PresentEnabled";
const DISABLED_HPE: &str = "PresentDisabled";
const ENABLED_INTEL: i64 = 1;

/// Everything the per-vendor walks share.
#[derive(Debug)]
pub struct BiosCommon {
    pub xname: String,
    pub bmc_xname: String,
    pub node_number: u32,
    pub vendor: Vendor,
    pub system_uri: String,
    pub bios_uri: String,
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_int(v: &Value, default: i64) -> i64 {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(default),
        Value::String(s) => s.parse().unwrap_or(default),
        _ => default,
    }
}

/// Pick the system resource matching a node ordinal, by vendor rule.
pub fn system_uri_for(
    xname: &str,
    node_number: u32,
    vendor: Vendor,
    systems: &MemberList,
) -> Result<String> {
    match vendor {
        Vendor::Hpe => {
            let suffix = format!("/{}", node_number + 1);
            for member in &systems.members {
                if member.id.ends_with(&suffix) {
                    return Ok(member.id.clone());
                }
            }
        }
        Vendor::Cray => {
            let suffix = format!("/node{}", node_number);
            for member in &systems.members {
                if member.id.to_lowercase().ends_with(&suffix) {
                    return Ok(member.id.clone());
                }
            }
        }
        Vendor::Gigabyte => {
            if node_number == 0 {
                for member in &systems.members {
                    if member.id.to_lowercase().ends_with("/self") {
                        return Ok(member.id.clone());
                    }
                }
            }
        }
        Vendor::Intel => {
            if let Some(member) = systems.members.get(node_number as usize) {
                return Ok(member.id.clone());
            }
        }
        Vendor::Unknown => {}
    }
    Err(ShepherdError::SystemNotFound {
        xname: xname.to_string(),
        known: systems.members.iter().map(|m| m.id.clone()).collect(),
    })
}

/// Find a registry attribute by display name, ignoring case and padding.
pub fn registry_attribute<'a>(
    name: &str,
    registry: &'a AttributeRegistry,
) -> Option<&'a RegistryAttribute> {
    let want = name.to_lowercase();
    registry
        .registry_entries
        .attributes
        .iter()
        .find(|a| a.display_name.trim().to_lowercase() == want)
}

/// Single-target GET that fails the request on any bad status.
async fn get_one<T: serde::de::DeserializeOwned>(
    engine: &Engine,
    bmc: &str,
    path: &str,
) -> Result<T> {
    let mut batch = Batch::get(&[bmc.to_string()], path);
    batch.dispatch(engine).await?;
    batch.check_status()?;
    batch.tasks[0].parse()
}

/// Single-target GET where a 404 is expected (no staged settings).
async fn get_one_optional<T: serde::de::DeserializeOwned>(
    engine: &Engine,
    bmc: &str,
    path: &str,
) -> Result<Option<T>> {
    let mut batch = Batch::get(&[bmc.to_string()], path);
    batch.dispatch(engine).await?;
    let task = &batch.tasks[0];
    let code = task.status_code();
    if code == 404 {
        return Ok(None);
    }
    if !engine::ok_status(code) {
        return Err(ShepherdError::BadStatus {
            url: format!("{}{}", task.target, task.path),
            code,
        });
    }
    Ok(Some(task.parse()?))
}

/// Single-target PATCH, optionally with an `If-Match` tag.
async fn patch_one(
    engine: &Engine,
    bmc: &str,
    path: &str,
    body: Vec<u8>,
    etag: Option<&str>,
) -> Result<()> {
    let mut task = HttpTask::request(bmc.to_string(), Method::PATCH, path, Some(body));
    if let Some(tag) = etag {
        task.header(ET_IFMATCH, tag);
    }
    let mut batch = Batch::new(vec![task]);
    batch.dispatch(engine).await?;
    let code = batch.tasks[0].status_code();
    if !engine::ok_status(code) {
        error!("Redfish patch failed {} {}", path, code);
        return Err(ShepherdError::BadStatus {
            url: format!("{}{}", bmc, path),
            code,
        });
    }
    Ok(())
}

/// Common preamble: resolve the node, verify its BMC, find the system and
/// BIOS URIs.
pub async fn bios_common(state: &AppState, xname_in: &str) -> Result<BiosCommon> {
    let xn = xname::verify_normalize(xname_in)
        .ok_or_else(|| ShepherdError::BadXname(xname_in.to_string()))?;
    if xname::kind(&xn) != XnameKind::Node {
        return Err(ShepherdError::NotANode(xname_in.to_string()));
    }
    let node_number = xname::node_number(&xn)?;
    let bmc_xname = xname::parent_of(&xn);

    state
        .hsm
        .verify(make_targets(&[bmc_xname.clone()]), true, true)
        .await?;

    let engine = &state.engine;
    let chassis: MemberList = get_one(engine, &bmc_xname, RFCHASSIS_API).await?;
    let systems: MemberList = get_one(engine, &bmc_xname, RFSYSTEMS_API).await?;

    let vendor = vendor::classify(&bmc_xname, &chassis.members);
    if vendor == Vendor::Unknown {
        let members: Vec<&str> = chassis.members.iter().map(|m| m.id.as_str()).collect();
        error!(
            "unknown manufacturer for {}, chassis members: {:?}",
            xn, members
        );
        return Err(ShepherdError::UnsupportedHardware(xn));
    }

    let system_uri = system_uri_for(&xn, node_number, vendor, &systems)?;
    let system: System = get_one(engine, &bmc_xname, &system_uri).await?;

    Ok(BiosCommon {
        xname: xn,
        bmc_xname,
        node_number,
        vendor,
        system_uri,
        bios_uri: system.bios.id,
    })
}

// Projections.  Pure; unit-tested against the shapes each vendor returns.

pub fn tpm_from_hpe(current: &BiosHpe, future: &BiosHpe) -> BiosTpmState {
    let map = |v: &str| match v {
        ENABLED_HPE => TpmState::Enabled,
        DISABLED_HPE => TpmState::Disabled,
        _ => TpmState::NotPresent,
    };
    BiosTpmState {
        current: map(&current.attributes.tpm_state),
        future: map(&future.attributes.tpm_state),
    }
}

fn tpm_value_gigabyte(v: &Value) -> TpmState {
    match value_text(v).as_str() {
        ENABLED_GIGABYTE => TpmState::Enabled,
        DISABLED_GIGABYTE => TpmState::Disabled,
        _ => TpmState::NotPresent,
    }
}

pub fn tpm_from_gigabyte(
    current: &BiosGigabyte,
    future: &BiosSettings,
    registry: &AttributeRegistry,
) -> BiosTpmState {
    let mut state = BiosTpmState {
        current: TpmState::NotPresent,
        future: TpmState::NotPresent,
    };
    let Some(attribute) = registry_attribute(TPM_ATTR_GIGABYTE, registry) else {
        return state;
    };
    match current.attributes.get(&attribute.attribute_name) {
        Some(value) => {
            state.current = tpm_value_gigabyte(value);
            state.future = match future.attributes.get(&attribute.attribute_name) {
                Some(fv) => tpm_value_gigabyte(fv),
                None => state.current,
            };
        }
        None => {
            error!(
                "registry describes '{}' but it is missing from the current BIOS settings",
                attribute.attribute_name
            );
        }
    }
    state
}

fn tpm_value_cray(v: &Value) -> TpmState {
    match value_text(v).as_str() {
        ENABLED_CRAY => TpmState::Enabled,
        DISABLED_CRAY => TpmState::Disabled,
        _ => TpmState::NotPresent,
    }
}

pub fn tpm_from_cray(current: &BiosCray, future: &BiosSettings) -> BiosTpmState {
    let mut state = BiosTpmState {
        current: TpmState::NotPresent,
        future: TpmState::NotPresent,
    };
    if let Some(attribute) = current.attributes.get(TPM_ATTR_CRAY) {
        if let Some(value) = &attribute.current_value {
            state.current = tpm_value_cray(value);
        }
        state.future = match future.attributes.get(TPM_ATTR_CRAY) {
            Some(fv) => tpm_value_cray(fv),
            None => state.current,
        };
    }
    state
}

pub fn tpm_from_intel(current: &BiosSettings, future: &BiosSettings) -> BiosTpmState {
    // The attribute values are numbers in practice, but firmware has been
    // seen sending them as strings; either flavor of 0/1 counts.
    let mut found = false;
    let mut tpm_op: i64 = -1;
    if let Some(v) = current.attributes.get(TPM_ATTR_INTEL) {
        found = true;
        tpm_op = value_int(v, tpm_op);
    }
    let mut tpm2_op: i64 = -1;
    if let Some(v) = current.attributes.get(TPM_ATTR_INTEL2) {
        found = true;
        tpm2_op = value_int(v, tpm2_op);
    }

    let mut tpm_op_future = tpm_op;
    if let Some(v) = future.attributes.get(TPM_ATTR_INTEL) {
        tpm_op_future = value_int(v, tpm_op_future);
    }
    let mut tpm2_op_future = tpm2_op;
    if let Some(v) = future.attributes.get(TPM_ATTR_INTEL2) {
        tpm2_op_future = value_int(v, tpm2_op_future);
    }

    if !found {
        return BiosTpmState {
            current: TpmState::NotPresent,
            future: TpmState::NotPresent,
        };
    }
    let to_state = |a: i64, b: i64| {
        if a == ENABLED_INTEL || b == ENABLED_INTEL {
            TpmState::Enabled
        } else {
            TpmState::Disabled
        }
    };
    BiosTpmState {
        current: to_state(tpm_op, tpm2_op),
        future: to_state(tpm_op_future, tpm2_op_future),
    }
}

/// `{"Attributes": {name: value}}`
fn attributes_body(name: &str, value: &Value) -> Vec<u8> {
    json!({ "Attributes": { (name): value } })
        .to_string()
        .into_bytes()
}

/// Read the TPM projection for a node.
pub async fn tpm_state(state: &AppState, xname_in: &str) -> Result<BiosTpmState> {
    let common = bios_common(state, xname_in).await?;
    let engine = &state.engine;
    let bmc = &common.bmc_xname;

    match common.vendor {
        Vendor::Hpe => {
            let current: BiosHpe = get_one(engine, bmc, &common.bios_uri).await?;
            let future_uri = format!("{}/Settings", common.bios_uri);
            let future: BiosHpe = get_one_optional(engine, bmc, &future_uri)
                .await?
                .unwrap_or_else(|| current.clone());
            Ok(tpm_from_hpe(&current, &future))
        }
        Vendor::Cray => {
            let current: BiosCray = get_one(engine, bmc, &common.bios_uri).await?;
            let future_uri = format!("{}/SD", common.bios_uri);
            let future: BiosSettings = get_one_optional(engine, bmc, &future_uri)
                .await?
                .unwrap_or_default();
            Ok(tpm_from_cray(&current, &future))
        }
        Vendor::Gigabyte => {
            let current: BiosGigabyte = get_one(engine, bmc, &common.bios_uri).await?;
            let future_uri = if current.settings.settings_object.id.is_empty() {
                format!("{}/SD", common.bios_uri)
            } else {
                current.settings.settings_object.id.clone()
            };
            let future: BiosSettings = get_one_optional(engine, bmc, &future_uri)
                .await?
                .unwrap_or_default();
            let registry: AttributeRegistry =
                get_one(engine, bmc, "/redfish/v1/Registries/BiosAttributeRegistry.json").await?;
            Ok(tpm_from_gigabyte(&current, &future, &registry))
        }
        Vendor::Intel => {
            let current: BiosSettings = get_one(engine, bmc, &common.bios_uri).await?;
            let future_uri = format!("{}/Settings", common.bios_uri);
            let future: BiosSettings = get_one_optional(engine, bmc, &future_uri)
                .await?
                .unwrap_or_default();
            Ok(tpm_from_intel(&current, &future))
        }
        Vendor::Unknown => Err(ShepherdError::UnsupportedHardware(common.xname)),
    }
}

/// iLO keeps its attribute registry behind a language-indexed walk.
async fn hpe_attribute_registry(engine: &Engine, bmc: &str) -> Result<AttributeRegistry> {
    let registries: MemberList = get_one(engine, bmc, RFREGISTRIES_API).await?;
    let registry_uri = registries
        .members
        .iter()
        .map(|m| m.id.as_str())
        .find(|id| {
            id.to_lowercase()
                .starts_with("/redfish/v1/registries/biosattributeregistry")
        })
        .ok_or_else(|| {
            ShepherdError::Internal(format!("could not find a BIOS attribute registry on {}", bmc))
        })?
        .to_string();

    let locations: AttributeRegistryLocations = get_one(engine, bmc, &registry_uri).await?;
    let en_uri = locations
        .location
        .iter()
        .find(|l| l.language.eq_ignore_ascii_case("en"))
        .map(|l| l.uri.clone())
        .ok_or_else(|| {
            ShepherdError::Internal(format!(
                "could not find an english BIOS registry uri on {}",
                bmc
            ))
        })?;

    get_one(engine, bmc, &en_uri).await
}

/// Stage a new TPM state.  The requested projection is translated to the
/// vendor's attribute value and validated against the allowed set before
/// anything is written.
pub async fn set_tpm_state(state: &AppState, xname_in: &str, future: TpmState) -> Result<()> {
    let common = bios_common(state, xname_in).await?;
    let engine = &state.engine;
    let bmc = &common.bmc_xname;

    match common.vendor {
        Vendor::Cray => {
            let value = match future {
                TpmState::Enabled => ENABLED_CRAY,
                TpmState::Disabled => DISABLED_CRAY,
                TpmState::NotPresent => {
                    return Err(ShepherdError::ValueNotAllowed {
                        name: TPM_ATTR_CRAY.to_string(),
                        value: "NotPresent".to_string(),
                    })
                }
            };
            let current: BiosCray = get_one(engine, bmc, &common.bios_uri).await?;
            let attribute = current.attributes.get(TPM_ATTR_CRAY).ok_or_else(|| {
                ShepherdError::AttributeNotSupported(TPM_ATTR_CRAY.to_string())
            })?;
            if !attribute
                .allowable_values
                .iter()
                .any(|v| value_text(v) == value)
            {
                error!(
                    "tried to set {} to {}, but the BIOS only supports {:?}",
                    TPM_ATTR_CRAY, value, attribute.allowable_values
                );
                return Err(ShepherdError::ValueNotAllowed {
                    name: TPM_ATTR_CRAY.to_string(),
                    value: value.to_string(),
                });
            }
            let future_uri = format!("{}/SD", common.bios_uri);
            let staged: BiosSettings = get_one_optional(engine, bmc, &future_uri)
                .await?
                .unwrap_or_default();
            // absent staged settings still need an If-Match the firmware
            // will accept
            let etag = if staged.etag.is_empty() {
                "*".to_string()
            } else {
                staged.etag
            };
            patch_one(
                engine,
                bmc,
                &future_uri,
                attributes_body(TPM_ATTR_CRAY, &Value::String(value.to_string())),
                Some(&etag),
            )
            .await
        }
        Vendor::Gigabyte => {
            let value = match future {
                TpmState::Enabled => ENABLED_GIGABYTE,
                TpmState::Disabled => DISABLED_GIGABYTE,
                TpmState::NotPresent => {
                    return Err(ShepherdError::ValueNotAllowed {
                        name: TPM_ATTR_GIGABYTE.to_string(),
                        value: "NotPresent".to_string(),
                    })
                }
            };
            let current: BiosGigabyte = get_one(engine, bmc, &common.bios_uri).await?;
            let registry: AttributeRegistry =
                get_one(engine, bmc, "/redfish/v1/Registries/BiosAttributeRegistry.json").await?;
            let attribute = registry_attribute(TPM_ATTR_GIGABYTE, &registry).ok_or_else(|| {
                ShepherdError::AttributeNotSupported(TPM_ATTR_GIGABYTE.to_string())
            })?;
            if !attribute.value.iter().any(|v| v.value_name == value) {
                error!(
                    "tried to set {} to {}, but the BIOS only supports {:?}",
                    TPM_ATTR_GIGABYTE,
                    value,
                    attribute
                        .value
                        .iter()
                        .map(|v| v.value_name.as_str())
                        .collect::<Vec<_>>()
                );
                return Err(ShepherdError::ValueNotAllowed {
                    name: TPM_ATTR_GIGABYTE.to_string(),
                    value: value.to_string(),
                });
            }
            let future_uri = if current.settings.settings_object.id.is_empty() {
                format!("{}/SD", common.bios_uri)
            } else {
                current.settings.settings_object.id.clone()
            };
            let staged: BiosSettings = get_one_optional(engine, bmc, &future_uri)
                .await?
                .unwrap_or_default();
            // the firmware rejects a PATCH without If-Match outright
            let etag = if staged.etag.is_empty() {
                "*".to_string()
            } else {
                staged.etag
            };
            patch_one(
                engine,
                bmc,
                &future_uri,
                attributes_body(
                    &attribute.attribute_name,
                    &Value::String(value.to_string()),
                ),
                Some(&etag),
            )
            .await
        }
        Vendor::Hpe => {
            let value = match future {
                TpmState::Enabled => ENABLED_HPE,
                TpmState::Disabled => DISABLED_HPE,
                TpmState::NotPresent => {
                    return Err(ShepherdError::ValueNotAllowed {
                        name: TPM_ATTR_HPE.to_string(),
                        value: "NotPresent".to_string(),
                    })
                }
            };
            let registry = hpe_attribute_registry(engine, bmc).await?;
            let supported = registry
                .registry_entries
                .attributes
                .iter()
                .find(|a| a.attribute_name.eq_ignore_ascii_case(TPM_ATTR_HPE))
                .map(|a| a.value.iter().any(|v| v.value_name == value))
                .unwrap_or(false);
            if !supported {
                return Err(ShepherdError::ValueNotAllowed {
                    name: TPM_ATTR_HPE.to_string(),
                    value: value.to_string(),
                });
            }
            let future_uri = format!("{}/Settings", common.bios_uri);
            patch_one(
                engine,
                bmc,
                &future_uri,
                attributes_body(TPM_ATTR_HPE, &Value::String(value.to_string())),
                None,
            )
            .await
        }
        Vendor::Intel => Err(ShepherdError::NotImplemented(
            "TPM state modification is not implemented for Intel hardware".to_string(),
        )),
        Vendor::Unknown => Err(ShepherdError::UnsupportedHardware(common.xname)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ODataId;

    fn systems(uris: &[&str]) -> MemberList {
        MemberList {
            members: uris.iter().map(|u| ODataId::new(*u)).collect(),
        }
    }

    #[test]
    fn system_uri_selection() {
        let none = systems(&[]);
        assert!(system_uri_for("x0c0s0b0n0", 0, Vendor::Hpe, &none).is_err());

        let cray = systems(&["/redfish/v1/Systems/Node1", "/redfish/v1/Systems/Node0"]);
        assert_eq!(
            system_uri_for("x0c0s0b0n0", 0, Vendor::Cray, &cray).unwrap(),
            "/redfish/v1/Systems/Node0"
        );
        assert_eq!(
            system_uri_for("x0c0s0b0n1", 1, Vendor::Cray, &cray).unwrap(),
            "/redfish/v1/Systems/Node1"
        );

        let hpe = systems(&["/redfish/v1/Systems/1"]);
        assert_eq!(
            system_uri_for("x0c0s0b0n0", 0, Vendor::Hpe, &hpe).unwrap(),
            "/redfish/v1/Systems/1"
        );
        assert!(system_uri_for("x0c0s0b0n1", 1, Vendor::Hpe, &hpe).is_err());

        let gb = systems(&["/redfish/v1/Systems/Self"]);
        assert_eq!(
            system_uri_for("x0c0s0b0n0", 0, Vendor::Gigabyte, &gb).unwrap(),
            "/redfish/v1/Systems/Self"
        );
        assert!(system_uri_for("x0c0s0b0n1", 1, Vendor::Gigabyte, &gb).is_err());

        let intel = systems(&["/redfish/v1/Systems/BQWF73500342"]);
        assert_eq!(
            system_uri_for("x0c0s0b0n0", 0, Vendor::Intel, &intel).unwrap(),
            "/redfish/v1/Systems/BQWF73500342"
        );
        assert!(system_uri_for("x0c0s0b0n1", 1, Vendor::Intel, &intel).is_err());
    }

    #[test]
    fn hpe_projection() {
        // current PresentEnabled, staged PresentDisabled
        let current: BiosHpe =
            serde_json::from_str(r#"{"Attributes":{"TpmState":"PresentEnabled"}}"#).unwrap();
        let future: BiosHpe =
            serde_json::from_str(r#"{"Attributes":{"TpmState":"PresentDisabled"}}"#).unwrap();
        let state = tpm_from_hpe(&current, &future);
        assert_eq!(state.current, TpmState::Enabled);
        assert_eq!(state.future, TpmState::Disabled);

        let absent: BiosHpe = serde_json::from_str(r#"{"Attributes":{}}"#).unwrap();
        let state = tpm_from_hpe(&absent, &absent);
        assert_eq!(state.current, TpmState::NotPresent);
        assert_eq!(state.future, TpmState::NotPresent);
    }

    #[test]
    fn intel_projection_falls_back_to_current() {
        // TpmOperation absent everywhere; Tpm2Operation present (1) only
        // in the current settings.
        let current: BiosSettings =
            serde_json::from_str(r#"{"Attributes":{"Tpm2Operation":1}}"#).unwrap();
        let future: BiosSettings = serde_json::from_str(r#"{"Attributes":{}}"#).unwrap();
        let state = tpm_from_intel(&current, &future);
        assert_eq!(state.current, TpmState::Enabled);
        assert_eq!(state.future, TpmState::Enabled);

        let nothing: BiosSettings = serde_json::from_str(r#"{"Attributes":{}}"#).unwrap();
        let state = tpm_from_intel(&nothing, &nothing);
        assert_eq!(state.current, TpmState::NotPresent);
        assert_eq!(state.future, TpmState::NotPresent);

        let zero: BiosSettings =
            serde_json::from_str(r#"{"Attributes":{"TpmOperation":0}}"#).unwrap();
        let state = tpm_from_intel(&zero, &nothing);
        assert_eq!(state.current, TpmState::Disabled);
        assert_eq!(state.future, TpmState::Disabled);
    }

    #[test]
    fn cray_projection() {
        let current: BiosCray = serde_json::from_str(
            r#"{"@odata.etag":"W/\"1665087620\"","Attributes":{
                "TPM Control":{"AllowableValues":["Disabled","Enabled"],
                               "DataType":"string","current_value":"Enabled"}}}"#,
        )
        .unwrap();
        let staged: BiosSettings =
            serde_json::from_str(r#"{"Attributes":{"TPM Control":"Disabled"}}"#).unwrap();
        let state = tpm_from_cray(&current, &staged);
        assert_eq!(state.current, TpmState::Enabled);
        assert_eq!(state.future, TpmState::Disabled);

        // no staged change: future mirrors current
        let state = tpm_from_cray(&current, &BiosSettings::default());
        assert_eq!(state.future, TpmState::Enabled);
    }

    #[test]
    fn gigabyte_projection_goes_through_the_registry() {
        let registry: AttributeRegistry = serde_json::from_str(
            r#"{"RegistryEntries":{"Attributes":[
                {"AttributeName":"TCG001","DisplayName":"  TPM State",
                 "Value":[{"ValueName":"Disabled"},{"ValueName":"Enabled"}]}]}}"#,
        )
        .unwrap();
        let current: BiosGigabyte =
            serde_json::from_str(r#"{"Attributes":{"TCG001":"Enabled","FBO001":"UEFI"}}"#).unwrap();
        let staged: BiosSettings =
            serde_json::from_str(r#"{"Attributes":{"TCG001":"Disabled"}}"#).unwrap();
        let state = tpm_from_gigabyte(&current, &staged, &registry);
        assert_eq!(state.current, TpmState::Enabled);
        assert_eq!(state.future, TpmState::Disabled);

        let state = tpm_from_gigabyte(&current, &BiosSettings::default(), &registry);
        assert_eq!(state.future, TpmState::Enabled);

        // registry without the attribute: not present
        let empty: AttributeRegistry =
            serde_json::from_str(r#"{"RegistryEntries":{"Attributes":[]}}"#).unwrap();
        let state = tpm_from_gigabyte(&current, &staged, &empty);
        assert_eq!(state.current, TpmState::NotPresent);
    }

    #[test]
    fn patch_body_shape() {
        let body = attributes_body("TpmState", &Value::String("PresentEnabled".to_string()));
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["Attributes"]["TpmState"], "PresentEnabled");
    }
}
