//! Target expansion and validation against the hardware state manager.

use std::collections::HashMap;
use std::fmt;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, trace};

use crate::error::{Result, ShepherdError};
use crate::xname::{self, strip_port, XnameKind};

/// Component states the state manager reports.  Only `On` and `Ready` are
/// viable for Redfish configuration traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HsmState {
    Unknown,
    Empty,
    Populated,
    Off,
    On,
    Standby,
    Halt,
    Ready,
}

impl HsmState {
    pub fn parse(s: &str) -> HsmState {
        match s {
            "Empty" => HsmState::Empty,
            "Populated" => HsmState::Populated,
            "Off" => HsmState::Off,
            "On" => HsmState::On,
            "Standby" => HsmState::Standby,
            "Halt" => HsmState::Halt,
            "Ready" => HsmState::Ready,
            _ => HsmState::Unknown,
        }
    }
}

impl fmt::Display for HsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HsmState::Unknown => "Unknown",
            HsmState::Empty => "Empty",
            HsmState::Populated => "Populated",
            HsmState::Off => "Off",
            HsmState::On => "On",
            HsmState::Standby => "Standby",
            HsmState::Halt => "Halt",
            HsmState::Ready => "Ready",
        };
        write!(f, "{}", s)
    }
}

/// Is a component in a state we will touch?
pub fn good_state(state: HsmState) -> bool {
    matches!(state, HsmState::On | HsmState::Ready)
}

/// Everything the walkers track about one Redfish target.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    /// An xname (possibly `:port`-suffixed) or a group label.
    pub target: String,
    /// Group label this target was expanded from, or empty.
    pub group: String,
    /// The target is a group label that expanded to at least one
    /// controller; no Redfish traffic is ever sent to it.
    pub group_matched: bool,
    pub state: HsmState,
    /// Trustworthy only after the Mountain/River classification pass.
    pub is_mountain: bool,
    /// Status of the most recent Redfish operation.
    pub status_code: u16,
    pub err: Option<String>,
}

impl TargetInfo {
    pub fn new(target: impl Into<String>) -> TargetInfo {
        TargetInfo {
            target: target.into(),
            group: String::new(),
            group_matched: false,
            state: HsmState::Unknown,
            is_mountain: false,
            status_code: crate::engine::STATUS_NONE,
            err: None,
        }
    }
}

/// Build bare descriptors from raw target strings.
pub fn make_targets(targets: &[String]) -> Vec<TargetInfo> {
    targets.iter().map(TargetInfo::new).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Component {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(rename = "State", default)]
    pub state: String,
}

#[derive(Debug, Default, Deserialize)]
struct ComponentList {
    #[serde(rename = "Components", default)]
    components: Vec<Component>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Group {
    #[serde(rename = "label", default)]
    pub label: String,
    #[serde(rename = "members", default)]
    pub members: GroupMembers,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupMembers {
    #[serde(rename = "ids", default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ComponentQuery {
    #[serde(rename = "ComponentIDs")]
    component_ids: Vec<String>,
    #[serde(rename = "type", skip_serializing_if = "Vec::is_empty")]
    kinds: Vec<String>,
    #[serde(rename = "stateonly")]
    state_only: bool,
}

const BMC_TYPE_QUERY: &str =
    "type=NodeBMC&type=ChassisBMC&type=RouterBMC&type=CabinetBMC&stateonly=true";

/// State manager client.  One instance per process; the state manager is
/// reached over the service mesh, so certificate validation stays off.
pub struct Hsm {
    base: String,
    client: Client,
}

impl Hsm {
    pub fn new(base_url: &str) -> Result<Hsm> {
        let client = Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Hsm {
            base: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, tail: &str) -> Result<T> {
        let url = format!("{}{}", self.base, tail);
        let rsp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ShepherdError::Inventory(format!("GET {}: {}", url, e)))?;
        if !rsp.status().is_success() {
            return Err(ShepherdError::Inventory(format!(
                "bad return status from state manager: {}",
                rsp.status().as_u16()
            )));
        }
        rsp.json()
            .await
            .map_err(|e| ShepherdError::Inventory(format!("decoding {}: {}", url, e)))
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        tail: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base, tail);
        let rsp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ShepherdError::Inventory(format!("POST {}: {}", url, e)))?;
        if !rsp.status().is_success() {
            return Err(ShepherdError::Inventory(format!(
                "bad return status from state manager: {}",
                rsp.status().as_u16()
            )));
        }
        rsp.json()
            .await
            .map_err(|e| ShepherdError::Inventory(format!("decoding {}: {}", url, e)))
    }

    pub async fn groups(&self) -> Result<Vec<Group>> {
        self.get_json("/groups").await
    }

    /// All BMC-class components, state-only projection.
    pub async fn bmc_components(&self) -> Result<Vec<Component>> {
        let list: ComponentList = self
            .get_json(&format!("/State/Components?{}", BMC_TYPE_QUERY))
            .await?;
        Ok(list.components)
    }

    /// All components of one type, state-only projection.
    pub async fn components_of_type(&self, kind: Option<&str>) -> Result<Vec<Component>> {
        let tail = match kind {
            Some(k) => format!("/State/Components?type={}&stateonly=true", k),
            None => format!("/State/Components?{}", BMC_TYPE_QUERY),
        };
        let list: ComponentList = self.get_json(&tail).await?;
        Ok(list.components)
    }

    /// Targeted state query for a set of component ids.
    pub async fn components_query(
        &self,
        ids: &[String],
        kind: Option<&str>,
    ) -> Result<Vec<Component>> {
        let query = ComponentQuery {
            component_ids: ids.to_vec(),
            kinds: kind.map(|k| vec![k.to_string()]).unwrap_or_default(),
            state_only: true,
        };
        let list: ComponentList = self.post_json("/State/Components/Query", &query).await?;
        Ok(list.components)
    }

    /// Hint the state manager to rediscover endpoints whose credentials
    /// changed.  Failures are logged, not raised; discovery catches up on
    /// its own schedule.
    pub async fn discover(&self, xnames: &[String]) {
        if xnames.is_empty() {
            return;
        }
        let body = json!({ "xnames": xnames, "force": true });
        let url = format!("{}/Inventory/Discover", self.base);
        match self.client.post(&url).json(&body).send().await {
            Ok(rsp) if rsp.status().is_success() => {
                debug!("rediscovery requested for {} endpoint(s)", xnames.len());
            }
            Ok(rsp) => {
                error!(
                    "bad return status from state manager discovery: {}",
                    rsp.status().as_u16()
                );
            }
            Err(e) => {
                error!("problem contacting state manager for discovery: {}", e);
            }
        }
    }

    /// Verify a target list against the state manager, optionally expanding
    /// group labels into their controller members.
    ///
    /// With `force` the state manager is skipped entirely: names that parse
    /// are marked Ready, everything else Unknown.  Otherwise group labels
    /// are expanded (when `expand_groups`) and a single bulk state query
    /// fills in the state of every named controller.
    pub async fn verify(
        &self,
        targets: Vec<TargetInfo>,
        force: bool,
        expand_groups: bool,
    ) -> Result<Vec<TargetInfo>> {
        if force {
            let mut out = Vec::with_capacity(targets.len());
            for t in &targets {
                let state = match xname::verify_normalize(strip_port(&t.target)) {
                    Some(_) => HsmState::Ready,
                    None => HsmState::Unknown,
                };
                let mut ht = TargetInfo::new(t.target.clone());
                ht.state = state;
                out.push(ht);
            }
            return Ok(out);
        }

        let mut check_list: Vec<TargetInfo> = Vec::with_capacity(targets.len());
        let mut check_groups = false;
        for t in &targets {
            if xname::verify_normalize(strip_port(&t.target)).is_none() {
                check_groups = true;
            }
            check_list.push(TargetInfo::new(t.target.clone()));
        }

        if check_groups && expand_groups {
            let groups = self.groups().await?;
            let labels: HashMap<String, usize> = check_list
                .iter()
                .enumerate()
                .map(|(ii, t)| (t.target.clone(), ii))
                .collect();

            let mut expanded: Vec<TargetInfo> = Vec::new();
            for group in &groups {
                trace!("group label: '{}'", group.label);
                let Some(&targ_ix) = labels.get(&group.label) else {
                    continue;
                };

                // Matched a group label.  Pull in every member that is a
                // controller; non-BMC members are silently dropped.
                let before = expanded.len();
                for member in &group.members.ids {
                    let ctype = match xname::verify_normalize(strip_port(member)) {
                        Some(xn) => xname::kind(&xn),
                        None => XnameKind::Invalid,
                    };
                    if ctype.is_controller() {
                        let mut ht = TargetInfo::new(member.clone());
                        ht.group = group.label.clone();
                        expanded.push(ht);
                        trace!("added group '{}' member: '{}'", group.label, member);
                    }
                }
                if expanded.len() > before {
                    check_list[targ_ix].group_matched = true;
                }
            }
            check_list.extend(expanded);
        }

        // Bulk state query; match results back onto the checklist.
        let components = self.bmc_components().await?;
        let mut by_id: HashMap<String, HsmState> = HashMap::new();
        for comp in &components {
            by_id.insert(comp.id.clone(), HsmState::parse(&comp.state));
        }
        for entry in check_list.iter_mut() {
            if entry.group_matched {
                continue;
            }
            let key = strip_port(&entry.target);
            if let Some(&state) = by_id.get(key).or_else(|| by_id.get(entry.target.as_str())) {
                if good_state(state) {
                    entry.state = state;
                }
            }
        }

        Ok(check_list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_parse_and_goodness() {
        assert_eq!(HsmState::parse("Ready"), HsmState::Ready);
        assert_eq!(HsmState::parse("On"), HsmState::On);
        assert_eq!(HsmState::parse("Borked"), HsmState::Unknown);
        assert!(good_state(HsmState::Ready));
        assert!(good_state(HsmState::On));
        assert!(!good_state(HsmState::Off));
        assert!(!good_state(HsmState::Unknown));
    }

    #[test]
    fn make_targets_preserves_order() {
        let raw = vec!["x0c0s0b0".to_string(), "grp1".to_string()];
        let targs = make_targets(&raw);
        assert_eq!(targs.len(), 2);
        assert_eq!(targs[0].target, "x0c0s0b0");
        assert_eq!(targs[1].target, "grp1");
        assert!(!targs[1].group_matched);
        assert_eq!(targs[0].state, HsmState::Unknown);
    }
}
