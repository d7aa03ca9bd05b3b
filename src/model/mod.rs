use serde::{Deserialize, Serialize};

pub mod account_service;
pub mod bios;
pub mod certificate;
pub mod network_protocol;

/// A bare `@odata.id` reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ODataId {
    #[serde(rename = "@odata.id", default)]
    pub id: String,
}

impl ODataId {
    pub fn new(id: impl Into<String>) -> Self {
        ODataId { id: id.into() }
    }
}

/// Any Redfish collection we only need the member references of
/// (`/redfish/v1/Chassis`, `/redfish/v1/Systems`, account collections,
/// registry collections).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberList {
    #[serde(rename = "Members", default)]
    pub members: Vec<ODataId>,
}
