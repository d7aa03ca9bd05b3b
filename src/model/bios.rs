use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::ODataId;

/// The slice of a ComputerSystem resource the BIOS walker needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct System {
    #[serde(rename = "Bios", default)]
    pub bios: ODataId,
}

/// iLO BIOS resources carry typed attributes; TpmState is the one we read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BiosHpe {
    #[serde(rename = "Attributes", default)]
    pub attributes: BiosHpeAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BiosHpeAttributes {
    #[serde(rename = "TpmState", default)]
    pub tpm_state: String,
}

/// Gigabyte current settings.  Attribute values are opaque strings or
/// numbers keyed by registry attribute names like `TCG001`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BiosGigabyte {
    #[serde(rename = "@Redfish.Settings", default)]
    pub settings: RedfishSettings,
    #[serde(rename = "@odata.etag", default)]
    pub etag: String,
    #[serde(rename = "Attributes", default)]
    pub attributes: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedfishSettings {
    #[serde(rename = "SettingsObject", default)]
    pub settings_object: ODataId,
}

/// Pending-settings shape shared by Gigabyte `/SD`, Cray `/SD` and the
/// Intel current/pending pair: an etag plus a free-form attribute map.
/// The map is empty when nothing is staged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BiosSettings {
    #[serde(rename = "@odata.etag", default)]
    pub etag: String,
    #[serde(rename = "Attributes", default)]
    pub attributes: HashMap<String, Value>,
}

/// Cray current settings embed the allowed values per attribute.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BiosCray {
    #[serde(rename = "@odata.etag", default)]
    pub etag: String,
    #[serde(rename = "Attributes", default)]
    pub attributes: HashMap<String, BiosAttributeCray>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BiosAttributeCray {
    #[serde(rename = "AllowableValues", default)]
    pub allowable_values: Vec<Value>,
    #[serde(rename = "DataType", default)]
    pub data_type: String,
    #[serde(rename = "current_value")]
    pub current_value: Option<Value>,
}

// BIOS attribute registry, used to validate writes.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttributeRegistryLocations {
    #[serde(rename = "Location", default)]
    pub location: Vec<RegistryLocation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryLocation {
    #[serde(rename = "Language", default)]
    pub language: String,
    #[serde(rename = "Uri", default)]
    pub uri: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttributeRegistry {
    #[serde(rename = "RegistryEntries", default)]
    pub registry_entries: RegistryEntries,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryEntries {
    #[serde(rename = "Attributes", default)]
    pub attributes: Vec<RegistryAttribute>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryAttribute {
    #[serde(rename = "AttributeName", default)]
    pub attribute_name: String,
    #[serde(rename = "DisplayName", default)]
    pub display_name: String,
    #[serde(rename = "Value", default)]
    pub value: Vec<RegistryValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryValue {
    #[serde(rename = "ValueName", default)]
    pub value_name: String,
    #[serde(rename = "ValueDisplayName", default)]
    pub value_display_name: String,
}
