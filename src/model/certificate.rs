use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use super::ODataId;

/// An entry under a Redfish `Actions` object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionTarget {
    #[serde(rename = "target", default)]
    pub target: String,
}

// Liquid-cooled controllers (and the rack PDUs sharing their schema)
// publish a standard CertificateService.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateService {
    #[serde(rename = "Actions", default)]
    pub actions: CertificateServiceActions,
    #[serde(rename = "CertificateLocations", default)]
    pub certificate_locations: ODataId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateServiceActions {
    #[serde(rename = "#CertificateService.ReplaceCertificate", default)]
    pub replace_certificate: ActionTarget,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateLocations {
    #[serde(rename = "Links", default)]
    pub links: CertificateLocationLinks,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateLocationLinks {
    #[serde(rename = "Certificates", default)]
    pub certificates: Vec<ODataId>,
}

// iLO hides cert import behind an OEM security service walk.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HpeManager {
    #[serde(rename = "Oem", default)]
    pub oem: HpeManagerOem,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HpeManagerOem {
    // iLO 5 emits "Hpe", older firmware "HPE"
    #[serde(rename = "Hpe", alias = "HPE", default)]
    pub hpe: HpeManagerOemHpe,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HpeManagerOemHpe {
    #[serde(rename = "Links", default)]
    pub links: HpeSecurityServiceLink,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HpeSecurityServiceLink {
    #[serde(rename = "SecurityService", default)]
    pub security_service: ODataId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HpeSecurityService {
    #[serde(rename = "Links", default)]
    pub links: HpeHttpsCertLink,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HpeHttpsCertLink {
    #[serde(rename = "HttpsCert", default)]
    pub https_cert: ODataId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HpeHttpsCert {
    #[serde(rename = "Actions", default)]
    pub actions: HpeHttpsCertActions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HpeHttpsCertActions {
    #[serde(rename = "#HpeHttpsCert.ImportCertificate", default)]
    pub import_certificate: ActionTarget,
}

/// Certificate replacement POST body.  iLO takes the PEM under
/// `Certificate`; everyone else wants `CertificateString` plus the type and
/// the URI of the cert being replaced.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificatePayload {
    #[serde(rename = "Certificate")]
    pub certificate: Option<String>,
    #[serde(rename = "CertificateString")]
    pub certificate_string: Option<String>,
    #[serde(rename = "CertificateType")]
    pub certificate_type: Option<String>,
    #[serde(rename = "CertificateUri")]
    pub certificate_uri: Option<ODataId>,
}
