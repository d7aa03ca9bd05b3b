use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use super::ODataId;

/// The slice of `GET /redfish/v1/` the shepherd cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceRoot {
    #[serde(rename = "AccountService")]
    pub account_service: Option<ODataId>,
    #[serde(rename = "CertificateService")]
    pub certificate_service: Option<ODataId>,
}

/// `GET <AccountService.@odata.id>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountService {
    #[serde(rename = "Accounts")]
    pub accounts: Option<ODataId>,
}

/// A single manager account.  Controllers differ wildly in what else they
/// return here; the username and the concurrency tag are all we read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManagerAccount {
    #[serde(rename = "UserName", default)]
    pub username: String,
    #[serde(rename = "@odata.etag", default)]
    pub etag: String,
}

/// PATCH body for an account update.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountUpdate {
    #[serde(rename = "UserName")]
    pub username: Option<String>,
    #[serde(rename = "Password")]
    pub password: Option<String>,
}
