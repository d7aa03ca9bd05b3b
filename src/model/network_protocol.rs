use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// `Managers/BMC/NetworkProtocol` as the liquid-cooled controllers expose
/// it.  Only the NTP block is standard; syslog and the SSH keys live under
/// an OEM subtree that older firmware omits entirely.

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NtpData {
    #[serde(rename = "NTPServers")]
    pub ntp_servers: Option<Vec<String>>,
    #[serde(rename = "ProtocolEnabled")]
    pub protocol_enabled: Option<bool>,
    #[serde(rename = "Port")]
    pub port: Option<u16>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyslogData {
    #[serde(rename = "ProtocolEnabled")]
    pub protocol_enabled: Option<bool>,
    #[serde(rename = "SyslogServers")]
    pub syslog_servers: Option<Vec<String>>,
    #[serde(rename = "Transport")]
    pub transport: Option<String>,
    #[serde(rename = "Port")]
    pub port: Option<u16>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SshAdminData {
    #[serde(rename = "AuthorizedKeys")]
    pub authorized_keys: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OemData {
    #[serde(rename = "Syslog")]
    pub syslog: Option<SyslogData>,
    #[serde(rename = "SSHAdmin")]
    pub ssh_admin: Option<SshAdminData>,
    #[serde(rename = "SSHConsole")]
    pub ssh_console: Option<SshAdminData>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkProtocol {
    #[serde(rename = "Oem")]
    pub oem: Option<OemData>,
    #[serde(rename = "NTP")]
    pub ntp: Option<NtpData>,
}
