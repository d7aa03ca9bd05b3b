//! Component name (xname) grammar.
//!
//! The shepherd treats xnames as opaque strings plus a handful of
//! predicates: what kind of component a name describes, whether that kind
//! is a controller, what the parent component is, and which certificate
//! domain a name resolves to.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, ShepherdError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XnameKind {
    Cabinet,
    CabinetBmc,
    CabinetPduController,
    Chassis,
    ChassisBmc,
    RouterBmc,
    NodeBmc,
    Node,
    Invalid,
}

impl XnameKind {
    /// True for the BMC-class component kinds the shepherd talks Redfish to.
    pub fn is_controller(&self) -> bool {
        matches!(
            self,
            XnameKind::CabinetBmc
                | XnameKind::CabinetPduController
                | XnameKind::ChassisBmc
                | XnameKind::RouterBmc
                | XnameKind::NodeBmc
        )
    }
}

impl fmt::Display for XnameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            XnameKind::Cabinet => "Cabinet",
            XnameKind::CabinetBmc => "CabinetBMC",
            XnameKind::CabinetPduController => "CabinetPDUController",
            XnameKind::Chassis => "Chassis",
            XnameKind::ChassisBmc => "ChassisBMC",
            XnameKind::RouterBmc => "RouterBMC",
            XnameKind::NodeBmc => "NodeBMC",
            XnameKind::Node => "Node",
            XnameKind::Invalid => "INVALID",
        };
        write!(f, "{}", s)
    }
}

static CABINET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^x(\d{1,4})$").unwrap());
static CABINET_BMC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^x(\d{1,4})b(\d+)$").unwrap());
static CABINET_PDU_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^x(\d{1,4})m(\d+)p(\d+)$").unwrap());
static CHASSIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^x(\d{1,4})c(\d+)$").unwrap());
static CHASSIS_BMC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^x(\d{1,4})c(\d+)b(\d+)$").unwrap());
static ROUTER_BMC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^x(\d{1,4})c(\d+)r(\d+)b(\d+)$").unwrap());
static NODE_BMC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^x(\d{1,4})c(\d+)s(\d+)b(\d+)$").unwrap());
static NODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^x(\d{1,4})c(\d+)s(\d+)b(\d+)n(\d+)$").unwrap());

/// Classify a (normalized) xname against the recognized grammar.
pub fn kind(xname: &str) -> XnameKind {
    let xn = normalize(xname);
    if NODE_RE.is_match(&xn) {
        XnameKind::Node
    } else if NODE_BMC_RE.is_match(&xn) {
        XnameKind::NodeBmc
    } else if ROUTER_BMC_RE.is_match(&xn) {
        XnameKind::RouterBmc
    } else if CHASSIS_BMC_RE.is_match(&xn) {
        XnameKind::ChassisBmc
    } else if CHASSIS_RE.is_match(&xn) {
        XnameKind::Chassis
    } else if CABINET_PDU_RE.is_match(&xn) {
        XnameKind::CabinetPduController
    } else if CABINET_BMC_RE.is_match(&xn) {
        XnameKind::CabinetBmc
    } else if CABINET_RE.is_match(&xn) {
        XnameKind::Cabinet
    } else {
        XnameKind::Invalid
    }
}

/// Normalize an xname: lower-case, leading zeros stripped from every
/// numeric field.  Does not validate.
pub fn normalize(xname: &str) -> String {
    let lower = xname.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut digits = String::new();
    for ch in lower.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else {
            if !digits.is_empty() {
                out.push_str(digits.trim_start_matches('0'));
                if digits.chars().all(|c| c == '0') {
                    out.push('0');
                }
                digits.clear();
            }
            out.push(ch);
        }
    }
    if !digits.is_empty() {
        out.push_str(digits.trim_start_matches('0'));
        if digits.chars().all(|c| c == '0') {
            out.push('0');
        }
    }
    out
}

/// Verify and normalize an xname.  Returns `None` when the name does not
/// match the grammar, mirroring the empty-string convention of the state
/// manager's own libraries.
pub fn verify_normalize(xname: &str) -> Option<String> {
    let xn = normalize(xname);
    if kind(&xn) == XnameKind::Invalid {
        None
    } else {
        Some(xn)
    }
}

/// Parent of an xname: the name with its last letter+ordinal field removed.
/// `x3000c0s27b0n0` -> `x3000c0s27b0`.
pub fn parent_of(xname: &str) -> String {
    let xn = normalize(xname);
    let bytes = xn.as_bytes();
    let mut i = bytes.len();
    while i > 0 && bytes[i - 1].is_ascii_digit() {
        i -= 1;
    }
    while i > 0 && bytes[i - 1].is_ascii_alphabetic() {
        i -= 1;
    }
    xn[..i].to_string()
}

/// Node ordinal (the `nN` field) of a node xname.
pub fn node_number(xname: &str) -> Result<u32> {
    let xn = normalize(xname);
    let caps = NODE_RE
        .captures(&xn)
        .ok_or_else(|| ShepherdError::NotANode(xname.to_string()))?;
    caps[5]
        .parse::<u32>()
        .map_err(|_| ShepherdError::NotANode(xname.to_string()))
}

/// Canonicalize a component type name, or `None` for a type outside the
/// recognized grammar.
pub fn normalize_type(name: &str) -> Option<&'static str> {
    match name.to_lowercase().as_str() {
        "cabinet" => Some("Cabinet"),
        "cabinetbmc" => Some("CabinetBMC"),
        "cabinetpducontroller" => Some("CabinetPDUController"),
        "chassis" => Some("Chassis"),
        "chassisbmc" => Some("ChassisBMC"),
        "routerbmc" => Some("RouterBMC"),
        "nodebmc" => Some("NodeBMC"),
        "node" => Some("Node"),
        _ => None,
    }
}

/// Remove a `:port` suffix, if present.  Test rigs address controllers as
/// `xname:port`; everything keyed by xname must see the bare name.
pub fn strip_port(target: &str) -> &str {
    match target.split_once(':') {
        Some((host, _)) => host,
        None => target,
    }
}

/// TLS certificate domains.  A single leaf cert covers every controller
/// under one domain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertDomain {
    Cabinet,
    Chassis,
    Blade,
    Bmc,
}

impl CertDomain {
    pub fn parse(name: &str) -> Result<CertDomain> {
        match name.to_lowercase().as_str() {
            "cabinet" => Ok(CertDomain::Cabinet),
            "chassis" => Ok(CertDomain::Chassis),
            "blade" => Ok(CertDomain::Blade),
            "bmc" => Ok(CertDomain::Bmc),
            _ => Err(ShepherdError::InvalidDomain(name.to_string())),
        }
    }
}

impl fmt::Display for CertDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CertDomain::Cabinet => "cabinet",
            CertDomain::Chassis => "chassis",
            CertDomain::Blade => "blade",
            CertDomain::Bmc => "bmc",
        };
        write!(f, "{}", s)
    }
}

static CHASSIS_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^x\d+c\d+").unwrap());
static BLADE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^x\d+c\d+s\d+").unwrap());
static CABINET_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^x\d+").unwrap());

/// Resolve an xname to the id of the certificate domain it lives in, or an
/// error when the name does not reach that level of the hierarchy.
pub fn domain_id(xname: &str, domain: CertDomain) -> Result<String> {
    let xn =
        verify_normalize(strip_port(xname)).ok_or_else(|| ShepherdError::BadXname(xname.to_string()))?;
    let prefix = match domain {
        CertDomain::Cabinet => CABINET_PREFIX_RE.find(&xn),
        CertDomain::Chassis => CHASSIS_PREFIX_RE.find(&xn),
        CertDomain::Blade => BLADE_PREFIX_RE.find(&xn),
        CertDomain::Bmc => {
            if kind(&xn).is_controller() {
                return Ok(xn);
            }
            None
        }
    };
    match prefix {
        Some(m) => Ok(m.as_str().to_string()),
        None => Err(ShepherdError::InvalidDomain(format!(
            "'{}' is not part of a {} domain",
            xname, domain
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(kind("x0c0s0b0"), XnameKind::NodeBmc);
        assert_eq!(kind("x0c0s0b0n0"), XnameKind::Node);
        assert_eq!(kind("x0c0b0"), XnameKind::ChassisBmc);
        assert_eq!(kind("x0c0r12b0"), XnameKind::RouterBmc);
        assert_eq!(kind("x3000"), XnameKind::Cabinet);
        assert_eq!(kind("x3000b0"), XnameKind::CabinetBmc);
        assert_eq!(kind("x3000m0p1"), XnameKind::CabinetPduController);
        assert_eq!(kind("x0c0"), XnameKind::Chassis);
        assert_eq!(kind("grp1"), XnameKind::Invalid);
        assert_eq!(kind("x0c0s0b0q1"), XnameKind::Invalid);
    }

    #[test]
    fn controller_predicate() {
        assert!(kind("x0c0s0b0").is_controller());
        assert!(kind("x0c0b0").is_controller());
        assert!(kind("x0c0r0b0").is_controller());
        assert!(kind("x3000m0p0").is_controller());
        assert!(!kind("x0c0s0b0n0").is_controller());
        assert!(!kind("x3000").is_controller());
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize("X0000c0S07b00N0"), "x0c0s7b0n0");
        assert_eq!(normalize("x3000c0s27b0n0"), "x3000c0s27b0n0");
        assert_eq!(verify_normalize("X3000C0S27B0"), Some("x3000c0s27b0".into()));
        assert_eq!(verify_normalize("not-an-xname"), None);
    }

    #[test]
    fn parents_and_ordinals() {
        assert_eq!(parent_of("x3000c0s27b0n0"), "x3000c0s27b0");
        assert_eq!(parent_of("x3000c0s27b0"), "x3000c0s27");
        assert_eq!(node_number("x3000c0s27b0n3").unwrap(), 3);
        assert!(node_number("x3000c0s27b0").is_err());
    }

    #[test]
    fn ports() {
        assert_eq!(strip_port("x0c0s0b0:21000"), "x0c0s0b0");
        assert_eq!(strip_port("x0c0s0b0"), "x0c0s0b0");
    }

    #[test]
    fn cert_domains() {
        assert_eq!(domain_id("x3000c0s27b0", CertDomain::Cabinet).unwrap(), "x3000");
        assert_eq!(domain_id("x3000c0s27b0", CertDomain::Chassis).unwrap(), "x3000c0");
        assert_eq!(domain_id("x3000c0s27b0", CertDomain::Blade).unwrap(), "x3000c0s27");
        assert_eq!(domain_id("x3000c0s27b0", CertDomain::Bmc).unwrap(), "x3000c0s27b0");
        assert!(domain_id("x3000", CertDomain::Blade).is_err());
        assert!(domain_id("x3000", CertDomain::Bmc).is_err());
        assert!(CertDomain::parse("Cabinet").is_ok());
        assert!(CertDomain::parse("rack").is_err());
    }
}
