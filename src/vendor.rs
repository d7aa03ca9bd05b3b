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

//! Vendor classification.
//!
//! There is no reliable vendor field on a BMC, but the member list of
//! `/redfish/v1/Chassis` is distinctive per vendor.  Rack PDUs answer with
//! an empty member list (and are addressed via `-rts` hostnames) while
//! speaking the same certificate schema as the liquid-cooled controllers,
//! so they classify as Cray.

use std::fmt;

use crate::model::ODataId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Cray,
    Gigabyte,
    Hpe,
    Intel,
    Unknown,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Vendor::Cray => "Cray",
            Vendor::Gigabyte => "Gigabyte",
            Vendor::Hpe => "HPE",
            Vendor::Intel => "Intel",
            Vendor::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Classify a target from its chassis member list.
pub fn classify(host: &str, members: &[ODataId]) -> Vendor {
    if host.contains("-rts") || members.is_empty() {
        return Vendor::Cray;
    }
    for member in members {
        match last_segment(&member.id).to_lowercase().as_str() {
            "enclosure" => return Vendor::Cray,
            "self" => return Vendor::Gigabyte,
            "rackmount" => return Vendor::Intel,
            _ => {}
        }
    }
    // iLO numbers its chassis; any member with a numeric tail counts.
    for member in members {
        if last_segment(&member.id).parse::<u64>().is_ok() {
            return Vendor::Hpe;
        }
    }
    Vendor::Unknown
}

fn last_segment(uri: &str) -> &str {
    uri.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chassis(uris: &[&str]) -> Vec<ODataId> {
        uris.iter().map(|u| ODataId::new(*u)).collect()
    }

    #[test]
    fn classify_by_member_suffix() {
        assert_eq!(
            classify("x0c0s0b0", &chassis(&["/redfish/v1/Chassis/Enclosure"])),
            Vendor::Cray
        );
        assert_eq!(
            classify("x0c0s0b0", &chassis(&["/redfish/v1/Chassis/Self"])),
            Vendor::Gigabyte
        );
        assert_eq!(
            classify("x0c0s0b0", &chassis(&["/redfish/v1/Chassis/1"])),
            Vendor::Hpe
        );
        assert_eq!(
            classify("x0c0s0b0", &chassis(&["/redfish/v1/Chassis/RackMount"])),
            Vendor::Intel
        );
        assert_eq!(
            classify(
                "x0c0s0b0",
                &chassis(&["/redfish/v1/Chassis/junk", "/redfish/v1/Chassis/Enclosure"])
            ),
            Vendor::Cray
        );
    }

    #[test]
    fn pdus_classify_as_cray() {
        assert_eq!(classify("x0m0-rts:8083", &chassis(&[])), Vendor::Cray);
        assert_eq!(
            classify("x0m0-rts", &chassis(&["/redfish/v1/Chassis/whatever"])),
            Vendor::Cray
        );
        // empty member list alone is enough
        assert_eq!(classify("x0c0s0b0", &[]), Vendor::Cray);
    }

    #[test]
    fn numeric_tails_fall_back_to_hpe() {
        assert_eq!(
            classify("x0c0s0b0", &chassis(&["/redfish/v1/Chassis/12"])),
            Vendor::Hpe
        );
        // iLO sometimes appends a trailing slash
        assert_eq!(
            classify("x0c0s0b0", &chassis(&["/redfish/v1/Chassis/3/"])),
            Vendor::Hpe
        );
    }

    #[test]
    fn unknown_hardware() {
        assert_eq!(
            classify("x0c0s0b0", &chassis(&["/redfish/v1/Chassis/Banana"])),
            Vendor::Unknown
        );
    }
}
