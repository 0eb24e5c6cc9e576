//! Interface classification (spec §3, §6; SPEC_FULL §B).
//!
//! Classifies a discovered interface into an [`InterfaceType`] from its
//! `ifName`/`ifAlias`, and tags an ISP provider from a static substring
//! dictionary matched against `ifAlias`.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::{InterfaceType, OperStatus};

struct ClassifierRules {
    trunk: Regex,
    access: Regex,
    mgmt: Regex,
    loopback: Regex,
    wan: Regex,
    lan: Regex,
    server: Regex,
    isp: Regex,
}

fn rules() -> &'static ClassifierRules {
    static RULES: OnceLock<ClassifierRules> = OnceLock::new();
    RULES.get_or_init(|| ClassifierRules {
        #[allow(clippy::unwrap_used)]
        trunk: Regex::new(r"(?i)trunk|po\d+|port-?channel").unwrap(),
        #[allow(clippy::unwrap_used)]
        access: Regex::new(r"(?i)access|acc[-_]?\d").unwrap(),
        #[allow(clippy::unwrap_used)]
        mgmt: Regex::new(r"(?i)mgmt|management|mgt\d").unwrap(),
        #[allow(clippy::unwrap_used)]
        loopback: Regex::new(r"(?i)^lo\d*$|loopback").unwrap(),
        #[allow(clippy::unwrap_used)]
        wan: Regex::new(r"(?i)wan|uplink|upstream").unwrap(),
        #[allow(clippy::unwrap_used)]
        lan: Regex::new(r"(?i)^lan\d*$|vlan\d+").unwrap(),
        #[allow(clippy::unwrap_used)]
        server: Regex::new(r"(?i)server|esxi|hypervisor").unwrap(),
        #[allow(clippy::unwrap_used)]
        isp: Regex::new(r"(?i)isp|internet|carrier|circuit").unwrap(),
    })
}

/// Static ISP-provider dictionary, keyed by a case-insensitive substring
/// match against `ifAlias` (spec §3, §6).
const ISP_PROVIDERS: &[(&str, &str)] = &[
    ("att", "AT&T"),
    ("verizon", "Verizon"),
    ("comcast", "Comcast"),
    ("centurylink", "CenturyLink"),
    ("lumen", "Lumen"),
    ("cogent", "Cogent"),
    ("level3", "Level3"),
    ("telia", "Telia"),
    ("zayo", "Zayo"),
    ("spectrum", "Spectrum"),
];

/// Classify an interface from its name and alias. Checked in order of
/// specificity: ISP/WAN identifiers outrank generic trunk/access labels,
/// since an ISP handoff is frequently also wired as a "trunk" port.
pub fn classify(if_name: &str, if_alias: &str) -> InterfaceType {
    let rules = rules();
    let haystack = format!("{if_name} {if_alias}");

    if rules.isp.is_match(&haystack) || rules.wan.is_match(&haystack) {
        if rules.isp.is_match(&haystack) {
            return InterfaceType::Isp;
        }
        return InterfaceType::Wan;
    }
    if rules.loopback.is_match(&haystack) {
        return InterfaceType::Loopback;
    }
    if rules.mgmt.is_match(&haystack) {
        return InterfaceType::Mgmt;
    }
    if rules.server.is_match(&haystack) {
        return InterfaceType::Server;
    }
    if rules.trunk.is_match(&haystack) {
        return InterfaceType::Trunk;
    }
    if rules.access.is_match(&haystack) {
        return InterfaceType::Access;
    }
    if rules.lan.is_match(&haystack) {
        return InterfaceType::Lan;
    }
    InterfaceType::Unknown
}

/// Look up an ISP provider tag from `ifAlias` via substring match.
/// Returns `None` when no known provider name appears.
pub fn isp_provider(if_alias: &str) -> Option<&'static str> {
    let lower = if_alias.to_lowercase();
    ISP_PROVIDERS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, label)| *label)
}

/// The trailing dotted component of a fully-qualified OID — for a table
/// entry like `ifOperStatus.<ifIndex>` that is the `ifIndex` (spec §3, SNMP
/// interface walk).
pub fn oid_index(oid: &str) -> Option<i32> {
    oid.rsplit('.').next()?.parse().ok()
}

/// Best-effort text extraction from a `csnmp` varbind's `Debug`-formatted
/// value. Octet strings render as `"..."`; strip the quotes if present,
/// otherwise fall back to the raw trimmed text.
pub fn varbind_text(raw: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r#""([^"]*)""#).unwrap()
    });
    re.captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

/// Best-effort integer extraction from a `csnmp` varbind's `Debug`-formatted
/// value (`Integer(6)`, `Counter32(1500)`, etc).
pub fn varbind_int(raw: &str) -> Option<i64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"-?\d+").unwrap()
    });
    re.find(raw).and_then(|m| m.as_str().parse().ok())
}

/// RFC 1213 `ifOperStatus`/`ifAdminStatus` code mapping. Anything outside
/// `1..=3` (testing(3) included) maps to `Unknown` rather than failing the
/// walk.
pub fn oper_status_from_code(code: i64) -> OperStatus {
    match code {
        1 => OperStatus::Up,
        2 => OperStatus::Down,
        3 => OperStatus::Testing,
        _ => OperStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_isp_handoff() {
        assert_eq!(classify("Gi0/1", "ISP Circuit to AT&T"), InterfaceType::Isp);
    }

    #[test]
    fn classifies_loopback() {
        assert_eq!(classify("Lo0", ""), InterfaceType::Loopback);
    }

    #[test]
    fn classifies_trunk() {
        assert_eq!(classify("Po1", "Trunk to core"), InterfaceType::Trunk);
    }

    #[test]
    fn unknown_when_nothing_matches() {
        assert_eq!(classify("Gi9/9", ""), InterfaceType::Unknown);
    }

    #[test]
    fn isp_provider_matches_known_substring() {
        assert_eq!(isp_provider("Uplink via Comcast Business"), Some("Comcast"));
        assert_eq!(isp_provider("internal link"), None);
    }

    #[test]
    fn oid_index_reads_the_trailing_component() {
        assert_eq!(oid_index("1.3.6.1.2.1.2.2.1.8.42"), Some(42));
        assert_eq!(oid_index(""), None);
    }

    #[test]
    fn varbind_text_strips_quotes_when_present() {
        assert_eq!(varbind_text(r#""GigabitEthernet0/1""#), "GigabitEthernet0/1");
        assert_eq!(varbind_text("bare text"), "bare text");
    }

    #[test]
    fn varbind_int_extracts_the_first_number() {
        assert_eq!(varbind_int("Integer(1)"), Some(1));
        assert_eq!(varbind_int("Counter32(1500000)"), Some(1500000));
        assert_eq!(varbind_int("no digits here"), None);
    }

    #[test]
    fn oper_status_from_code_maps_rfc1213_values() {
        assert_eq!(oper_status_from_code(1), OperStatus::Up);
        assert_eq!(oper_status_from_code(2), OperStatus::Down);
        assert_eq!(oper_status_from_code(3), OperStatus::Testing);
        assert_eq!(oper_status_from_code(7), OperStatus::Unknown);
    }
}
