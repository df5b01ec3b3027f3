//! User agent classification.
//!
//! Deliberately coarse: a handful of substring checks evaluated in a fixed
//! priority order. Order matters, e.g. Edge and Opera user agents also
//! contain "Chrome" and classify as Chrome.

use crate::types::DeviceType;

const TABLET_KEYWORDS: &[&str] = &["tablet", "ipad", "playbook", "silk"];

const MOBILE_KEYWORDS: &[&str] = &[
    "mobile",
    "iphone",
    "ipod",
    "android",
    "blackberry",
    "opera",
    "mini",
    "windows ce",
    "palm",
    "smartphone",
    "iemobile",
];

const BROWSERS: &[(&str, &str)] = &[
    ("Chrome", "Chrome"),
    ("Firefox", "Firefox"),
    ("Safari", "Safari"),
    ("Edge", "Edge"),
    ("Opera", "Opera"),
];

const OPERATING_SYSTEMS: &[(&str, &str)] = &[
    ("Windows", "Windows"),
    ("Mac", "macOS"),
    ("Linux", "Linux"),
    ("Android", "Android"),
    ("iOS", "iOS"),
];

pub const UNKNOWN: &str = "Unknown";

/// What the recorder stores about the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    pub device: DeviceType,
    pub browser: &'static str,
    pub os: &'static str,
}

pub fn classify_user_agent(user_agent: &str) -> ClientInfo {
    ClientInfo {
        device: device_type(user_agent),
        browser: first_match(user_agent, BROWSERS),
        os: first_match(user_agent, OPERATING_SYSTEMS),
    }
}

/// Tablet keywords win over mobile keywords. Matching ignores case.
pub fn device_type(user_agent: &str) -> DeviceType {
    let lowered = user_agent.to_lowercase();
    if TABLET_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        DeviceType::Tablet
    } else if MOBILE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

fn first_match(user_agent: &str, table: &[(&str, &'static str)]) -> &'static str {
    table
        .iter()
        .find(|(needle, _)| user_agent.contains(needle))
        .map(|(_, label)| *label)
        .unwrap_or(UNKNOWN)
}
