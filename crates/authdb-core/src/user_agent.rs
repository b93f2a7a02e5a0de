//! User-agent descriptors for session bookkeeping.
//!
//! Session tokens carry a parsed user-agent descriptor supplied by the
//! caller with each login or session update. This module defines that
//! descriptor and provides the parsing used to produce one from a raw
//! `User-Agent` header value.

use serde::{Deserialize, Serialize};

/// Parsed user-agent fields attached to a session token and mirrored onto
/// the device bound to it.
///
/// Every field is optional; `None` is the null marker for "not reported".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAgentInfo {
    /// Browser family, e.g. "Firefox".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,

    /// Browser version, e.g. "121.0".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_version: Option<String>,

    /// Operating system family, e.g. "Linux".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    /// Operating system version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    /// Form factor: "desktop", "mobile", or "tablet".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

impl UserAgentInfo {
    /// Creates an empty descriptor (all fields unset).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.browser.is_none()
            && self.browser_version.is_none()
            && self.os.is_none()
            && self.os_version.is_none()
            && self.device_type.is_none()
    }

    /// Generate a human-readable name like "Firefox on Linux".
    #[must_use]
    pub fn display_name(&self) -> String {
        match (self.browser.as_deref(), self.os.as_deref()) {
            (Some(browser), Some(os)) => format!("{browser} on {os}"),
            (Some(browser), None) => browser.to_string(),
            (None, Some(os)) => format!("Unknown browser on {os}"),
            (None, None) => "Unknown device".to_string(),
        }
    }
}

/// Parse a descriptor from a raw `User-Agent` string.
#[must_use]
pub fn parse_user_agent(user_agent: &str) -> UserAgentInfo {
    let browser = detect_browser(user_agent);
    let browser_version = browser
        .as_deref()
        .and_then(|b| detect_version(user_agent, b));
    let os = detect_os(user_agent);

    UserAgentInfo {
        browser,
        browser_version,
        os,
        os_version: None,
        device_type: detect_device_type(user_agent),
    }
}

/// Detect browser family from a User-Agent string
fn detect_browser(ua: &str) -> Option<String> {
    let ua_lower = ua.to_lowercase();

    // Order matters: Chrome contains Safari, Edge contains Chrome
    if ua_lower.contains("edg/") || ua_lower.contains("edge/") {
        Some("Edge".to_string())
    } else if ua_lower.contains("opr/") || ua_lower.contains("opera") {
        Some("Opera".to_string())
    } else if ua_lower.contains("chrome/") {
        Some("Chrome".to_string())
    } else if ua_lower.contains("safari/") && !ua_lower.contains("chrome") {
        Some("Safari".to_string())
    } else if ua_lower.contains("firefox/") {
        Some("Firefox".to_string())
    } else {
        None
    }
}

/// Extract the version that follows the browser's own product token.
fn detect_version(ua: &str, browser: &str) -> Option<String> {
    let token = match browser {
        "Edge" => "Edg/",
        "Opera" => "OPR/",
        "Chrome" => "Chrome/",
        "Safari" => "Version/",
        "Firefox" => "Firefox/",
        _ => return None,
    };
    let rest = &ua[ua.find(token)? + token.len()..];
    let version: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if version.is_empty() { None } else { Some(version) }
}

/// Detect operating system family from a User-Agent string
fn detect_os(ua: &str) -> Option<String> {
    let ua_lower = ua.to_lowercase();

    if ua_lower.contains("windows") {
        Some("Windows".to_string())
    } else if ua_lower.contains("iphone") {
        Some("iOS".to_string())
    } else if ua_lower.contains("ipad") {
        Some("iPadOS".to_string())
    } else if ua_lower.contains("mac os x") || ua_lower.contains("macintosh") {
        Some("macOS".to_string())
    } else if ua_lower.contains("android") {
        Some("Android".to_string())
    } else if ua_lower.contains("cros") {
        Some("Chrome OS".to_string())
    } else if ua_lower.contains("linux") {
        Some("Linux".to_string())
    } else {
        None
    }
}

/// Detect form factor from a User-Agent string
fn detect_device_type(ua: &str) -> Option<String> {
    let ua_lower = ua.to_lowercase();

    if ua_lower.contains("ipad") || ua_lower.contains("tablet") {
        Some("tablet".to_string())
    } else if ua_lower.contains("mobile")
        || ua_lower.contains("iphone")
        || ua_lower.contains("android")
    {
        Some("mobile".to_string())
    } else if ua_lower.contains("windows")
        || ua_lower.contains("macintosh")
        || ua_lower.contains("linux")
        || ua_lower.contains("cros")
    {
        Some("desktop".to_string())
    } else {
        None
    }
}
