//! Sender address extraction from raw `From` headers

use once_cell::sync::Lazy;
use regex::Regex;

static ANGLE_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([^>]+)>").expect("angle address pattern is valid"));

/// Extract the email address from a raw `From` header value
///
/// `"Shop" <deals@shop.com>` yields `deals@shop.com`; a bare value is
/// returned trimmed with any surrounding quotes removed.
pub fn parse_address(raw: &str) -> String {
    let candidate = ANGLE_ADDRESS
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);

    candidate.trim().trim_matches('"').trim().to_string()
}

/// Domain part of an address, lowercased
///
/// Returns an empty string unless the address contains exactly one `@`.
pub fn domain_of(email: &str) -> String {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(domain), None) => domain.to_lowercase(),
        _ => String::new(),
    }
}
