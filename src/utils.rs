use crate::errors::{GmailApiError, GmailResult};
use lazy_static::lazy_static;
use regex::Regex;

/// Quote-like characters stripped from planner-derived search queries.
pub const QUOTE_CHARS: [char; 7] = ['"', '\'', '“', '”', '‘', '’', '`'];

lazy_static! {
    static ref PROMO_REGEX: Regex = Regex::new(
        r"(?i)(offer|sale|deal|limited time|hurry|exclusive|off|cheap\d+% off)"
    )
    .unwrap();
}

/// Remove every quote-like character, including interior ones.
pub fn remove_quotes(text: &str) -> String {
    text.chars().filter(|c| !QUOTE_CHARS.contains(c)).collect()
}

/// Keyword test over subject and snippet. Matches are substrings, so "office" counts.
pub fn is_promotional(subject: &str, snippet: &str) -> bool {
    let text = format!("{} {}", subject, snippet);
    PROMO_REGEX.is_match(&text)
}

/// Decode Gmail's base64url body data, with or without padding.
pub fn decode_base64_bytes(data: &str) -> GmailResult<Vec<u8>> {
    let trimmed = data.trim().trim_end_matches('=');
    base64::decode_config(trimmed, base64::URL_SAFE_NO_PAD)
        .map_err(|e| GmailApiError::MessageFormatError(format!("Invalid base64 data: {}", e)))
}

/// Decode base64url data into text, replacing invalid UTF-8 sequences.
pub fn decode_base64(data: &str) -> GmailResult<String> {
    let bytes = decode_base64_bytes(data)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Shorten a secret for logging, keeping only its edges.
pub fn truncate_secret(secret: &str) -> String {
    if secret.len() > 10 && secret.is_ascii() {
        format!(
            "{}...{}",
            &secret[..4],
            &secret[secret.len().saturating_sub(4)..]
        )
    } else {
        "<short-token>".to_string()
    }
}
