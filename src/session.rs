use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use url::Url;

/// Alphabet for session codes. Ambiguous characters (`0/O`, `1/I/L`) are
/// excluded so a code read aloud or retyped survives the round trip.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Session codes are always this long.
pub const CODE_LENGTH: usize = 6;

/// One sharing slot. Created when a sender starts sharing, deactivated when it
/// stops, never reactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque routing key. This is the broadcast topic name, so the human
    /// code never appears on the wire. Never changes after creation.
    pub id: String,
    /// Short human-typable code, canonically uppercase.
    pub code: String,
    /// Free-text description of the sharing device. Descriptive only.
    pub device_label: String,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A session is connectable only while it is active and not yet expired.
    /// Expiry is enforced here, on the consuming side, rather than assumed to
    /// be enforced by the backing store.
    pub fn is_connectable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }
}

/// Generates a fresh session code. Uniqueness among active sessions is the
/// registry's job; the alphabet only keeps collisions improbable.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| {
            let index = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[index] as char
        })
        .collect()
}

/// Codes are case-insensitive on input and canonically uppercase.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Whether `code` is in canonical form.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}

/// Builds the human-facing join link, carrying the code as a query parameter.
/// Opening the link is equivalent to typing the code manually.
pub fn join_link(base: &Url, code: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("view");
    }
    url.query_pairs_mut()
        .clear()
        .append_pair("code", &normalize_code(code));
    url
}

/// Recovers the session code from a join link, if present.
pub fn code_from_link(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| normalize_code(&value))
}
