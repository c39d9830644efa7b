use crate::config::AccessConfig;

/// Fixed shared-secret gate in front of viewing. One static passphrase for
/// every session and every viewer, compared case-insensitively. This is an
/// access placeholder, not a security boundary: it is not hashed, not
/// rotated, not rate-limited and not bound to a session.
#[derive(Debug, Clone)]
pub struct AccessGate {
    passphrase: String,
}

impl AccessGate {
    pub fn new(config: AccessConfig) -> Self {
        Self {
            passphrase: config.passphrase,
        }
    }

    pub fn verify(&self, input: &str) -> bool {
        input.trim().eq_ignore_ascii_case(self.passphrase.trim())
    }
}
