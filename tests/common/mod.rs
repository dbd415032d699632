use std::collections::HashMap;

use holdgate::host::{ComposeSnapshot, Label, Recipient};

#[allow(dead_code)]
pub const HOLD: &str = "retention.hold@yourcompany.com";

/// Tracks environment variable mutations and restores originals on drop.
#[allow(dead_code)]
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        self.originals
            .entry(key.to_string())
            .or_insert_with(|| std::env::var(key).ok());
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

#[allow(dead_code)]
pub fn recipients(addrs: &[&str]) -> Vec<Recipient> {
    addrs.iter().map(|a| Recipient::new(*a)).collect()
}

#[allow(dead_code)]
pub fn addresses(list: &[Recipient]) -> Vec<String> {
    list.iter().map(|r| r.email_address.clone()).collect()
}

/// Session with the standard one-label catalog, the given current label
/// and Bcc.
#[allow(dead_code)]
pub fn session(current_label: &str, bcc: &[&str]) -> ComposeSnapshot {
    ComposeSnapshot {
        sender: Some(Recipient::new("alice@yourcompany.com")),
        to: recipients(&["counsel@legal.yourcompany.com"]),
        bcc: recipients(bcc),
        sensitivity_label: current_label.to_string(),
        label_catalog: vec![Label::new("L1", "Highly Confidential")],
        ..Default::default()
    }
}
