use crate::host::Recipient;

/// Returns true when any recipient's lower-cased address contains the
/// compliance pattern.  An empty pattern never matches.
pub fn classifies(recipients: &[Recipient], pattern: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    if pattern.is_empty() {
        return false;
    }
    recipients
        .iter()
        .any(|r| r.email_address.to_lowercase().contains(&pattern))
}
