//! Compliance policy handlers.
//!
//! Each handler owns the token for one host lifecycle event and drives the
//! compose session through a `ComposeHost` until it can resolve it.  The
//! `HandlerRegistry` maps the host's launch-event names to handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::host::{ComposeHost, HostError};
use crate::token::EventToken;

pub mod catalog;
pub mod classification;
pub mod classifier;
pub mod hold;
pub mod send_gate;

use self::classification::ClassificationReconciler;
use self::hold::HoldRecipientReconciler;
use self::send_gate::SendGate;

pub const ON_MESSAGE_SEND: &str = "OnMessageSend";
pub const ON_RECIPIENTS_CHANGED: &str = "OnMessageRecipientsChanged";
pub const ON_LABEL_CHANGED: &str = "OnSensitivityLabelChanged";

pub const DEFAULT_HOLD_MAILBOX: &str = "retention.hold@yourcompany.com";
pub const DEFAULT_COMPLIANCE_PATTERN: &str = "legal";
pub const DEFAULT_TARGET_LABEL: &str = "Highly Confidential";

/// Shown whenever a blocking path cannot talk to the host.
pub const RESTART_GUIDANCE: &str =
    "The compliance check could not be completed. Save your draft, restart Outlook and send again.";

/// Fixed business values of the legal-hold policy.  Injected rather than
/// global so tests can substitute them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Mailbox copied (Bcc) on every message carrying the target label.
    pub hold_mailbox: String,
    /// Lower-case substring identifying a compliance address.
    pub compliance_pattern: String,
    /// Name of the label the policy enforces.
    pub target_label: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            hold_mailbox: DEFAULT_HOLD_MAILBOX.to_owned(),
            compliance_pattern: DEFAULT_COMPLIANCE_PATTERN.to_owned(),
            target_label: DEFAULT_TARGET_LABEL.to_owned(),
        }
    }
}

impl PolicyConfig {
    /// Informational text shown after the label was corrected on send.
    pub fn label_applied_message(&self) -> String {
        format!(
            "The \"{}\" sensitivity label was applied automatically and {} was added in Bcc for legal hold. Review the message and select Send again.",
            self.target_label, self.hold_mailbox
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("sensitivity label '{0}' is not in the label catalog")]
    LabelNotFound(String),
    #[error("sensitivity labels are not enabled for this mailbox")]
    ClassificationDisabled,
}

impl PolicyError {
    /// Text shown to the user when this error blocks an operation.
    pub fn user_message(&self) -> String {
        match self {
            PolicyError::LabelNotFound(name) => format!(
                "The \"{}\" sensitivity label is not available for this mailbox. Contact your administrator before sending.",
                name
            ),
            PolicyError::Host(_) | PolicyError::ClassificationDisabled => {
                RESTART_GUIDANCE.to_owned()
            }
        }
    }

    /// Log the failure with its underlying text.
    pub(crate) fn report(&self, handler: &str) {
        match self {
            PolicyError::Host(err) => {
                tracing::warn!(handler, op = %err.op, error = %err.message, "host call failed");
            }
            PolicyError::LabelNotFound(name) => {
                tracing::error!(handler, label = %name, "target sensitivity label missing from catalog");
            }
            PolicyError::ClassificationDisabled => {
                tracing::warn!(handler, "sensitivity labels disabled for this mailbox");
            }
        }
    }
}

/// Current versus target label ids, read fresh from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelState {
    pub current: String,
    pub target: String,
}

impl LabelState {
    pub fn is_compliant(&self) -> bool {
        self.current == self.target
    }
}

/// Shared first four steps of both reconcilers: check the classification
/// subsystem, fetch the catalog, resolve the target id, read the current id.
pub async fn read_label_state(
    host: &dyn ComposeHost,
    cfg: &PolicyConfig,
) -> Result<LabelState, PolicyError> {
    if !host.classification_enabled().await? {
        return Err(PolicyError::ClassificationDisabled);
    }
    let catalog = host.label_catalog().await?;
    let target = catalog::resolve_label_id(&cfg.target_label, &catalog)?.to_owned();
    let current = host.current_label().await?;
    Ok(LabelState { current, target })
}

/// Trait implemented by every event entry point.  `handle` must resolve
/// `token` on every path.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, host: &dyn ComposeHost, token: EventToken, cfg: &PolicyConfig);
}

/// Which handler answers `OnMessageSend`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SendHandler {
    /// Sender check that always blocks with "OK"/"KO".
    #[default]
    SendGate,
    /// Label enforcement that blocks only to report a correction.
    Classification,
}

impl SendHandler {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "send_gate" | "sendgate" => Some(SendHandler::SendGate),
            "classification" => Some(SendHandler::Classification),
            _ => None,
        }
    }
}

/// Binds launch-event names to handlers.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<&'static str, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new(send: SendHandler) -> Self {
        let mut handlers: BTreeMap<&'static str, Arc<dyn EventHandler>> = BTreeMap::new();
        let on_send: Arc<dyn EventHandler> = match send {
            SendHandler::SendGate => Arc::new(SendGate),
            SendHandler::Classification => Arc::new(ClassificationReconciler),
        };
        handlers.insert(ON_MESSAGE_SEND, on_send);
        let hold: Arc<dyn EventHandler> = Arc::new(HoldRecipientReconciler);
        handlers.insert(ON_RECIPIENTS_CHANGED, hold.clone());
        handlers.insert(ON_LABEL_CHANGED, hold);
        tracing::debug!(?send, "handler registry built");
        Self { handlers }
    }

    pub fn get(&self, event: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(event).cloned()
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ComposeSnapshot, HostOp, Label, MemoryHost};

    fn snapshot(current: &str) -> ComposeSnapshot {
        ComposeSnapshot {
            sensitivity_label: current.into(),
            label_catalog: vec![
                Label::new("L0", "General"),
                Label::new("L1", "Highly Confidential"),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn label_state_reports_compliance() {
        let host = MemoryHost::new(snapshot("L1"));
        let state = read_label_state(&host, &PolicyConfig::default()).await.unwrap();
        assert!(state.is_compliant());
        assert_eq!(state.target, "L1");
    }

    #[tokio::test]
    async fn disabled_classification_stops_before_catalog() {
        let mut snap = snapshot("");
        snap.classification_enabled = false;
        let host = MemoryHost::new(snap);
        let err = read_label_state(&host, &PolicyConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::ClassificationDisabled));
        assert_eq!(host.calls().len(), 1);
    }

    #[tokio::test]
    async fn catalog_failure_surfaces_host_error() {
        let host = MemoryHost::new(snapshot("")).fail_on(HostOp::GetLabelCatalog);
        let err = read_label_state(&host, &PolicyConfig::default())
            .await
            .unwrap_err();
        match err {
            PolicyError::Host(e) => assert_eq!(e.op, HostOp::GetLabelCatalog),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn registry_binds_change_events_to_hold_reconciler() {
        let reg = HandlerRegistry::new(SendHandler::default());
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.get(ON_MESSAGE_SEND).unwrap().name(), "send_gate");
        assert_eq!(reg.get(ON_RECIPIENTS_CHANGED).unwrap().name(), "hold_recipient");
        assert_eq!(reg.get(ON_LABEL_CHANGED).unwrap().name(), "hold_recipient");
        assert!(reg.get("OnAppointmentSend").is_none());

        let reg = HandlerRegistry::new(SendHandler::Classification);
        assert_eq!(reg.get(ON_MESSAGE_SEND).unwrap().name(), "classification");
    }

    #[test]
    fn parses_send_handler_names() {
        assert_eq!(SendHandler::parse(" Send_Gate "), Some(SendHandler::SendGate));
        assert_eq!(
            SendHandler::parse("classification"),
            Some(SendHandler::Classification)
        );
        assert_eq!(SendHandler::parse("both"), None);
    }

    #[test]
    fn label_missing_message_names_the_label() {
        let msg = PolicyError::LabelNotFound("Highly Confidential".into()).user_message();
        assert!(msg.contains("Highly Confidential"));
        assert_eq!(
            PolicyError::ClassificationDisabled.user_message(),
            RESTART_GUIDANCE
        );
    }
}
