//! The compose-session collaborator.
//!
//! `ComposeHost` is the narrow slice of the mail client's compose-window
//! object model the policy handlers need: the sender, the three recipient
//! fields, the sensitivity label and the label catalog.  Every call is
//! asynchronous and may fail independently.  `MemoryHost` implements the
//! trait over a `ComposeSnapshot` posted by the add-in shell.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// A single recipient as reported by the host.  Both fields default to
/// empty so that a malformed entry is treated as an empty address rather
/// than rejected.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub display_name: String,
}

impl Recipient {
    pub fn new(email_address: impl Into<String>) -> Self {
        Self {
            email_address: email_address.into(),
            display_name: String::new(),
        }
    }

    /// Case-insensitive exact match on the email address.
    pub fn is(&self, address: &str) -> bool {
        self.email_address.trim().to_lowercase() == address.trim().to_lowercase()
    }
}

/// A sensitivity label from the host's catalog.  Parent labels may carry
/// sub-labels in `children`.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Label>,
}

impl Label {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientField {
    To,
    Cc,
    Bcc,
}

/// Identifies a host call in logs, injected failures and the call journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostOp {
    GetSender,
    GetClassificationEnabled,
    GetLabelCatalog,
    GetCurrentLabel,
    SetCurrentLabel,
    GetField,
    SetField,
}

impl HostOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostOp::GetSender => "getSender",
            HostOp::GetClassificationEnabled => "getClassificationEnabled",
            HostOp::GetLabelCatalog => "getLabelCatalog",
            HostOp::GetCurrentLabel => "getCurrentLabel",
            HostOp::SetCurrentLabel => "setCurrentLabel",
            HostOp::GetField => "getField",
            HostOp::SetField => "setField",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, HostOp::SetCurrentLabel | HostOp::SetField)
    }
}

impl fmt::Display for HostOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host call reported a failure status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op} failed: {message}")]
pub struct HostError {
    pub op: HostOp,
    pub message: String,
}

impl HostError {
    pub fn new(op: HostOp, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

/// Asynchronous compose-window API.  Implementations must be usable from
/// a single event chain at a time; no call is issued before the previous
/// one has completed.
#[async_trait::async_trait]
pub trait ComposeHost: Send + Sync {
    async fn sender(&self) -> Result<Recipient, HostError>;
    async fn classification_enabled(&self) -> Result<bool, HostError>;
    async fn label_catalog(&self) -> Result<Vec<Label>, HostError>;
    /// Id of the label currently on the message.  Empty when unlabelled.
    async fn current_label(&self) -> Result<String, HostError>;
    async fn set_current_label(&self, id: &str) -> Result<(), HostError>;
    async fn field(&self, field: RecipientField) -> Result<Vec<Recipient>, HostError>;
    async fn set_field(
        &self,
        field: RecipientField,
        recipients: &[Recipient],
    ) -> Result<(), HostError>;
}

fn default_enabled() -> bool {
    true
}

/// Compose-session state as posted by the add-in shell.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComposeSnapshot {
    #[serde(default)]
    pub sender: Option<Recipient>,
    #[serde(default)]
    pub to: Vec<Recipient>,
    #[serde(default)]
    pub cc: Vec<Recipient>,
    #[serde(default)]
    pub bcc: Vec<Recipient>,
    /// Id of the current sensitivity label, empty when none.
    #[serde(default)]
    pub sensitivity_label: String,
    #[serde(default)]
    pub label_catalog: Vec<Label>,
    #[serde(default = "default_enabled")]
    pub classification_enabled: bool,
}

impl Default for ComposeSnapshot {
    fn default() -> Self {
        Self {
            sender: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            sensitivity_label: String::new(),
            label_catalog: Vec::new(),
            classification_enabled: true,
        }
    }
}

impl ComposeSnapshot {
    fn field(&self, field: RecipientField) -> &Vec<Recipient> {
        match field {
            RecipientField::To => &self.to,
            RecipientField::Cc => &self.cc,
            RecipientField::Bcc => &self.bcc,
        }
    }

    fn field_mut(&mut self, field: RecipientField) -> &mut Vec<Recipient> {
        match field {
            RecipientField::To => &mut self.to,
            RecipientField::Cc => &mut self.cc,
            RecipientField::Bcc => &mut self.bcc,
        }
    }
}

/// One entry of the `MemoryHost` journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostCall {
    pub op: HostOp,
    pub ok: bool,
}

/// In-memory compose session.  Calls listed in `failing` report a failure
/// instead of touching the session; every call is journaled.
pub struct MemoryHost {
    session: Mutex<ComposeSnapshot>,
    failing: HashSet<HostOp>,
    journal: Mutex<Vec<HostCall>>,
}

impl MemoryHost {
    pub fn new(snapshot: ComposeSnapshot) -> Self {
        Self {
            session: Mutex::new(snapshot),
            failing: HashSet::new(),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Make every call of `op` fail.
    pub fn fail_on(mut self, op: HostOp) -> Self {
        self.failing.insert(op);
        self
    }

    pub fn snapshot(&self) -> ComposeSnapshot {
        self.session().clone()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful write calls of the given kind.
    pub fn writes(&self, op: HostOp) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.op == op && c.ok && op.is_write())
            .count()
    }

    fn session(&self) -> MutexGuard<'_, ComposeSnapshot> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, op: HostOp) -> Result<(), HostError> {
        let ok = !self.failing.contains(&op);
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HostCall { op, ok });
        if ok {
            Ok(())
        } else {
            Err(HostError::new(op, "host reported failure status"))
        }
    }
}

#[async_trait::async_trait]
impl ComposeHost for MemoryHost {
    async fn sender(&self) -> Result<Recipient, HostError> {
        self.enter(HostOp::GetSender)?;
        let sender = self.session().sender.clone();
        sender.ok_or_else(|| HostError::new(HostOp::GetSender, "sender unavailable"))
    }

    async fn classification_enabled(&self) -> Result<bool, HostError> {
        self.enter(HostOp::GetClassificationEnabled)?;
        let enabled = self.session().classification_enabled;
        Ok(enabled)
    }

    async fn label_catalog(&self) -> Result<Vec<Label>, HostError> {
        self.enter(HostOp::GetLabelCatalog)?;
        let catalog = self.session().label_catalog.clone();
        Ok(catalog)
    }

    async fn current_label(&self) -> Result<String, HostError> {
        self.enter(HostOp::GetCurrentLabel)?;
        let label = self.session().sensitivity_label.clone();
        Ok(label)
    }

    async fn set_current_label(&self, id: &str) -> Result<(), HostError> {
        self.enter(HostOp::SetCurrentLabel)?;
        self.session().sensitivity_label = id.to_string();
        Ok(())
    }

    async fn field(&self, field: RecipientField) -> Result<Vec<Recipient>, HostError> {
        self.enter(HostOp::GetField)?;
        let recipients = self.session().field(field).clone();
        Ok(recipients)
    }

    async fn set_field(
        &self,
        field: RecipientField,
        recipients: &[Recipient],
    ) -> Result<(), HostError> {
        self.enter(HostOp::SetField)?;
        *self.session().field_mut(field) = recipients.to_vec();
        Ok(())
    }
}
