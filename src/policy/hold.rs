//! Keeps the legal-hold mailbox in Bcc in step with the sensitivity label.
//!
//! Runs on every recipients-changed and label-changed event.  When the
//! message carries the target label the hold mailbox must be in Bcc, and
//! otherwise it must not be.  Bcc is read, edited in memory and written
//! back whole; nothing is written when it is already in the right state.
//! This path never blocks the user: failures are logged and the token is
//! released with `Continue`.

use super::{read_label_state, EventHandler, PolicyConfig, PolicyError};
use crate::host::{ComposeHost, Recipient, RecipientField};
use crate::token::{Disposition, EventToken};

/// What a reconciliation did to the Bcc field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldChange {
    Added,
    Removed,
    Unchanged,
}

#[derive(Default)]
pub struct HoldRecipientReconciler;

impl HoldRecipientReconciler {
    pub async fn reconcile(
        &self,
        host: &dyn ComposeHost,
        cfg: &PolicyConfig,
    ) -> Result<HoldChange, PolicyError> {
        let state = read_label_state(host, cfg).await?;
        let change = if state.is_compliant() {
            ensure_present(host, &cfg.hold_mailbox).await?
        } else {
            ensure_absent(host, &cfg.hold_mailbox).await?
        };
        Ok(change)
    }
}

/// Append `mailbox` to Bcc unless it is already there.
pub async fn ensure_present(
    host: &dyn ComposeHost,
    mailbox: &str,
) -> Result<HoldChange, PolicyError> {
    let mut bcc = host.field(RecipientField::Bcc).await?;
    if bcc.iter().any(|r| r.is(mailbox)) {
        tracing::trace!(mailbox, "hold mailbox already in bcc");
        return Ok(HoldChange::Unchanged);
    }
    bcc.push(Recipient::new(mailbox));
    host.set_field(RecipientField::Bcc, &bcc).await?;
    tracing::info!(mailbox, bcc_len = bcc.len(), "hold mailbox added to bcc");
    Ok(HoldChange::Added)
}

/// Remove the first Bcc entry matching `mailbox`, if any.
pub async fn ensure_absent(
    host: &dyn ComposeHost,
    mailbox: &str,
) -> Result<HoldChange, PolicyError> {
    let mut bcc = host.field(RecipientField::Bcc).await?;
    let Some(pos) = bcc.iter().position(|r| r.is(mailbox)) else {
        tracing::trace!(mailbox, "hold mailbox not in bcc");
        return Ok(HoldChange::Unchanged);
    };
    bcc.remove(pos);
    host.set_field(RecipientField::Bcc, &bcc).await?;
    tracing::info!(mailbox, bcc_len = bcc.len(), "hold mailbox removed from bcc");
    Ok(HoldChange::Removed)
}

#[async_trait::async_trait]
impl EventHandler for HoldRecipientReconciler {
    fn name(&self) -> &str {
        "hold_recipient"
    }

    async fn handle(&self, host: &dyn ComposeHost, token: EventToken, cfg: &PolicyConfig) {
        match self.reconcile(host, cfg).await {
            Ok(change) => {
                tracing::debug!(event = %token.event(), ?change, "hold reconciliation finished");
            }
            Err(err) => err.report(self.name()),
        }
        token.resolve(Disposition::Continue);
    }
}
