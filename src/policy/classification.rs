use super::{read_label_state, EventHandler, PolicyConfig, PolicyError};
use crate::host::ComposeHost;
use crate::token::{Disposition, EventToken};

/// Enforces the target sensitivity label on send.  A message already
/// carrying the label is allowed.  Otherwise the label is set and the send
/// is blocked with an explanation so the user can review the corrected
/// message before sending again.
#[derive(Default)]
pub struct ClassificationReconciler;

impl ClassificationReconciler {
    async fn reconcile(
        &self,
        host: &dyn ComposeHost,
        cfg: &PolicyConfig,
    ) -> Result<Disposition, PolicyError> {
        let state = read_label_state(host, cfg).await?;
        if state.is_compliant() {
            tracing::debug!(label = %state.target, "sensitivity label already applied");
            return Ok(Disposition::Allow);
        }
        host.set_current_label(&state.target).await?;
        tracing::info!(
            from = %state.current,
            to = %state.target,
            "sensitivity label applied, blocking send for review"
        );
        Ok(Disposition::block(cfg.label_applied_message()))
    }
}

#[async_trait::async_trait]
impl EventHandler for ClassificationReconciler {
    fn name(&self) -> &str {
        "classification"
    }

    async fn handle(&self, host: &dyn ComposeHost, token: EventToken, cfg: &PolicyConfig) {
        let disposition = match self.reconcile(host, cfg).await {
            Ok(d) => d,
            Err(err) => {
                err.report(self.name());
                Disposition::block(err.user_message())
            }
        };
        token.resolve(disposition);
    }
}
