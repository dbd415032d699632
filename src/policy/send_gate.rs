use super::classifier::classifies;
use super::{EventHandler, PolicyConfig, PolicyError, RESTART_GUIDANCE};
use crate::host::ComposeHost;
use crate::token::{Disposition, EventToken};

/// Send-time gate.  Reads the sender (not the recipients) and runs the
/// address classifier on it.  The send is always blocked; the message is
/// "OK" when the sender matched the compliance pattern and "KO" otherwise.
#[derive(Default)]
pub struct SendGate;

#[async_trait::async_trait]
impl EventHandler for SendGate {
    fn name(&self) -> &str {
        "send_gate"
    }

    async fn handle(&self, host: &dyn ComposeHost, token: EventToken, cfg: &PolicyConfig) {
        let sender = match host.sender().await {
            Ok(sender) => sender,
            Err(err) => {
                PolicyError::from(err).report(self.name());
                token.resolve(Disposition::block(RESTART_GUIDANCE));
                return;
            }
        };
        let matched = classifies(std::slice::from_ref(&sender), &cfg.compliance_pattern);
        tracing::info!(sender = %sender.email_address, matched, "send gate evaluated sender");
        let verdict = if matched { "OK" } else { "KO" };
        token.resolve(Disposition::block(verdict));
    }
}
