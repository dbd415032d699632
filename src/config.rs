use std::env;

use anyhow::{anyhow, Result};

use crate::policy::SendHandler;

/// Service-level settings read from the environment.  The policy values
/// themselves (hold mailbox, pattern, label) are fixed and live in
/// `PolicyConfig`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub send_handler: SendHandler,
    pub max_request_bytes: Option<usize>,
    pub handler_warn_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let send_handler = match env::var("HOLDGATE_SEND_HANDLER") {
            Ok(value) if !value.trim().is_empty() => SendHandler::parse(&value).ok_or_else(|| {
                anyhow!(
                    "HOLDGATE_SEND_HANDLER must be 'send_gate' or 'classification' (got '{}')",
                    value.trim()
                )
            })?,
            Ok(_) | Err(env::VarError::NotPresent) => SendHandler::default(),
            Err(err) => return Err(err.into()),
        };
        let max_request_bytes = match parse_optional_u64("HOLDGATE_MAX_REQUEST_BYTES")? {
            Some(0) => return Err(anyhow!("HOLDGATE_MAX_REQUEST_BYTES must be a positive integer")),
            other => other.map(|v| v as usize),
        };
        let handler_warn_ms = parse_optional_u64("HOLDGATE_HANDLER_WARN_MS")?.unwrap_or(120);

        Ok(Self {
            send_handler,
            max_request_bytes,
            handler_warn_ms,
        })
    }
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
