//! Remote console collaborator trait.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BoxError;

/// Opaque pass-through to the game server's control-protocol client.
///
/// Implemented outside the runtime by whatever speaks the server's RCON
/// dialect; the runtime and plugins only see this trait. All methods are
/// fallible because the underlying connection may be down.
#[async_trait]
pub trait RemoteConsole: Send + Sync {
    /// Send a raw console command and return the server's response.
    async fn send(&self, command: &str) -> Result<String, BoxError>;

    /// Send a raw console command with a caller-chosen timeout.
    async fn send_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, BoxError>;

    /// Fetch server status.
    ///
    /// The default implementation issues a `status` command and returns the
    /// unparsed response under the `raw` key; implementations that can parse
    /// their server's status output may override this with structured
    /// fields.
    async fn status(&self) -> Result<HashMap<String, Value>, BoxError> {
        let raw = self.send("status").await?;
        Ok(HashMap::from([("raw".to_string(), Value::String(raw))]))
    }
}

impl std::fmt::Debug for dyn RemoteConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConsole").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoConsole;

    #[async_trait]
    impl RemoteConsole for EchoConsole {
        async fn send(&self, command: &str) -> Result<String, BoxError> {
            Ok(format!("echo: {command}"))
        }

        async fn send_with_timeout(
            &self,
            command: &str,
            _timeout: Duration,
        ) -> Result<String, BoxError> {
            self.send(command).await
        }
    }

    #[tokio::test]
    async fn test_default_status_wraps_raw_response() {
        let console = EchoConsole;
        let status = console.status().await.unwrap();
        assert_eq!(status["raw"], Value::String("echo: status".to_string()));
    }
}
