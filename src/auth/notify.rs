use async_trait::async_trait;
use tracing::info;

/// Outbound notification seam. Delivery is fire-and-forget: callers log
/// failures and never surface them to the requester.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_reset_link(&self, email: &str, token: &str) -> anyhow::Result<()>;
}

/// Stand-in delivery channel: records that a reset link was issued without
/// logging the token itself.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_reset_link(&self, email: &str, _token: &str) -> anyhow::Result<()> {
        info!(email = %email, "password reset link dispatched");
        Ok(())
    }
}
