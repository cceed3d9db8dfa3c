use async_trait::async_trait;
use tracing::info;

/// Outbound notifier for password recovery. Delivery is an external concern;
/// callers await the handoff but never surface its failure.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, to: &str, reset_link: &str) -> anyhow::Result<()>;
}

/// Default notifier: records the handoff in the log stream. Deployments wire
/// a real relay behind the trait.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, to: &str, reset_link: &str) -> anyhow::Result<()> {
        info!(to = %to, link = %reset_link, "password reset link issued");
        Ok(())
    }
}
