//! Outbound email seam.
//!
//! Delivery is an external collaborator; callers must tolerate send failure
//! (an invite is still created and returned when its email bounces).

use async_trait::async_trait;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Default mailer used until a real delivery backend is wired in: logs the
/// message and reports success.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(
            target = "hearthside",
            event = "mail_send",
            to = %to,
            subject = %subject,
            body_len = body.len()
        );
        Ok(())
    }
}
