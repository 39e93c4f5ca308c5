//! Mail sender that writes messages to the log (for development)

use super::{MailSender, OutboundMail};
use crate::errors::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct ConsoleMailSender;

impl ConsoleMailSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MailSender for ConsoleMailSender {
    async fn send(&self, mail: OutboundMail) -> Result<()> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            attachments = mail.attachments.len(),
            body = %mail.html_body,
            "Mail delivery (console)"
        );
        Ok(())
    }
}
