//! Outbound mail
//!
//! The rest of the crate only sees [`MailSender`]. Production uses
//! [`SmtpMailPool`]; development without an SMTP relay uses
//! [`ConsoleMailSender`].

pub mod console;
pub mod smtp;

pub use console::ConsoleMailSender;
pub use smtp::SmtpMailPool;

use crate::errors::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// File attached to an outbound message.
#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// One message to one recipient.
#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<MailAttachment>,
}

impl OutboundMail {
    pub fn html(to: impl Into<String>, subject: impl Into<String>, html_body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html_body: html_body.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: MailAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: OutboundMail) -> Result<()>;
}

#[async_trait]
impl<T: MailSender + ?Sized> MailSender for Arc<T> {
    async fn send(&self, mail: OutboundMail) -> Result<()> {
        (**self).send(mail).await
    }
}
