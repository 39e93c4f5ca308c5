//! Pooled SMTP sender
//!
//! One channel per configured sender credential. A send checks a channel out,
//! uses it, and checks it back in. A channel whose send failed (or was
//! cancelled mid-flight) goes back without its transport, and the transport
//! is rebuilt on the next checkout. Sends are never retried on the same
//! channel.

use super::{MailSender, OutboundMail};
use crate::config::{MailConfig, MailCredential};
use crate::errors::{HackathonError, Result};
use crate::observability::metrics;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::PoolConfig;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, instrument, warn};

type Transport = AsyncSmtpTransport<Tokio1Executor>;

/// SMTPS (implicit TLS) port; every other port negotiates STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

struct Channel {
    credential: MailCredential,
    transport: Option<Transport>,
}

/// Exclusive use of one channel. Returned to the pool on drop.
struct ChannelGuard<'a> {
    pool: &'a SmtpMailPool,
    channel: Option<Channel>,
    healthy: bool,
    _permit: SemaphorePermit<'a>,
}

impl ChannelGuard<'_> {
    fn transport(&mut self) -> Result<Transport> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| HackathonError::internal("Mail channel already returned"))?;

        if let Some(transport) = &channel.transport {
            return Ok(transport.clone());
        }

        debug!(username = %channel.credential.username, "Building SMTP channel");
        let transport = self.pool.build_transport(&channel.credential)?;
        channel.transport = Some(transport.clone());
        Ok(transport)
    }

    fn username(&self) -> &str {
        self.channel.as_ref().map(|c| c.credential.username.as_str()).unwrap_or("")
    }
}

impl Drop for ChannelGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if !self.healthy {
                channel.transport = None;
            }
            if let Ok(mut idle) = self.pool.idle.lock() {
                idle.push_back(channel);
            }
        }
    }
}

pub struct SmtpMailPool {
    host: String,
    port: u16,
    from: Mailbox,
    send_timeout: Duration,
    idle: Mutex<VecDeque<Channel>>,
    permits: Semaphore,
}

impl SmtpMailPool {
    /// Create the pool. Channels connect lazily on first use.
    pub fn new(config: &MailConfig) -> Result<Self> {
        let host = config
            .smtp_host
            .clone()
            .ok_or_else(|| HackathonError::config("SMTP host is not configured"))?;

        if config.credentials.is_empty() {
            return Err(HackathonError::config("At least one SMTP sender credential is required"));
        }

        let from: Mailbox = config.from_address.parse().map_err(|e| {
            HackathonError::config(format!("Invalid sender address '{}': {}", config.from_address, e))
        })?;

        let channels: VecDeque<Channel> = config
            .credentials
            .iter()
            .cloned()
            .map(|credential| Channel { credential, transport: None })
            .collect();

        info!(
            host = %host,
            port = config.smtp_port,
            channels = channels.len(),
            "SMTP mail pool configured"
        );

        Ok(Self {
            host,
            port: config.smtp_port,
            from,
            send_timeout: config.send_timeout(),
            permits: Semaphore::new(channels.len()),
            idle: Mutex::new(channels),
        })
    }

    fn build_transport(&self, credential: &MailCredential) -> Result<Transport> {
        let builder = if self.port == IMPLICIT_TLS_PORT {
            Transport::relay(&self.host)?
        } else {
            Transport::starttls_relay(&self.host)?
        };

        Ok(builder
            .port(self.port)
            .credentials(Credentials::new(credential.username.clone(), credential.password.clone()))
            .timeout(Some(self.send_timeout))
            .pool_config(PoolConfig::new().max_size(1))
            .build())
    }

    async fn checkout(&self) -> Result<ChannelGuard<'_>> {
        let permit = tokio::time::timeout(self.send_timeout, self.permits.acquire())
            .await
            .map_err(|_| {
                HackathonError::timeout("mail channel checkout", self.send_timeout.as_millis() as u64)
            })?
            .map_err(|_| HackathonError::internal("Mail pool closed"))?;

        let channel = self
            .idle
            .lock()
            .map_err(|_| HackathonError::internal("Mail pool lock poisoned"))?
            .pop_front()
            .ok_or_else(|| HackathonError::internal("Mail pool has no idle channel"))?;

        Ok(ChannelGuard { pool: self, channel: Some(channel), healthy: false, _permit: permit })
    }

    fn build_message(&self, mail: &OutboundMail) -> Result<Message> {
        let to: Mailbox = mail.to.parse().map_err(|_| {
            HackathonError::validation_field(format!("Invalid recipient address '{}'", mail.to), "to")
        })?;

        let builder = Message::builder().from(self.from.clone()).to(to).subject(&mail.subject);

        if mail.attachments.is_empty() {
            return Ok(builder.header(ContentType::TEXT_HTML).body(mail.html_body.clone())?);
        }

        let mut body = MultiPart::mixed().singlepart(SinglePart::html(mail.html_body.clone()));
        for attachment in &mail.attachments {
            let content_type = ContentType::parse(&attachment.content_type).map_err(|_| {
                HackathonError::validation(format!(
                    "Invalid attachment content type '{}'",
                    attachment.content_type
                ))
            })?;
            body = body.singlepart(
                Attachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), content_type),
            );
        }

        Ok(builder.multipart(body)?)
    }

    /// Channels currently holding a built transport
    #[cfg(test)]
    fn built_channels(&self) -> usize {
        self.idle.lock().map(|idle| idle.iter().filter(|c| c.transport.is_some()).count()).unwrap_or(0)
    }
}

#[async_trait]
impl MailSender for SmtpMailPool {
    #[instrument(skip(self, mail), fields(to = %mail.to, subject = %mail.subject))]
    async fn send(&self, mail: OutboundMail) -> Result<()> {
        let message = self.build_message(&mail)?;

        let mut channel = self.checkout().await?;
        let transport = channel.transport()?;

        let outcome = tokio::time::timeout(self.send_timeout, transport.send(message)).await;
        match outcome {
            Ok(Ok(_)) => {
                channel.healthy = true;
                metrics::record_mail_sent("success");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(error = %e, sender = %channel.username(), "SMTP send failed, discarding channel");
                metrics::record_mail_sent("error");
                Err(e.into())
            }
            Err(_) => {
                warn!(sender = %channel.username(), "SMTP send timed out, discarding channel");
                metrics::record_mail_sent("timeout");
                Err(HackathonError::timeout("smtp send", self.send_timeout.as_millis() as u64))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::MailAttachment;

    fn config(credentials: usize) -> MailConfig {
        MailConfig {
            smtp_host: Some("smtp.example.com".to_string()),
            smtp_port: 587,
            from_address: "Hackathon <no-reply@example.com>".to_string(),
            credentials: (0..credentials)
                .map(|i| MailCredential {
                    username: format!("sender{}@example.com", i),
                    password: "secret".to_string(),
                })
                .collect(),
            send_timeout_seconds: 1,
        }
    }

    #[test]
    fn requires_host_and_credentials() {
        let mut no_host = config(1);
        no_host.smtp_host = None;
        assert!(SmtpMailPool::new(&no_host).is_err());
        assert!(SmtpMailPool::new(&config(0)).is_err());
        assert!(SmtpMailPool::new(&config(2)).is_ok());
    }

    #[test]
    fn rejects_invalid_recipient() {
        let pool = SmtpMailPool::new(&config(1)).unwrap();
        let mail = OutboundMail::html("not an address", "Hi", "<p>Hi</p>");
        let err = pool.build_message(&mail).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn builds_multipart_with_attachments() {
        let pool = SmtpMailPool::new(&config(1)).unwrap();
        let mail = OutboundMail::html("dev@example.com", "Export", "<p>Attached</p>").with_attachment(
            MailAttachment {
                filename: "teams.csv".to_string(),
                content_type: "text/csv".to_string(),
                data: b"name\nAlpha\n".to_vec(),
            },
        );
        let message = pool.build_message(&mail).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("teams.csv"));
    }

    #[tokio::test]
    async fn unhealthy_channel_drops_transport_on_checkin() {
        let pool = SmtpMailPool::new(&config(2)).unwrap();

        {
            let mut guard = pool.checkout().await.unwrap();
            guard.transport().unwrap();
            guard.healthy = true;
        }
        assert_eq!(pool.built_channels(), 1);

        // Two checkouts so both channels are in use, one of them the built one.
        {
            let mut first = pool.checkout().await.unwrap();
            let mut second = pool.checkout().await.unwrap();
            first.transport().unwrap();
            second.transport().unwrap();
        }
        assert_eq!(pool.built_channels(), 0);
    }

    #[tokio::test]
    async fn checkout_waits_for_free_channel() {
        let pool = SmtpMailPool::new(&config(1)).unwrap();
        let _held = pool.checkout().await.unwrap();

        let err = pool.checkout().await.err().unwrap();
        assert!(matches!(err, HackathonError::Timeout { .. }));
    }
}
