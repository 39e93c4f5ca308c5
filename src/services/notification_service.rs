//! Mail notices sent on passcode issuance and team dissolution.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, instrument, warn};

use crate::auth::team::DissolvedTeam;
use crate::errors::Result;
use crate::mail::{MailSender, OutboundMail};
use crate::observability::metrics;

/// Formats notices and hands them to the configured [`MailSender`].
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn MailSender>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn MailSender>) -> Self {
        Self { mailer }
    }

    /// Deliver a freshly issued passcode. Errors propagate so the caller can
    /// roll the passcode back.
    #[instrument(skip(self, code), fields(email = %email))]
    pub async fn passcode(&self, email: &str, code: &str, expires_in: Duration) -> Result<()> {
        let minutes = expires_in.as_secs().div_ceil(60).max(1);
        let body = format!(
            "<p>Your verification code is <strong>{code}</strong>.</p>\
             <p>It expires in {minutes} minute{}. If you did not request it, ignore this message.</p>",
            if minutes == 1 { "" } else { "s" }
        );
        self.mailer.send(OutboundMail::html(email, "Your verification code", body)).await
    }

    /// Tell every former member that their team is gone.
    ///
    /// Sends run concurrently. Failures are logged and counted, never
    /// returned: the dissolution has already committed. Returns the number
    /// of sends attempted.
    #[instrument(skip(self, dissolved), fields(team_id = %dissolved.team.id, team_name = %dissolved.team.name))]
    pub async fn team_dissolved(&self, dissolved: &DissolvedTeam) -> usize {
        let subject = format!("Team {} has been dissolved", dissolved.team.name);
        let body = format!(
            "<p>The team <strong>{}</strong> no longer exists because its leader left or deleted it.</p>\
             <p>You can create a new team or join another one with its join code.</p>",
            dissolved.team.name
        );

        let sends = dissolved.former_members.iter().map(|member| {
            let mail = OutboundMail::html(member.email.clone(), subject.clone(), body.clone());
            async move { (member.email.as_str(), self.mailer.send(mail).await) }
        });

        let outcomes = join_all(sends).await;
        let attempted = outcomes.len();
        let mut failed = 0usize;
        for (email, outcome) in outcomes {
            if let Err(e) = outcome {
                failed += 1;
                metrics::record_notification_failure("team_dissolved");
                warn!(email = %email, error = %e, "Failed to deliver team dissolution notice");
            }
        }

        info!(attempted, failed, "Team dissolution notices sent");
        attempted
    }
}
