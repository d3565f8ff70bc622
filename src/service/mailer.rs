use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::SmtpConfig;

#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<MailAttachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

pub fn build_message(from: &Mailbox, mail: &OutgoingMail) -> Result<Message> {
    if mail.to.is_empty() {
        return Err(anyhow!("Mail has no recipients"));
    }

    let mut builder = Message::builder().from(from.clone()).subject(mail.subject.clone());
    for to in &mail.to {
        builder = builder.to(to.parse().with_context(|| format!("Invalid recipient {to}"))?);
    }
    for cc in &mail.cc {
        builder = builder.cc(cc.parse().with_context(|| format!("Invalid cc address {cc}"))?);
    }

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
    for a in &mail.attachments {
        let content_type = ContentType::parse(&a.content_type)
            .map_err(|e| anyhow!("Invalid content type {}: {e}", a.content_type))?;
        parts = parts.singlepart(Attachment::new(a.filename.clone()).body(a.content.clone(), content_type));
    }

    builder.multipart(parts).context("Failed to build mail")
}

/// Sends through an SMTP relay. Without SMTP settings every send fails.
pub struct SmtpMailer {
    relay: Option<(AsyncSmtpTransport<Tokio1Executor>, Mailbox)>,
}

impl SmtpMailer {
    pub fn from_config(smtp: Option<&SmtpConfig>) -> Result<Self> {
        let Some(smtp) = smtp else {
            return Ok(Self { relay: None });
        };

        let from: Mailbox = smtp
            .from
            .parse()
            .with_context(|| format!("Invalid MAIL_FROM {:?}", smtp.from))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
            .with_context(|| format!("Invalid SMTP host {}", smtp.host))?
            .port(smtp.port)
            .credentials(Credentials::new(smtp.username.clone(), smtp.password.clone()))
            .build();

        Ok(Self {
            relay: Some((transport, from)),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let (transport, from) = self
            .relay
            .as_ref()
            .ok_or_else(|| anyhow!("SMTP is not configured"))?;

        let message = build_message(from, &mail)?;
        transport.send(message).await.context("SMTP delivery failed")?;

        info!(to = ?mail.to, subject = %mail.subject, "Mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &[&str]) -> OutgoingMail {
        OutgoingMail {
            to: to.iter().map(|s| s.to_string()).collect(),
            cc: vec!["audit@example.com".into()],
            subject: "Weekly leave".into(),
            body: "Attached.".into(),
            attachments: vec![MailAttachment {
                filename: "report-r1.csv".into(),
                content_type: "text/csv".into(),
                content: b"a,b\n1,2\n".to_vec(),
            }],
        }
    }

    #[test]
    fn message_carries_attachment_and_cc() {
        let from: Mailbox = "hr@example.com".parse().unwrap();
        let message = build_message(&from, &mail(&["ops@example.com"])).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();

        assert!(raw.contains("report-r1.csv"));
        assert!(raw.contains("Cc: audit@example.com"));
        assert!(raw.contains("Subject: Weekly leave"));
    }

    #[test]
    fn bad_or_missing_recipients_fail() {
        let from: Mailbox = "hr@example.com".parse().unwrap();
        assert!(build_message(&from, &mail(&[])).is_err());
        assert!(build_message(&from, &mail(&["not an address"])).is_err());
    }

    #[actix_web::test]
    async fn unconfigured_mailer_refuses_to_send() {
        let mailer = SmtpMailer::from_config(None).unwrap();
        let err = mailer.send(mail(&["ops@example.com"])).await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }
}
