//! Outbound transactional mail: login codes, contact form, invoice PDFs.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::{EmailConfig, EmailTransportConfig};

#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct OutgoingMail {
    pub to: String,
    pub to_name: Option<String>,
    pub bcc: Option<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
    pub attachment: Option<MailAttachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()>;
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

pub struct LettreMailer {
    transport: EmailTransport,
    from: Mailbox,
}

impl LettreMailer {
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        let transport = match &config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }
                let builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                        .context("create SMTP transport")?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                };
                EmailTransport::Smtp(
                    builder
                        .port(*port)
                        .credentials(Credentials::new(username.clone(), password.clone()))
                        .build(),
                )
            }
            EmailTransportConfig::File { path } => {
                let dir = Path::new(path);
                if !dir.exists() {
                    std::fs::create_dir_all(dir).context("create emails directory")?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(dir))
            }
        };

        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .context("parse from address")?;

        Ok(Self { transport, from })
    }
}

pub fn build_message(from: &Mailbox, mail: &OutgoingMail) -> anyhow::Result<Message> {
    let to = match &mail.to_name {
        Some(name) => format!("{name} <{}>", mail.to),
        None => mail.to.clone(),
    }
    .parse::<Mailbox>()
    .context("parse to address")?;

    let mut builder = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(mail.subject.clone());
    if let Some(bcc) = &mail.bcc {
        builder = builder.bcc(bcc.parse::<Mailbox>().context("parse bcc address")?);
    }
    if let Some(reply_to) = &mail.reply_to {
        builder = builder.reply_to(reply_to.parse::<Mailbox>().context("parse reply-to address")?);
    }

    let message = match &mail.attachment {
        Some(att) => {
            let content_type =
                ContentType::parse(&att.content_type).context("parse attachment content type")?;
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(mail.text.clone()))
                    .singlepart(
                        Attachment::new(att.filename.clone()).body(att.body.clone(), content_type),
                    ),
            )
        }
        None => builder
            .header(ContentType::TEXT_PLAIN)
            .body(mail.text.clone()),
    }
    .context("build email message")?;
    Ok(message)
}

#[async_trait]
impl Mailer for LettreMailer {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        let message = build_message(&self.from, &mail)?;
        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.context("send SMTP email")?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.context("send file email")?;
            }
        }
        tracing::info!(to = %mail.to, subject = %mail.subject, "email sent");
        Ok(())
    }
}

pub fn login_code_mail(to: &str, code: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Your login validation code".into(),
        text: format!("Your validation code is: {code}\n\nIt expires in 10 minutes."),
        ..Default::default()
    }
}

pub fn contact_mail(
    admin: &str,
    name: &str,
    email: &str,
    phone: Option<&str>,
    message: &str,
) -> OutgoingMail {
    OutgoingMail {
        to: admin.to_string(),
        reply_to: Some(email.to_string()),
        subject: "New message from the website contact form".into(),
        text: format!(
            "You have received a new message from your website contact form.\n\n\
             Full Name: {name}\nEmail: {email}\nPhone: {}\n\nMessage:\n{message}\n",
            phone.unwrap_or("-")
        ),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from() -> Mailbox {
        "Site Desk <office@example.com>".parse().unwrap()
    }

    #[test]
    fn builds_plain_message() {
        let mail = login_code_mail("admin@example.com", "123456");
        let msg = build_message(&from(), &mail).unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("To: admin@example.com"));
        assert!(raw.contains("123456"));
    }

    #[test]
    fn builds_message_with_attachment_and_bcc() {
        let mail = OutgoingMail {
            to: "client@example.com".into(),
            to_name: Some("Jane Client".into()),
            bcc: Some("office@example.com".into()),
            subject: "Invoice for Jane Client".into(),
            text: "Please find attached your invoice.".into(),
            attachment: Some(MailAttachment {
                filename: "invoice.pdf".into(),
                content_type: "application/pdf".into(),
                body: b"%PDF-1.3".to_vec(),
            }),
            ..Default::default()
        };
        let msg = build_message(&from(), &mail).unwrap();
        let raw = String::from_utf8_lossy(&msg.formatted()).to_string();
        assert!(raw.contains("invoice.pdf"));
        assert!(raw.contains("application/pdf"));
    }

    #[test]
    fn rejects_invalid_recipient() {
        let mail = OutgoingMail {
            to: "not an address".into(),
            subject: "x".into(),
            ..Default::default()
        };
        assert!(build_message(&from(), &mail).is_err());
    }

    #[test]
    fn contact_mail_replies_to_visitor() {
        let mail = contact_mail("admin@example.com", "Sam", "sam@example.com", None, "Need a deck");
        assert_eq!(mail.reply_to.as_deref(), Some("sam@example.com"));
        assert!(mail.text.contains("Phone: -"));
        assert!(mail.text.contains("Need a deck"));
    }
}
