//! Outbound mail.
//!
//! Mail is best effort: an unconfigured relay selects [`NoopMailer`], and a
//! configured relay that fails only produces a log line. Callers never see an
//! error from [`Mailer::send`].

use std::sync::Arc;

use anyhow::Context;
use axum::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// `text` and `html` are alternative renderings of the same body.
    async fn send(&self, to: &str, subject: &str, text: &str, html: &str);
}

/// Used when SMTP is not configured.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, to: &str, subject: &str, _text: &str, _html: &str) {
        tracing::debug!(to = %to, subject = %subject, "mail not configured, skipping");
    }
}

pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("invalid SMTP_FROM address {:?}", config.from))?;

        let builder = if config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .context("build SMTP relay")?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port);

        let builder = if let (Some(username), Some(password)) = (&config.username, &config.password)
        {
            builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            builder
        };

        Ok(Self {
            from,
            transport: builder.build(),
        })
    }

    /// Text and HTML as `multipart/alternative`.
    fn compose(&self, to: &str, subject: &str, text: &str, html: &str) -> anyhow::Result<Message> {
        let to: Mailbox = to.parse().context("invalid recipient")?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .context("build message")
    }

    async fn try_send(&self, to: &str, subject: &str, text: &str, html: &str) -> anyhow::Result<()> {
        let email = self.compose(to, subject, text, html)?;
        self.transport.send(email).await.context("smtp send")?;
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, text: &str, html: &str) {
        match self.try_send(to, subject, text, html).await {
            Ok(()) => tracing::info!(to = %to, subject = %subject, "email sent"),
            Err(e) => tracing::error!(error = ?e, to = %to, subject = %subject, "email send failed"),
        }
    }
}

/// Picks the SMTP mailer when the relay is configured, the no-op one otherwise.
pub fn mailer_from_config(smtp: Option<&SmtpConfig>) -> anyhow::Result<Arc<dyn Mailer>> {
    match smtp {
        Some(cfg) => {
            tracing::info!(host = %cfg.host, port = cfg.port, "smtp mailer enabled");
            Ok(Arc::new(SmtpMailer::new(cfg)?))
        }
        None => {
            tracing::warn!("SMTP not configured, outgoing mail disabled");
            Ok(Arc::new(NoopMailer))
        }
    }
}
