//! Transactional email.
//!
//! Delivery goes through one of three backends chosen by configuration:
//! console (log only), SMTP, or SendGrid's SMTP relay. The transport is built
//! lazily on the first send; when the configured backend cannot be built the
//! service falls back to console delivery.

use conducky_config::{EmailConfig, EmailProviderKind};
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

mod template;

pub use template::{is_valid_template_name, render_template};

const SENDGRID_SMTP_HOST: &str = "smtp.sendgrid.net";
const SENDGRID_SMTP_PORT: u16 = 587;
const SENDGRID_SMTP_USER: &str = "apikey";

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email send failed: {0}")]
    Send(String),
    #[error("invalid template name: {0:?}")]
    InvalidTemplateName(String),
    #[error("template path outside allowed directory")]
    TemplatePathOutsideAllowedDirectory,
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error("failed to read template: {0}")]
    TemplateRead(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
    pub from: Option<String>,
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailReceipt {
    pub success: bool,
    pub message_id: String,
    pub provider: EmailProviderKind,
}

enum Transport {
    Console,
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
}

struct Delivery {
    transport: Transport,
    provider: EmailProviderKind,
}

struct Inner {
    config: EmailConfig,
    frontend_base_url: String,
    reset_ttl_minutes: i64,
    delivery: OnceCell<Delivery>,
}

#[derive(Clone)]
pub struct EmailService {
    inner: Arc<Inner>,
}

impl EmailService {
    pub fn new(config: EmailConfig, frontend_base_url: String, reset_ttl_minutes: i64) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
                reset_ttl_minutes,
                delivery: OnceCell::new(),
            }),
        }
    }

    /// Provider that actually delivers mail, after any fallback.
    pub async fn active_provider(&self) -> EmailProviderKind {
        self.delivery().await.provider
    }

    async fn delivery(&self) -> &Delivery {
        self.inner
            .delivery
            .get_or_init(|| async {
                let config = &self.inner.config;
                match build_transport(config) {
                    Ok(transport) => {
                        info!(provider = %config.provider, "email transport initialised");
                        Delivery {
                            transport,
                            provider: config.provider,
                        }
                    }
                    Err(reason) => {
                        warn!(provider = %config.provider, %reason, "email transport unavailable, falling back to console");
                        Delivery {
                            transport: Transport::Console,
                            provider: EmailProviderKind::Console,
                        }
                    }
                }
            })
            .await
    }

    pub async fn send_email(&self, email: OutgoingEmail) -> Result<EmailReceipt, EmailError> {
        let delivery = self.delivery().await;
        let message_id = Uuid::new_v4().to_string();

        match &delivery.transport {
            Transport::Console => {
                let message_id = format!("console-{message_id}");
                info!(
                    to = %email.to,
                    subject = %email.subject,
                    %message_id,
                    "email (console delivery)"
                );
                debug!(body = %email.text, "email body");
                Ok(EmailReceipt {
                    success: true,
                    message_id,
                    provider: EmailProviderKind::Console,
                })
            }
            Transport::Smtp(mailer) => {
                let message = self.build_message(&email, &message_id)?;
                mailer
                    .send(message)
                    .await
                    .map_err(|err| EmailError::Send(err.to_string()))?;
                info!(to = %email.to, subject = %email.subject, %message_id, provider = %delivery.provider, "email sent");
                Ok(EmailReceipt {
                    success: true,
                    message_id,
                    provider: delivery.provider,
                })
            }
        }
    }

    fn build_message(&self, email: &OutgoingEmail, message_id: &str) -> Result<Message, EmailError> {
        let from = email.from.as_deref().unwrap_or(&self.inner.config.from);
        let mut builder = Message::builder()
            .from(parse_mailbox(from)?)
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject.clone())
            .message_id(Some(format!("<{message_id}@conducky>")));

        if let Some(reply_to) = email.reply_to.as_deref().or(self.inner.config.reply_to.as_deref()) {
            builder = builder.reply_to(parse_mailbox(reply_to)?);
        }

        let message = match &email.html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                html.clone(),
            )),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(email.text.clone()),
        };
        message.map_err(|err| EmailError::Send(err.to_string()))
    }

    pub async fn render_template(
        &self,
        name: &str,
        variables: &[(&str, &str)],
    ) -> Result<String, EmailError> {
        render_template(&self.inner.config.templates_dir, name, variables).await
    }

    /// Render `name`, or send text only when the template cannot be used.
    async fn html_or_text_only(&self, name: &str, variables: &[(&str, &str)]) -> Option<String> {
        match self.render_template(name, variables).await {
            Ok(html) => Some(html),
            Err(err) => {
                warn!(template = name, error = %err, "sending text-only email");
                None
            }
        }
    }

    pub async fn send_password_reset(
        &self,
        to: &str,
        name: &str,
        reset_url: &str,
    ) -> Result<EmailReceipt, EmailError> {
        let minutes = self.inner.reset_ttl_minutes.to_string();
        let html = self
            .html_or_text_only(
                "password_reset",
                &[("name", name), ("resetUrl", reset_url), ("expiresInMinutes", &minutes)],
            )
            .await;

        let text = format!(
            "Hi {name},\n\nWe received a request to reset your Conducky password.\n\
             Open this link to choose a new one: {reset_url}\n\n\
             The link expires in {minutes} minutes. If you did not ask for a reset you can ignore this email.\n"
        );

        self.send_email(OutgoingEmail {
            to: to.to_string(),
            subject: "Reset your Conducky password".to_string(),
            text,
            html,
            from: None,
            reply_to: None,
        })
        .await
    }

    pub async fn send_welcome(&self, to: &str, name: &str) -> Result<EmailReceipt, EmailError> {
        let login_url = format!("{}/login", self.inner.frontend_base_url);
        let html = self
            .html_or_text_only("welcome", &[("name", name), ("loginUrl", &login_url)])
            .await;

        let text = format!(
            "Welcome, {name}!\n\nYour Conducky account is ready. Sign in at {login_url}\n"
        );

        self.send_email(OutgoingEmail {
            to: to.to_string(),
            subject: "Welcome to Conducky".to_string(),
            text,
            html,
            from: None,
            reply_to: None,
        })
        .await
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, EmailError> {
    raw.parse::<Mailbox>()
        .map_err(|err| EmailError::Send(format!("invalid address {raw:?}: {err}")))
}

fn build_transport(config: &EmailConfig) -> Result<Transport, String> {
    match config.provider {
        EmailProviderKind::Console => Ok(Transport::Console),
        EmailProviderKind::Smtp => {
            let smtp = &config.smtp;
            let host = smtp
                .host
                .as_deref()
                .filter(|host| !host.is_empty())
                .ok_or("SMTP host is not configured")?;

            let mut builder = if matches!(host, "localhost" | "127.0.0.1") {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            } else if smtp.secure {
                AsyncSmtpTransport::<Tokio1Executor>::relay(host).map_err(|err| err.to_string())?
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .map_err(|err| err.to_string())?
            };
            builder = builder.port(smtp.port);

            if let (Some(user), Some(pass)) = (&smtp.username, &smtp.password) {
                builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
            }
            Ok(Transport::Smtp(builder.build()))
        }
        EmailProviderKind::Sendgrid => {
            let api_key = config
                .sendgrid
                .api_key
                .as_deref()
                .filter(|key| !key.is_empty())
                .ok_or("SendGrid API key is not configured")?;

            let builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(SENDGRID_SMTP_HOST)
                .map_err(|err| err.to_string())?
                .port(SENDGRID_SMTP_PORT)
                .credentials(Credentials::new(
                    SENDGRID_SMTP_USER.to_string(),
                    api_key.to_string(),
                ));
            Ok(Transport::Smtp(builder.build()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conducky_config::SmtpConfig;
    use std::path::PathBuf;

    fn service(config: EmailConfig) -> EmailService {
        EmailService::new(config, "http://localhost:3001/".to_string(), 30)
    }

    fn repo_templates() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../templates/emails")
    }

    #[tokio::test]
    async fn console_delivery_returns_receipt() {
        let email = service(EmailConfig::default());
        let receipt = email
            .send_email(OutgoingEmail {
                to: "alice@example.com".into(),
                subject: "Hello".into(),
                text: "Body".into(),
                html: None,
                from: None,
                reply_to: None,
            })
            .await
            .unwrap();

        assert!(receipt.success);
        assert_eq!(receipt.provider, EmailProviderKind::Console);
        assert!(receipt.message_id.starts_with("console-"));
    }

    #[tokio::test]
    async fn smtp_without_host_falls_back_to_console() {
        let email = service(EmailConfig {
            provider: EmailProviderKind::Smtp,
            smtp: SmtpConfig::default(),
            ..EmailConfig::default()
        });
        assert_eq!(email.active_provider().await, EmailProviderKind::Console);
    }

    #[tokio::test]
    async fn sendgrid_without_key_falls_back_to_console() {
        let email = service(EmailConfig {
            provider: EmailProviderKind::Sendgrid,
            ..EmailConfig::default()
        });
        assert_eq!(email.active_provider().await, EmailProviderKind::Console);
    }

    #[tokio::test]
    async fn configured_smtp_builds_lazily_without_connecting() {
        let email = service(EmailConfig {
            provider: EmailProviderKind::Smtp,
            smtp: SmtpConfig {
                host: Some("smtp.example.org".into()),
                ..SmtpConfig::default()
            },
            ..EmailConfig::default()
        });
        assert_eq!(email.active_provider().await, EmailProviderKind::Smtp);
    }

    #[test]
    fn message_rejects_unparsable_addresses() {
        let email = service(EmailConfig::default());
        let err = email
            .build_message(
                &OutgoingEmail {
                    to: "not an address".into(),
                    subject: "s".into(),
                    text: "t".into(),
                    html: Some("<p>t</p>".into()),
                    from: None,
                    reply_to: None,
                },
                "id",
            )
            .unwrap_err();
        assert!(matches!(err, EmailError::Send(_)));
    }

    #[tokio::test]
    async fn bundled_templates_render() {
        let email = service(EmailConfig {
            templates_dir: repo_templates(),
            ..EmailConfig::default()
        });

        let html = email
            .render_template(
                "password_reset",
                &[("name", "Sam"), ("resetUrl", "https://app.test/reset?token=abc"), ("expiresInMinutes", "30")],
            )
            .await
            .unwrap();
        assert!(html.contains("Hi Sam,"));
        assert!(html.contains("https://app.test/reset?token=abc"));

        let receipt = email.send_welcome("sam@example.com", "Sam").await.unwrap();
        assert_eq!(receipt.provider, EmailProviderKind::Console);
    }
}
