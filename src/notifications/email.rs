//! SMTP delivery of one-time passcodes.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{Mailer, OtpEmail};
use crate::auth::OtpPurpose;
use crate::config::EmailConfig;

pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(to = %to_email, subject = %subject, "Email sent");

        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_otp(&self, email: OtpEmail<'_>) -> Result<()> {
        let subject = subject_for(email.purpose);
        let html_body = render_otp_html(&self.config.from_name, email);
        let text_body = render_otp_text(&self.config.from_name, email);
        self.send_email(email.to, subject, &html_body, &text_body)
            .await
    }
}

fn subject_for(purpose: OtpPurpose) -> &'static str {
    match purpose {
        OtpPurpose::PasswordReset => "Your password reset code",
        OtpPurpose::EmailChange => "Confirm your new email address",
    }
}

fn intro_for(purpose: OtpPurpose) -> &'static str {
    match purpose {
        OtpPurpose::PasswordReset => "Use the code below to reset your password.",
        OtpPurpose::EmailChange => "Use the code below to confirm this address for your account.",
    }
}

fn render_otp_html(product: &str, email: OtpEmail<'_>) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{subject}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif;
            background-color: #f5f5f5;
            margin: 0;
            padding: 0;
        }}
        .card {{
            max-width: 480px;
            margin: 40px auto;
            background-color: #ffffff;
            border-radius: 8px;
            padding: 32px 24px;
        }}
        .code {{
            font-size: 32px;
            font-weight: 600;
            letter-spacing: 8px;
            text-align: center;
            background-color: #f3f4f6;
            border-radius: 6px;
            padding: 16px;
            margin: 24px 0;
        }}
        .note {{
            color: #6b7280;
            font-size: 13px;
        }}
    </style>
</head>
<body>
    <div class="card">
        <p>{intro}</p>
        <div class="code">{code}</div>
        <p class="note">The code expires in {minutes} minutes and can be used once. If you did not ask for it, you can ignore this email.</p>
        <p class="note">{product}</p>
    </div>
</body>
</html>"#,
        subject = subject_for(email.purpose),
        intro = intro_for(email.purpose),
        code = html_escape(email.code),
        minutes = email.valid_minutes,
        product = html_escape(product),
    )
}

fn render_otp_text(product: &str, email: OtpEmail<'_>) -> String {
    format!(
        "{intro}\n\n    {code}\n\nThe code expires in {minutes} minutes and can be used once.\nIf you did not ask for it, you can ignore this email.\n\n---\n{product}",
        intro = intro_for(email.purpose),
        code = email.code,
        minutes = email.valid_minutes,
        product = product,
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn otp(purpose: OtpPurpose) -> OtpEmail<'static> {
        OtpEmail {
            to: "alice@co.com",
            code: "042917",
            purpose,
            valid_minutes: 5,
        }
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<script>"), "&lt;script&gt;");
        assert_eq!(html_escape("Tom & Jerry"), "Tom &amp; Jerry");
    }

    #[test]
    fn test_render_otp_text() {
        let text = render_otp_text("Workdesk", otp(OtpPurpose::PasswordReset));
        assert!(text.contains("042917"));
        assert!(text.contains("5 minutes"));
        assert!(text.contains("reset your password"));
    }

    #[test]
    fn test_render_otp_html() {
        let html = render_otp_html("Acme <Ops>", otp(OtpPurpose::EmailChange));
        assert!(html.contains("<!DOCTYPE html>"));
        assert!(html.contains("042917"));
        assert!(html.contains("Confirm your new email address"));
        assert!(html.contains("Acme &lt;Ops&gt;"));
    }

    #[tokio::test]
    async fn test_unconfigured_relay_fails() {
        let mailer = SmtpMailer::new(EmailConfig::default());
        let result = mailer.send_otp(otp(OtpPurpose::PasswordReset)).await;
        assert!(result.is_err());
    }
}
