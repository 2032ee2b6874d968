//! Itinerary e-mail over SMTP via lettre.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::error::MailerError;
use crate::questionnaire::FinalizedPreferences;

pub const ITINERARY_SUBJECT: &str = "Your Personalized Travel Itinerary";

// ── Configuration ───────────────────────────────────────────────────

/// SMTP settings, built from environment variables.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl MailerConfig {
    /// Build config from a variable source.
    /// Returns `None` if `SMTP_HOST` is not set (e-mail disabled).
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let smtp_host = var("SMTP_HOST").filter(|h| !h.is_empty())?;

        let smtp_port: u16 = var("SMTP_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = var("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(var("SMTP_PASSWORD").unwrap_or_default());
        let from_address = var("SMTP_FROM_ADDRESS").unwrap_or_else(|| username.clone());

        Some(Self {
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}

// ── Message ─────────────────────────────────────────────────────────

/// A plain-text e-mail ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Trip details header followed by the plain-text itinerary.
pub fn compose_itinerary_email(
    to: &str,
    prefs: &FinalizedPreferences,
    itinerary_text: &str,
) -> OutgoingEmail {
    let body = format!(
        "Your Travel Itinerary\n\n\
         Trip Details:\n\
         - Purpose: {}\n\
         - Length: {}\n\
         - Regions: {}\n\
         - Environment: {}\n\n\
         {}\n\n\
         Thank you for using our travel planning service!",
        prefs.trip_purpose,
        prefs.trip_length,
        prefs.preferred_regions.join(", "),
        prefs.environment_preference,
        itinerary_text.trim(),
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: ITINERARY_SUBJECT.to_string(),
        body,
    }
}

// ── Transport ───────────────────────────────────────────────────────

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailerError>;
}

/// Sends through an SMTP relay.
pub struct SmtpMailer {
    config: MailerConfig,
}

impl SmtpMailer {
    pub fn new(config: MailerConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, MailerError> {
        let from = self
            .config
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| MailerError::InvalidAddress {
                address: self.config.from_address.clone(),
                reason: format!("{e}"),
            })?;
        let to = email.to.parse::<Mailbox>().map_err(|e| MailerError::InvalidAddress {
            address: email.to.clone(),
            reason: format!("{e}"),
        })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.as_str())
            .body(email.body.clone())
            .map_err(|e| MailerError::Build(e.to_string()))
    }
}

/// Blocking SMTP send; run on the blocking pool.
fn send_blocking(config: &MailerConfig, message: &Message) -> Result<(), MailerError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::relay(&config.smtp_host)
        .map_err(|e| MailerError::Send(format!("SMTP relay error: {e}")))?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    transport
        .send(message)
        .map_err(|e| MailerError::Send(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailerError> {
        let message = self.build_message(&email)?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || send_blocking(&config, &message))
            .await
            .map_err(|e| MailerError::Send(format!("send task failed: {e}")))??;

        tracing::info!(to = %email.to, "Itinerary e-mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questionnaire::model::fixtures::finalized;

    fn test_mailer(from: &str) -> SmtpMailer {
        SmtpMailer::new(MailerConfig {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            username: "planner".into(),
            password: SecretString::from("secret"),
            from_address: from.into(),
        })
    }

    #[test]
    fn compose_includes_trip_details_and_itinerary() {
        let email = compose_itinerary_email(
            "traveler@example.com",
            &finalized(),
            "Option 1: Barbados\nDay 1: beach\n",
        );
        assert_eq!(email.subject, ITINERARY_SUBJECT);
        assert_eq!(email.to, "traveler@example.com");
        assert_eq!(
            email.body,
            "Your Travel Itinerary\n\n\
             Trip Details:\n\
             - Purpose: relaxation\n\
             - Length: short\n\
             - Regions: Caribbean\n\
             - Environment: coastal\n\n\
             Option 1: Barbados\nDay 1: beach\n\n\
             Thank you for using our travel planning service!"
        );
    }

    #[test]
    fn builds_message_for_valid_addresses() {
        let mailer = test_mailer("planner@example.com");
        let email = compose_itinerary_email("traveler@example.com", &finalized(), "Day 1");
        assert!(mailer.build_message(&email).is_ok());
    }

    #[test]
    fn rejects_invalid_recipient() {
        let mailer = test_mailer("planner@example.com");
        let email = compose_itinerary_email("not an address", &finalized(), "Day 1");
        let err = mailer.build_message(&email).unwrap_err();
        assert!(matches!(err, MailerError::InvalidAddress { .. }));
    }

    #[test]
    fn rejects_invalid_sender() {
        let mailer = test_mailer("");
        let email = compose_itinerary_email("traveler@example.com", &finalized(), "Day 1");
        assert!(matches!(
            mailer.build_message(&email),
            Err(MailerError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn config_from_lookup() {
        assert!(MailerConfig::from_lookup(|_| None).is_none());

        let config = MailerConfig::from_lookup(|key| match key {
            "SMTP_HOST" => Some("smtp.example.com".to_string()),
            "SMTP_PORT" => Some("2525".to_string()),
            "SMTP_USERNAME" => Some("planner@example.com".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.smtp_port, 2525);
        assert_eq!(config.from_address, "planner@example.com");
        assert_eq!(config.password.expose_secret(), "");
    }
}
