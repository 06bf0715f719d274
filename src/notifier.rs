use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::SmtpConfig;
use crate::utils::error::{AppError, Result};

/// One notification: a single (ad, subscriber) pair with the observed
/// price movement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceChangeEvent {
    pub ad_url: String,
    pub ad_title: String,
    pub old_price: Option<Decimal>,
    pub new_price: Decimal,
    pub currency: String,
    pub recipient_email: String,
    pub recipient_name: String,
}

/// Delivery seam for the check workflow. Delivery is fire-and-forget:
/// a failure is returned as a value and the caller logs it and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &PriceChangeEvent) -> Result<()>;
}

/// Sends price change notifications over SMTP.
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| AppError::Internal(format!("SMTP relay setup failed: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| AppError::Validation(format!("Invalid from address: {}", e)))?;

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }

    fn format_subject(event: &PriceChangeEvent) -> String {
        format!("Price Change Notification: {}", event.ad_title)
    }

    fn format_old_price(event: &PriceChangeEvent) -> String {
        match &event.old_price {
            Some(price) => format!("{} {}", price, event.currency),
            None => "n/a".to_string(),
        }
    }

    fn format_text_body(event: &PriceChangeEvent) -> String {
        format!(
            "Hello, {}!\n\n\
             We're notifying you that the price for the OLX ad\n\
             \"{}\"\n\
             has changed.\n\n\
             - Old Price: {}\n\
             - New Price: {} {}\n\n\
             View Ad: {}\n\n\
             Thank you for using our service!\n\n\
             Regards,\n\
             The OLX Price Tracker Team\n",
            event.recipient_name,
            event.ad_title,
            Self::format_old_price(event),
            event.new_price,
            event.currency,
            event.ad_url,
        )
    }

    fn format_html_body(event: &PriceChangeEvent) -> String {
        format!(
            r#"<html>
<body style="font-family: Arial, sans-serif; margin: 20px;">
    <h1>Price Change Notification</h1>
    <p>Hello, {}!</p>
    <p>We're notifying you that the price for the OLX ad<br>
    <strong>{}</strong><br>
    has changed.</p>
    <ul>
        <li><strong>Old Price:</strong> {}</li>
        <li><strong>New Price:</strong> {} {}</li>
    </ul>
    <p><a href="{}">View Ad</a></p>
    <p>Thank you for using our service!</p>
    <p>Regards,<br>The OLX Price Tracker Team</p>
</body>
</html>
"#,
            event.recipient_name,
            event.ad_title,
            Self::format_old_price(event),
            event.new_price,
            event.currency,
            event.ad_url,
        )
    }

    fn build_message(&self, event: &PriceChangeEvent) -> Result<Message> {
        let to: Mailbox = format!("{} <{}>", event.recipient_name, event.recipient_email)
            .parse()
            .map_err(|e| AppError::Delivery {
                recipient: event.recipient_email.clone(),
                message: format!("invalid recipient address: {}", e),
            })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(Self::format_subject(event))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(Self::format_text_body(event)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(Self::format_html_body(event)),
                    ),
            )
            .map_err(|e| AppError::Delivery {
                recipient: event.recipient_email.clone(),
                message: format!("failed to build message: {}", e),
            })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, event: &PriceChangeEvent) -> Result<()> {
        let message = self.build_message(event)?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| AppError::Delivery {
                recipient: event.recipient_email.clone(),
                message: e.to_string(),
            })?;

        tracing::info!(
            recipient = %event.recipient_email,
            url = %event.ad_url,
            "sent price change notification"
        );
        Ok(())
    }
}
