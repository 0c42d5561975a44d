//! Registration verification codes.
//!
//! [`CodeIssuer`] generates a short numeric code for a destination (an email
//! address or phone number), hands it to a [`CodeDelivery`] port and returns
//! an opaque correlation key. The client later presents key, destination and
//! code to [`CodeIssuer::verify`], which consumes the code.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CODE_DIGITS: usize = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// The destination is neither an email address nor a phone number.
    #[error("only email or phone registration is supported: {0}")]
    UnsupportedDestination(String),

    #[error("verification code is invalid or expired")]
    Rejected,

    #[error("code delivery failed: {0}")]
    Delivery(String),

    #[error("code registry unavailable")]
    Unavailable,
}

/// Delivery channel, derived from the destination's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Phone,
}

impl Channel {
    pub fn detect(destination: &str) -> Result<Self, CodeError> {
        let destination = destination.trim();
        if destination.contains('@') {
            return Ok(Channel::Email);
        }
        let digits = destination.strip_prefix('+').unwrap_or(destination);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Channel::Phone);
        }
        Err(CodeError::UnsupportedDestination(destination.to_string()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Phone => "phone",
        }
    }
}

/// Outbound port for sending a code to its destination (SMS, mail, ...).
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver(&self, channel: Channel, destination: &str, code: &str) -> Result<(), CodeError>;
}

/// Delivery that only records the send in the log. The code itself is never
/// logged here.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

#[async_trait]
impl CodeDelivery for LogDelivery {
    async fn deliver(&self, channel: Channel, destination: &str, _code: &str) -> Result<(), CodeError> {
        tracing::info!(channel = channel.as_str(), destination, "verification code dispatched");
        Ok(())
    }
}

/// Result of [`CodeIssuer::issue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedCode {
    pub key: String,
    pub channel: Channel,
    pub expires_at: DateTime<Utc>,
    /// Present only in debug mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone)]
struct Pending {
    destination: String,
    code: String,
    expires_at: DateTime<Utc>,
}

pub struct CodeIssuer {
    delivery: Arc<dyn CodeDelivery>,
    ttl: Duration,
    debug: bool,
    pending: RwLock<HashMap<String, Pending>>,
}

impl CodeIssuer {
    pub fn new(delivery: Arc<dyn CodeDelivery>, ttl_secs: u64, debug: bool) -> Self {
        Self {
            delivery,
            ttl: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1000)),
            debug,
            pending: RwLock::new(HashMap::new()),
        }
    }

    pub async fn issue(&self, destination: &str) -> Result<IssuedCode, CodeError> {
        let destination = destination.trim();
        let channel = Channel::detect(destination)?;

        let (key, code) = {
            let mut rng = rand::thread_rng();
            let key = format!("{:032x}", rng.r#gen::<u128>());
            let code = format!("{:0width$}", rng.gen_range(0..10u32.pow(CODE_DIGITS as u32)), width = CODE_DIGITS);
            (key, code)
        };

        self.delivery.deliver(channel, destination, &code).await?;

        let now = Utc::now();
        let expires_at = now + self.ttl;
        {
            let mut pending = self.pending.write().map_err(|_| CodeError::Unavailable)?;
            pending.retain(|_, p| p.expires_at > now);
            pending.insert(
                key.clone(),
                Pending {
                    destination: destination.to_string(),
                    code: code.clone(),
                    expires_at,
                },
            );
        }

        if self.debug {
            tracing::debug!(destination, code = %code, "issued verification code");
        }

        Ok(IssuedCode {
            key,
            channel,
            expires_at,
            code: self.debug.then_some(code),
        })
    }

    /// Check and consume a code. A wrong code does not consume the entry.
    pub fn verify(&self, key: &str, destination: &str, code: &str) -> Result<(), CodeError> {
        let mut pending = self.pending.write().map_err(|_| CodeError::Unavailable)?;
        let entry = pending.get(key).ok_or(CodeError::Rejected)?;

        if entry.expires_at <= Utc::now() {
            pending.remove(key);
            return Err(CodeError::Rejected);
        }
        if entry.destination != destination.trim() || entry.code != code.trim() {
            return Err(CodeError::Rejected);
        }

        pending.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(Channel, String, String)>>,
    }

    #[async_trait]
    impl CodeDelivery for Recorder {
        async fn deliver(&self, channel: Channel, destination: &str, code: &str) -> Result<(), CodeError> {
            self.sent
                .lock()
                .unwrap()
                .push((channel, destination.to_string(), code.to_string()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl CodeDelivery for Failing {
        async fn deliver(&self, _: Channel, _: &str, _: &str) -> Result<(), CodeError> {
            Err(CodeError::Delivery("gateway down".into()))
        }
    }

    #[test]
    fn channel_follows_destination_shape() {
        assert_eq!(Channel::detect("alice@example.com").unwrap(), Channel::Email);
        assert_eq!(Channel::detect("+8613800000000").unwrap(), Channel::Phone);
        assert_eq!(Channel::detect("13800000000").unwrap(), Channel::Phone);
        assert!(matches!(
            Channel::detect("alice"),
            Err(CodeError::UnsupportedDestination(_))
        ));
        assert!(Channel::detect("+").is_err());
    }

    #[tokio::test]
    async fn issued_code_verifies_once() {
        let recorder = Arc::new(Recorder::default());
        let issuer = CodeIssuer::new(recorder.clone(), 60, false);

        let issued = issuer.issue("alice@example.com").await.unwrap();
        assert_eq!(issued.channel, Channel::Email);
        assert!(issued.code.is_none());

        let code = recorder.sent.lock().unwrap()[0].2.clone();
        assert_eq!(code.len(), CODE_DIGITS);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        issuer.verify(&issued.key, "alice@example.com", &code).unwrap();
        assert_eq!(
            issuer.verify(&issued.key, "alice@example.com", &code),
            Err(CodeError::Rejected)
        );
    }

    #[tokio::test]
    async fn wrong_destination_or_code_is_rejected_without_consuming() {
        let issuer = CodeIssuer::new(Arc::new(LogDelivery), 60, true);
        let issued = issuer.issue("+15550100").await.unwrap();
        let code = issued.code.clone().unwrap();

        assert_eq!(issuer.verify(&issued.key, "+15550199", &code), Err(CodeError::Rejected));
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert_eq!(issuer.verify(&issued.key, "+15550100", wrong), Err(CodeError::Rejected));

        issuer.verify(&issued.key, "+15550100", &code).unwrap();
    }

    #[tokio::test]
    async fn expired_codes_are_rejected() {
        let issuer = CodeIssuer::new(Arc::new(LogDelivery), 0, true);
        let issued = issuer.issue("bob@example.com").await.unwrap();
        let code = issued.code.unwrap();

        assert_eq!(issuer.verify(&issued.key, "bob@example.com", &code), Err(CodeError::Rejected));
    }

    #[tokio::test]
    async fn delivery_failure_leaves_nothing_pending() {
        let issuer = CodeIssuer::new(Arc::new(Failing), 60, true);
        let err = issuer.issue("carol@example.com").await.unwrap_err();
        assert!(matches!(err, CodeError::Delivery(_)));
        assert!(issuer.pending.read().unwrap().is_empty());
    }
}
