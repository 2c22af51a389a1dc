//! Transactional email jobs.
//!
//! Payload: `{"type": "OTP_VERIFICATION" | "PASSWORD_RESET", "to": ..., "otpCode": ...}`.

use crate::error::ProcessError;
use crate::job::{DEFAULT_MAX_RETRIES, Payload};
use crate::registry::JobProcessor;
use async_trait::async_trait;
use courier_log::info;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Job type handled by [`EmailJobProcessor`].
pub const EMAIL_JOB_TYPE: &str = "EMAIL";

/// Kind of email to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    /// Account verification code
    OtpVerification,
    /// Password reset code
    PasswordReset,
}

impl EmailKind {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailKind::OtpVerification => "OTP_VERIFICATION",
            EmailKind::PasswordReset => "PASSWORD_RESET",
        }
    }
}

impl FromStr for EmailKind {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OTP_VERIFICATION" => Ok(EmailKind::OtpVerification),
            "PASSWORD_RESET" => Ok(EmailKind::PasswordReset),
            other => Err(ProcessError::new(format!("Unknown email type: {}", other))),
        }
    }
}

impl fmt::Display for EmailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivers transactional emails.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send an account verification code.
    async fn send_otp_email(&self, to: &str, otp_code: &str) -> Result<(), ProcessError>;

    /// Send a password reset code.
    async fn send_password_reset_email(&self, to: &str, reset_code: &str)
    -> Result<(), ProcessError>;
}

/// Sender that only logs what it would send.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_otp_email(&self, to: &str, otp_code: &str) -> Result<(), ProcessError> {
        info!(
            "Mock email: OTP verification to {} (code {}), subject \"Verify Your Account\"",
            to, otp_code
        );
        Ok(())
    }

    async fn send_password_reset_email(
        &self,
        to: &str,
        reset_code: &str,
    ) -> Result<(), ProcessError> {
        info!(
            "Mock email: password reset to {} (code {}), subject \"Reset Your Password\"",
            to, reset_code
        );
        Ok(())
    }
}

/// Processor for `EMAIL` jobs.
#[derive(Clone)]
pub struct EmailJobProcessor {
    sender: Arc<dyn EmailSender>,
}

impl EmailJobProcessor {
    /// Processor delivering through `sender`.
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }
}

fn string_field<'a>(payload: &'a Payload, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(|value| value.as_str())
}

#[async_trait]
impl JobProcessor for EmailJobProcessor {
    fn job_type(&self) -> &str {
        EMAIL_JOB_TYPE
    }

    fn max_retries(&self) -> u32 {
        DEFAULT_MAX_RETRIES
    }

    async fn process(&self, payload: &Payload) -> Result<(), ProcessError> {
        let (Some(to), Some(otp_code)) = (string_field(payload, "to"), string_field(payload, "otpCode"))
        else {
            return Err(ProcessError::new("Missing required email parameters"));
        };
        let kind: EmailKind = string_field(payload, "type")
            .ok_or_else(|| ProcessError::new("Missing email type"))?
            .parse()?;

        match kind {
            EmailKind::OtpVerification => self.sender.send_otp_email(to, otp_code).await?,
            EmailKind::PasswordReset => self.sender.send_password_reset_email(to, otp_code).await?,
        }

        info!("Email sent successfully: {} to {}", kind, to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::to_payload;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSender {
        sent: Mutex<Vec<(EmailKind, String, String)>>,
    }

    #[async_trait]
    impl EmailSender for CapturingSender {
        async fn send_otp_email(&self, to: &str, otp_code: &str) -> Result<(), ProcessError> {
            self.sent
                .lock()
                .unwrap()
                .push((EmailKind::OtpVerification, to.into(), otp_code.into()));
            Ok(())
        }

        async fn send_password_reset_email(
            &self,
            to: &str,
            reset_code: &str,
        ) -> Result<(), ProcessError> {
            self.sent
                .lock()
                .unwrap()
                .push((EmailKind::PasswordReset, to.into(), reset_code.into()));
            Ok(())
        }
    }

    fn processor() -> (EmailJobProcessor, Arc<CapturingSender>) {
        let sender = Arc::new(CapturingSender::default());
        (EmailJobProcessor::new(sender.clone()), sender)
    }

    #[tokio::test]
    async fn test_otp_email() {
        let (processor, sender) = processor();
        let payload = to_payload(&json!({
            "type": "OTP_VERIFICATION",
            "to": "a@b.com",
            "otpCode": "123456"
        }))
        .unwrap();

        processor.process(&payload).await.unwrap();

        assert_eq!(
            *sender.sent.lock().unwrap(),
            vec![(
                EmailKind::OtpVerification,
                "a@b.com".to_string(),
                "123456".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_password_reset_email() {
        let (processor, sender) = processor();
        let payload = to_payload(&json!({
            "type": "PASSWORD_RESET",
            "to": "a@b.com",
            "otpCode": "654321"
        }))
        .unwrap();

        processor.process(&payload).await.unwrap();
        assert_eq!(sender.sent.lock().unwrap()[0].0, EmailKind::PasswordReset);
    }

    #[tokio::test]
    async fn test_missing_fields_fail() {
        let (processor, sender) = processor();

        let no_code = to_payload(&json!({"type": "OTP_VERIFICATION", "to": "a@b.com"})).unwrap();
        let err = processor.process(&no_code).await.unwrap_err();
        assert_eq!(err.message(), "Missing required email parameters");

        let no_type = to_payload(&json!({"to": "a@b.com", "otpCode": "1"})).unwrap();
        assert!(processor.process(&no_type).await.is_err());

        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_type_fails() {
        let (processor, _) = processor();
        let payload = to_payload(&json!({
            "type": "NEWSLETTER",
            "to": "a@b.com",
            "otpCode": "1"
        }))
        .unwrap();

        let err = processor.process(&payload).await.unwrap_err();
        assert_eq!(err.message(), "Unknown email type: NEWSLETTER");
    }

    #[tokio::test]
    async fn test_log_sender_succeeds() {
        let processor = EmailJobProcessor::new(Arc::new(LogEmailSender));
        assert_eq!(processor.job_type(), EMAIL_JOB_TYPE);
        assert_eq!(processor.max_retries(), 3);

        let payload = to_payload(&json!({
            "type": "OTP_VERIFICATION",
            "to": "a@b.com",
            "otpCode": "123456"
        }))
        .unwrap();
        assert!(processor.process(&payload).await.is_ok());
    }

    #[test]
    fn test_email_kind_round_trip_names() {
        for kind in [EmailKind::OtpVerification, EmailKind::PasswordReset] {
            assert_eq!(kind.as_str().parse::<EmailKind>().unwrap(), kind);
        }
    }
}
