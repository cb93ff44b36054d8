//! Outgoing borrower notifications

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Notification errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Mail has no recipient")]
    MissingRecipient,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An HTML mail ready to be sent
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Mail {
    pub email_from: String,
    pub email_to: String,
    pub subject: String,
    pub body_html: String,
}

/// Mail delivery seam
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<(), NotifyError>;
}

/// Confirmation mail sent when a loan request is confirmed
pub fn loan_confirmation(
    sender: &str,
    partner_name: &str,
    partner_email: &str,
    reference: &str,
) -> Mail {
    Mail {
        email_from: sender.to_string(),
        email_to: partner_email.to_string(),
        subject: "Loan Confirmation".to_string(),
        body_html: format!(
            "Dear {},<br/> This is a confirmation mail for your loan {}. \
             We have submitted your loan for approval.",
            escape_html(partner_name),
            escape_html(reference)
        ),
    }
}

/// Escape text interpolated into an HTML body
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
