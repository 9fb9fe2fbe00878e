//! Delivery status reports sent back to the sender of a failed mail
//!
//! # Report Structure (RFC 3464)
//! ```text
//! multipart/report; report-type="delivery-status"
//! ├── Part 1: text/plain (the explanation)
//! ├── Part 2: message/delivery-status (machine-readable status)
//! └── Part 3: text/rfc822-headers (original message headers)
//! ```

use std::fmt::Write as _;

use courier_common::{Mail, MailAddress, MaybeSender, State, tracing::info};

use crate::error::BounceError;

/// Prefix of a report's name; the original mail's name follows it
pub const BOUNCE_NAME_PREFIX: &str = "replyTo-";

const DEFAULT_SUBJECT: &str = "Delivery Status Notification (Failure)";

/// Build the report telling `sender` that `original` could not be delivered
///
/// The report is addressed to `sender` alone, has a null envelope sender so
/// it can never bounce itself, and starts processing from the root state.
///
/// # Errors
///
/// Returns [`BounceError::Message`] if the original message's headers
/// cannot be read.
pub fn build_bounce(
    original: &Mail,
    sender: &MailAddress,
    explanation: &str,
    bouncer: &MailAddress,
    reporting_mta: &str,
) -> Result<Mail, BounceError> {
    let unreadable = |source| BounceError::Message {
        name: original.name().to_string(),
        source,
    };

    let original_headers = original.message().header_block().map_err(unreadable)?;
    let subject = original
        .message()
        .subject()
        .map_err(unreadable)?
        .map_or_else(|| DEFAULT_SUBJECT.to_string(), |subject| format!("Re: {subject}"));
    let original_id = original.message().header("Message-ID").map_err(unreadable)?;

    let name = format!("{BOUNCE_NAME_PREFIX}{}", original.name());

    info!(
        mail = %original.name(),
        %sender,
        %bouncer,
        "Generating bounce"
    );

    let boundary = format!("----=_Part_{}", ulid::Ulid::new());
    let status = delivery_status(original, reporting_mta);

    let mut report = String::new();
    let _ = write!(
        report,
        "Content-Type: multipart/report; report-type=\"delivery-status\"; boundary=\"{boundary}\"\r\n\
        MIME-Version: 1.0\r\n\
        From: Mail Delivery System <{bouncer}>\r\n\
        To: {sender}\r\n\
        Subject: {subject}\r\n\
        Date: {date}\r\n\
        Message-ID: <{name}@{reporting_mta}>\r\n",
        date = chrono::Utc::now().to_rfc2822(),
    );
    if let Some(original_id) = original_id {
        let _ = write!(report, "In-Reply-To: {original_id}\r\n");
    }
    let _ = write!(
        report,
        "Auto-Submitted: auto-replied\r\n\
        \r\n\
        This is a multi-part message in MIME format.\r\n\
        \r\n\
        --{boundary}\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        Content-Transfer-Encoding: 8bit\r\n\
        \r\n\
        {explanation}\r\n\
        --{boundary}\r\n\
        Content-Type: message/delivery-status\r\n\
        Content-Transfer-Encoding: 7bit\r\n\
        \r\n\
        {status}\r\n\
        --{boundary}\r\n\
        Content-Type: text/rfc822-headers\r\n\
        Content-Transfer-Encoding: 8bit\r\n\
        \r\n\
        {original_headers}\r\n\
        --{boundary}--\r\n",
    );

    Ok(Mail::builder()
        .name(name)
        .sender(MaybeSender::Null)
        .recipient(sender.clone())
        .message(report.into_bytes())
        .state(State::ROOT)
        .build())
}

/// The machine-readable part: one per-recipient group for every original
/// recipient
fn delivery_status(original: &Mail, reporting_mta: &str) -> String {
    let mut status = format!("Reporting-MTA: dns; {reporting_mta}\r\n");

    for recipient in original.recipients() {
        let _ = write!(
            status,
            "\r\nFinal-Recipient: rfc822; {recipient}\r\n\
            Action: failed\r\n\
            Status: 5.0.0\r\n"
        );
    }

    status
}
