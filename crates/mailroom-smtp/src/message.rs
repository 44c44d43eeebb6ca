// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of [`OutboundEmail`] into a lettre [`Message`].

use lettre::Message;
use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{Mailbox, SinglePart};
use mailroom_core::{OutboundEmail, TransportError};

/// Build a plain-text message. Malformed addresses or headers are a
/// permanent rejection.
pub fn build_message(email: &OutboundEmail) -> Result<Message, TransportError> {
    let from_name = Some(email.from_name.trim().to_string()).filter(|n| !n.is_empty());
    let from = Mailbox::new(
        from_name,
        email
            .from_email
            .parse()
            .map_err(|e| TransportError::Rejected(format!("invalid sender address: {e}")))?,
    );
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| TransportError::Rejected(format!("invalid recipient address: {e}")))?;

    let mut message = Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.clone())
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(email.body.clone()),
        )
        .map_err(|e| TransportError::Rejected(format!("cannot build message: {e}")))?;

    for (name, value) in &email.headers {
        let name = HeaderName::new_from_ascii(name.clone())
            .map_err(|e| TransportError::Rejected(format!("invalid header name {name}: {e}")))?;
        message
            .headers_mut()
            .insert_raw(HeaderValue::new(name, value.clone()));
    }
    Ok(message)
}
