//! Outbound message assembly.

use lettre::message::header::{self, ContentType, HeaderName, HeaderValue, Headers};
use lettre::message::{Attachment, MultiPart, SinglePart};

use crate::error::{MailerError, Result};
use crate::resolve::{SignatureImage, SIGNATURE_CID};
use crate::template::TemplateKind;

/// A serialized message plus the envelope it must be delivered with.
///
/// Envelope addresses are kept exactly as the caller supplied them. Parsing
/// them is up to the transport.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    envelope_sender: String,
    envelope_recipients: Vec<String>,
    to_header: String,
    formatted: Vec<u8>,
}

impl OutboundMessage {
    pub fn envelope_sender(&self) -> &str {
        &self.envelope_sender
    }

    pub fn envelope_recipients(&self) -> &[String] {
        &self.envelope_recipients
    }

    /// Value of the `To` header: recipients joined by `,`.
    pub fn to_header(&self) -> &str {
        &self.to_header
    }

    /// The full RFC 5322 message.
    pub fn formatted(&self) -> &[u8] {
        &self.formatted
    }
}

/// Rendered content shared by every message of one send call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Content<'a> {
    pub subject: &'a str,
    pub kind: TemplateKind,
    pub body: &'a str,
    pub signature: Option<&'a SignatureImage>,
}

/// Build a `multipart/related` message from `sender` to `recipients`.
///
/// The body part comes first, followed by the inline signature image when
/// one is present. `From` and `To` are written as given; only header
/// encoding is applied to them.
pub(crate) fn assemble(
    sender: &str,
    recipients: &[String],
    content: Content<'_>,
) -> Result<OutboundMessage> {
    let body = match content.kind {
        TemplateKind::Plain => SinglePart::plain(content.body.to_string()),
        TemplateKind::Html => SinglePart::html(content.body.to_string()),
    };
    let mut parts = MultiPart::related().singlepart(body);

    if let Some(signature) = content.signature {
        let content_type = ContentType::parse(signature.content_type())
            .map_err(|e| MailerError::Message(e.to_string()))?;
        parts = parts.singlepart(
            Attachment::new_inline(SIGNATURE_CID.to_string())
                .body(signature.bytes().to_vec(), content_type),
        );
    }

    let to_header = recipients.join(",");

    let mut headers = Headers::new();
    headers.set(header::Date::now());
    headers.insert_raw(HeaderValue::new(
        HeaderName::new_from_ascii_str("From"),
        sender.to_string(),
    ));
    headers.insert_raw(HeaderValue::new(
        HeaderName::new_from_ascii_str("To"),
        to_header.clone(),
    ));
    headers.set(header::Subject::from(content.subject.to_string()));
    headers.set(header::MIME_VERSION_1_0);

    let mut formatted = headers.to_string().into_bytes();
    formatted.extend_from_slice(&parts.formatted());

    Ok(OutboundMessage {
        envelope_sender: sender.to_string(),
        envelope_recipients: recipients.to_vec(),
        to_header,
        formatted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(msg: &OutboundMessage) -> String {
        String::from_utf8_lossy(msg.formatted()).to_string()
    }

    fn content<'a>(kind: TemplateKind, body: &'a str, signature: Option<&'a SignatureImage>) -> Content<'a> {
        Content {
            subject: "Test subject",
            kind,
            body,
            signature,
        }
    }

    #[test]
    fn plain_message_headers() {
        let recipients = vec!["a@x.com".to_string(), "b@x.com".to_string()];
        let msg = assemble(
            "from@example.com",
            &recipients,
            content(TemplateKind::Plain, "hello", None),
        )
        .unwrap();

        assert_eq!(msg.envelope_sender(), "from@example.com");
        assert_eq!(msg.envelope_recipients(), recipients.as_slice());
        assert_eq!(msg.to_header(), "a@x.com,b@x.com");

        let raw = text(&msg);
        assert!(raw.contains("From: from@example.com"), "got: {raw}");
        assert!(raw.contains("To: a@x.com,b@x.com"), "got: {raw}");
        assert!(raw.contains("Subject: Test subject"), "got: {raw}");
        assert!(raw.contains("multipart/related"), "got: {raw}");
        assert!(raw.contains("text/plain; charset=utf-8"), "got: {raw}");
        assert!(raw.contains("hello"), "got: {raw}");
        assert!(!raw.contains("Content-ID"), "got: {raw}");
    }

    #[test]
    fn html_message_with_signature_part() {
        let signature = SignatureImage::from_bytes(b"\x89PNG\r\n\x1a\nimage".to_vec());
        let msg = assemble(
            "from@html.example.com",
            &["to@example.com".to_string()],
            content(TemplateKind::Html, "<p>hi</p>", Some(&signature)),
        )
        .unwrap();

        let raw = text(&msg);
        assert!(raw.contains("text/html; charset=utf-8"), "got: {raw}");
        assert!(raw.contains("Content-ID: <signature_image>"), "got: {raw}");
        assert!(raw.contains("Content-Disposition: inline"), "got: {raw}");
        assert!(raw.contains("image/png"), "got: {raw}");

        let body_at = raw.find("<p>hi</p>").unwrap();
        let image_at = raw.find("Content-ID: <signature_image>").unwrap();
        assert!(body_at < image_at, "body part must precede the image part");
    }

    #[test]
    fn non_ascii_subject_is_encoded() {
        let msg = assemble(
            "from@example.com",
            &["to@example.com".to_string()],
            Content {
                subject: "Überprüfung",
                kind: TemplateKind::Plain,
                body: "x",
                signature: None,
            },
        )
        .unwrap();
        let raw = text(&msg);
        assert!(raw.contains("Subject: =?utf-8?b?"), "got: {raw}");
        assert!(!raw.contains("Überprüfung"), "got: {raw}");
    }

    #[test]
    fn ascii_subject_is_written_verbatim() {
        let msg = assemble(
            "from@example.com",
            &["to@example.com".to_string()],
            content(TemplateKind::Plain, "x", None),
        )
        .unwrap();
        let raw = text(&msg);
        assert!(raw.contains("Subject: Test subject\r\n"), "got: {raw}");
        assert!(raw.contains("MIME-Version: 1.0\r\n"), "got: {raw}");
        assert!(raw.contains("Date: "), "got: {raw}");
    }

    #[test]
    fn addresses_pass_through_unparsed() {
        let recipients = vec!["ops".to_string(), "Team <team@example.com>".to_string()];
        let msg = assemble(
            "postmaster",
            &recipients,
            content(TemplateKind::Plain, "x", None),
        )
        .unwrap();

        assert_eq!(msg.envelope_sender(), "postmaster");
        assert_eq!(msg.envelope_recipients(), recipients.as_slice());
        let raw = text(&msg);
        assert!(raw.contains("From: postmaster\r\n"), "got: {raw}");
        assert!(raw.contains("To: ops,Team <team@example.com>\r\n"), "got: {raw}");
    }

    #[test]
    fn headers_precede_the_multipart_body() {
        let msg = assemble(
            "from@example.com",
            &["to@example.com".to_string()],
            content(TemplateKind::Plain, "hello", None),
        )
        .unwrap();
        let raw = text(&msg);
        let mime_at = raw.find("MIME-Version").unwrap();
        let related_at = raw.find("Content-Type: multipart/related").unwrap();
        let body_at = raw.find("hello").unwrap();
        assert!(mime_at < related_at && related_at < body_at, "got: {raw}");
    }
}
