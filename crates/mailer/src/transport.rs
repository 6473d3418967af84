//! Mail transport capability.
//!
//! The mailer never talks SMTP itself. It hands a finished message to a
//! caller-managed transport that exposes a single `sendmail` operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lettre::address::Envelope;
use lettre::Address;

/// A connected transport able to deliver a raw message.
pub trait MailTransport {
    /// Error returned by the transport; handed to the caller unchanged.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Deliver `raw_message` from `envelope_sender` to every `envelope_recipients` entry.
    fn sendmail(
        &self,
        envelope_sender: &str,
        envelope_recipients: &[String],
        raw_message: &[u8],
    ) -> Result<(), Self::Error>;

    /// Whether the transport has been shut down by its owner.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<T: MailTransport + ?Sized> MailTransport for &T {
    type Error = T::Error;

    fn sendmail(&self, from: &str, to: &[String], raw: &[u8]) -> Result<(), Self::Error> {
        (**self).sendmail(from, to, raw)
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

impl<T: MailTransport + ?Sized> MailTransport for Box<T> {
    type Error = T::Error;

    fn sendmail(&self, from: &str, to: &[String], raw: &[u8]) -> Result<(), Self::Error> {
        (**self).sendmail(from, to, raw)
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

impl<T: MailTransport + ?Sized> MailTransport for Arc<T> {
    type Error = T::Error;

    fn sendmail(&self, from: &str, to: &[String], raw: &[u8]) -> Result<(), Self::Error> {
        (**self).sendmail(from, to, raw)
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Errors from [`LettreTransport`].
#[derive(Debug, thiserror::Error)]
pub enum LettreTransportError<E: std::error::Error + 'static> {
    #[error("invalid envelope: {0}")]
    Envelope(String),

    #[error(transparent)]
    Delivery(E),
}

/// Adapts any synchronous [`lettre::Transport`] (SMTP relay, stub, file) to
/// [`MailTransport`].
///
/// The owner can [`close`](Self::close) the adapter; the mailer then refuses
/// to send through it.
#[derive(Debug)]
pub struct LettreTransport<T> {
    inner: T,
    closed: AtomicBool,
}

impl<T> LettreTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            closed: AtomicBool::new(false),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T> MailTransport for LettreTransport<T>
where
    T: lettre::Transport,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    type Error = LettreTransportError<T::Error>;

    fn sendmail(&self, from: &str, to: &[String], raw: &[u8]) -> Result<(), Self::Error> {
        let envelope = build_envelope(from, to).map_err(LettreTransportError::Envelope)?;
        self.inner
            .send_raw(&envelope, raw)
            .map(|_| ())
            .map_err(LettreTransportError::Delivery)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn build_envelope(from: &str, to: &[String]) -> Result<Envelope, String> {
    let sender: Address = from
        .parse()
        .map_err(|e: lettre::address::AddressError| format!("sender `{from}`: {e}"))?;
    let recipients = to
        .iter()
        .map(|addr| {
            addr.parse::<Address>()
                .map_err(|e| format!("recipient `{addr}`: {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Envelope::new(Some(sender), recipients).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use lettre::transport::stub::StubTransport;

    use super::*;

    #[test]
    fn forwards_envelope_and_raw_message() {
        let transport = LettreTransport::new(StubTransport::new_ok());
        transport
            .sendmail(
                "from@example.com",
                &["a@x.com".to_string(), "b@x.com".to_string()],
                b"Subject: hi\r\n\r\nbody",
            )
            .unwrap();

        let sent = transport.inner().messages();
        assert_eq!(sent.len(), 1);
        let (envelope, message) = &sent[0];
        assert_eq!(envelope.from().unwrap().to_string(), "from@example.com");
        let to: Vec<String> = envelope.to().iter().map(|a| a.to_string()).collect();
        assert_eq!(to, vec!["a@x.com", "b@x.com"]);
        assert!(message.contains("Subject: hi"));
    }

    #[test]
    fn invalid_recipient_is_an_envelope_error() {
        let transport = LettreTransport::new(StubTransport::new_ok());
        let err = transport
            .sendmail("from@example.com", &["not-an-address".to_string()], b"x")
            .unwrap_err();
        assert!(matches!(err, LettreTransportError::Envelope(_)), "got: {err:?}");
        assert!(transport.inner().messages().is_empty());
    }

    #[test]
    fn delivery_failure_is_passed_through() {
        let transport = LettreTransport::new(StubTransport::new_error());
        let err = transport
            .sendmail("from@example.com", &["a@x.com".to_string()], b"x")
            .unwrap_err();
        assert!(matches!(err, LettreTransportError::Delivery(_)), "got: {err:?}");
    }

    #[test]
    fn close_marks_transport_closed() {
        let transport = LettreTransport::new(StubTransport::new_ok());
        assert!(!transport.is_closed());
        transport.close();
        assert!(transport.is_closed());

        let shared = Arc::new(transport);
        assert!(shared.is_closed());
    }
}
