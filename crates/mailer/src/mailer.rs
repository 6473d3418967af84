//! The notification composer.
//!
//! A [`Mailer`] is built once per sender. Construction resolves the template
//! kind, template text and signature image from the per-domain configuration;
//! after that the mailer is immutable and [`Mailer::send`] only renders the
//! body and hands messages to the transport.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::ConfigDocument;
use crate::error::{MailerError, Result};
use crate::message::{self, Content, OutboundMessage};
use crate::resolve::{self, Overrides, ResolvedProfile};
use crate::template::TemplateKind;
use crate::transport::MailTransport;

/// One or more recipient addresses, in the order given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients(Vec<String>);

impl Recipients {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Recipients {
    fn from(addr: &str) -> Self {
        Self(vec![addr.to_string()])
    }
}

impl From<String> for Recipients {
    fn from(addr: String) -> Self {
        Self(vec![addr])
    }
}

impl From<Vec<String>> for Recipients {
    fn from(addrs: Vec<String>) -> Self {
        Self(addrs)
    }
}

impl From<&[String]> for Recipients {
    fn from(addrs: &[String]) -> Self {
        Self(addrs.to_vec())
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(addrs: Vec<&str>) -> Self {
        Self(addrs.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Recipients {
    fn from(addrs: &[&str]) -> Self {
        Self(addrs.iter().map(|a| a.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Recipients {
    fn from(addrs: [&str; N]) -> Self {
        Self(addrs.iter().map(|a| a.to_string()).collect())
    }
}

/// How a multi-recipient send is split into messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delivery {
    /// One message addressed to every recipient.
    #[default]
    Combined,
    /// One independent message per recipient.
    Split,
}

/// Builder for [`Mailer`].
#[derive(Debug)]
pub struct MailerBuilder<T> {
    transport: Option<T>,
    sender: Option<String>,
    template_kind: Option<TemplateKind>,
    template: Option<String>,
    signature_image: Option<Vec<u8>>,
    config_path: Option<PathBuf>,
}

impl<T> Default for MailerBuilder<T> {
    fn default() -> Self {
        Self {
            transport: None,
            sender: None,
            template_kind: None,
            template: None,
            signature_image: None,
            config_path: None,
        }
    }
}

impl<T: MailTransport> MailerBuilder<T> {
    /// Transport used for every send. Required.
    pub fn transport(mut self, transport: T) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Envelope and `From` address. Required; its domain selects the profile.
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn template_kind(mut self, kind: TemplateKind) -> Self {
        self.template_kind = Some(kind);
        self
    }

    /// Template text overriding whatever the profile provides.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Raw signature image. Only allowed together with
    /// [`template_kind`](Self::template_kind)`(TemplateKind::Html)`.
    pub fn signature_image(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.signature_image = Some(bytes.into());
        self
    }

    /// Configuration document to read instead of the bundled one.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Validate the inputs, load the configuration and resolve the profile.
    ///
    /// # Errors
    ///
    /// - [`MailerError::Argument`] if the transport or sender is missing, or a
    ///   signature image is given without an explicit HTML template kind.
    ///   These checks run before any file is read.
    /// - [`MailerError::Config`] if the configuration document cannot be
    ///   loaded.
    /// - [`MailerError::InvalidConfig`] / [`MailerError::Template`] if the
    ///   resolved profile is unusable.
    pub fn build(self) -> Result<Mailer<T>> {
        let (transport, sender) = match (self.transport, self.sender) {
            (Some(transport), Some(sender)) if !sender.is_empty() => (transport, sender),
            _ => {
                return Err(MailerError::argument(
                    "transport and sender must not be empty",
                ))
            }
        };

        let has_signature = self.signature_image.as_ref().is_some_and(|b| !b.is_empty());
        if has_signature && self.template_kind != Some(TemplateKind::Html) {
            return Err(MailerError::argument(
                "signature image is applicable only if template kind is html",
            ));
        }

        let doc = match &self.config_path {
            Some(path) => ConfigDocument::load(path)?,
            None => ConfigDocument::bundled()?,
        };

        let overrides = Overrides {
            template_kind: self.template_kind,
            template: self.template,
            signature_image: self.signature_image,
        };
        let profile = resolve::resolve(&doc, &sender, overrides)?;

        Ok(Mailer {
            transport: Some(transport),
            sender,
            profile,
        })
    }
}

/// Renders notification templates and hands the messages to a transport.
#[derive(Debug)]
pub struct Mailer<T> {
    transport: Option<T>,
    sender: String,
    profile: ResolvedProfile,
}

impl<T: MailTransport> Mailer<T> {
    pub fn builder() -> MailerBuilder<T> {
        MailerBuilder::default()
    }

    /// Mailer with the bundled configuration and no overrides.
    pub fn new(transport: T, sender: impl Into<String>) -> Result<Self> {
        Self::builder().transport(transport).sender(sender).build()
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn template_kind(&self) -> TemplateKind {
        self.profile.kind
    }

    /// Resolved template text, including any signature markup.
    pub fn template_text(&self) -> &str {
        self.profile.template.source()
    }

    pub fn has_signature(&self) -> bool {
        self.profile.signature.is_some()
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Take the transport back. Every later send fails with
    /// [`MailerError::State`].
    pub fn release(&mut self) -> Option<T> {
        self.transport.take()
    }

    /// Render the body alone with `substitutions`.
    pub fn render_body<S>(&self, substitutions: &S) -> Result<String>
    where
        S: Serialize + ?Sized,
    {
        self.profile.template.render(substitutions)
    }

    /// Render the body and build the messages a send would deliver, without
    /// delivering them.
    ///
    /// # Errors
    ///
    /// [`MailerError::Argument`] on empty recipients or subject, or a
    /// placeholder with no value. Addresses are not parsed here.
    pub fn compose<S>(
        &self,
        recipients: impl Into<Recipients>,
        subject: &str,
        delivery: Delivery,
        substitutions: &S,
    ) -> Result<Vec<OutboundMessage>>
    where
        S: Serialize + ?Sized,
    {
        let recipients = recipients.into();
        let body = self.render(&recipients, subject, substitutions)?;
        let content = self.content(subject, &body);

        batches(recipients.as_slice(), delivery)
            .map(|batch| message::assemble(&self.sender, batch, content))
            .collect()
    }

    /// Render the template and deliver it.
    ///
    /// With [`Delivery::Combined`] the transport is called once with every
    /// recipient; with [`Delivery::Split`] it is called once per recipient, in
    /// order, and the first failure aborts the remaining sends.
    ///
    /// # Errors
    ///
    /// - [`MailerError::State`] if the transport was released or is closed.
    /// - [`MailerError::Argument`] as for [`compose`](Self::compose).
    /// - [`MailerError::Transport`] carrying the transport's own error.
    pub fn send<S>(
        &self,
        recipients: impl Into<Recipients>,
        subject: &str,
        delivery: Delivery,
        substitutions: &S,
    ) -> Result<()>
    where
        S: Serialize + ?Sized,
    {
        let transport = self.live_transport()?;
        let recipients = recipients.into();
        let body = self.render(&recipients, subject, substitutions)?;
        let content = self.content(subject, &body);

        for batch in batches(recipients.as_slice(), delivery) {
            let message = message::assemble(&self.sender, batch, content)?;

            if let Err(e) = transport.sendmail(
                message.envelope_sender(),
                message.envelope_recipients(),
                message.formatted(),
            ) {
                tracing::warn!(
                    sender = %self.sender,
                    to = message.to_header(),
                    error = %e,
                    "transport rejected notification"
                );
                return Err(MailerError::Transport(Box::new(e)));
            }

            tracing::info!(
                sender = %self.sender,
                to = message.to_header(),
                subject,
                split = delivery == Delivery::Split,
                "notification handed to transport"
            );
        }

        Ok(())
    }

    fn live_transport(&self) -> Result<&T> {
        match &self.transport {
            None => Err(MailerError::State(
                "cannot send email, mailer is already closed".to_string(),
            )),
            Some(transport) if transport.is_closed() => Err(MailerError::State(
                "cannot send email, transport is closed".to_string(),
            )),
            Some(transport) => Ok(transport),
        }
    }

    fn render<S>(&self, recipients: &Recipients, subject: &str, substitutions: &S) -> Result<String>
    where
        S: Serialize + ?Sized,
    {
        if recipients.is_empty() || recipients.as_slice().iter().any(|r| r.is_empty()) {
            return Err(MailerError::argument("recipients must not be empty"));
        }
        if subject.is_empty() {
            return Err(MailerError::argument("subject must not be empty"));
        }
        self.render_body(substitutions)
    }

    fn content<'a>(&'a self, subject: &'a str, body: &'a str) -> Content<'a> {
        Content {
            subject,
            kind: self.profile.kind,
            body,
            signature: self.profile.signature.as_ref(),
        }
    }
}

fn batches(recipients: &[String], delivery: Delivery) -> impl Iterator<Item = &[String]> {
    let size = match delivery {
        Delivery::Combined => recipients.len().max(1),
        Delivery::Split => 1,
    };
    recipients.chunks(size)
}
