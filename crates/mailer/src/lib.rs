//! Templated notification emails, configured per sender domain.
//!
//! This crate provides:
//! - `Mailer`, which resolves a template and optional signature image for its
//!   sender's mail domain and sends rendered messages
//! - `MailTransport`, the capability a caller-managed transport implements,
//!   with an adapter for any synchronous `lettre` transport
//! - the JSON configuration document that maps domains to profiles
//!
//! ```no_run
//! use std::collections::HashMap;
//!
//! use lettre::SmtpTransport;
//! use notify_mailer::{Delivery, LettreTransport, Mailer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let smtp = LettreTransport::new(SmtpTransport::relay("smtp.example.com")?.build());
//! let mailer = Mailer::builder()
//!     .transport(smtp)
//!     .sender("alerts@example.com")
//!     .config_path("/etc/mailer/config.json")
//!     .build()?;
//!
//! let vars = HashMap::from([("text", "Disk usage above 90%")]);
//! mailer.send(["ops@example.com", "oncall@example.com"], "Disk alert", Delivery::Split, &vars)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod mailer;
pub mod message;
pub mod resolve;
pub mod template;
pub mod transport;

pub use config::{ConfigDocument, DomainProfile};
pub use error::{MailerError, Result};
pub use mailer::{Delivery, Mailer, MailerBuilder, Recipients};
pub use message::OutboundMessage;
pub use template::{BodyTemplate, TemplateKind};
pub use transport::{LettreTransport, LettreTransportError, MailTransport};
