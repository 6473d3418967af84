//! Construction-time resolution of template kind, template text and signature.
//!
//! For each setting the first non-empty source wins: caller override, then the
//! selected domain profile, then the built-in default.

use std::path::Path;

use crate::config::{ConfigDocument, DomainProfile};
use crate::error::Result;
use crate::template::{BodyTemplate, TemplateKind, DEFAULT_TEMPLATE};

/// Content-ID of the inline signature part.
pub const SIGNATURE_CID: &str = "signature_image";

/// Markup appended to HTML templates that carry a signature image.
pub const SIGNATURE_MARKUP: &str = r#"<img src="cid:signature_image">"#;

const OCTET_STREAM: &str = "application/octet-stream";

/// Values supplied by the caller that take precedence over the profile.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub template_kind: Option<TemplateKind>,
    pub template: Option<String>,
    pub signature_image: Option<Vec<u8>>,
}

/// Signature image bytes with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureImage {
    bytes: Vec<u8>,
    content_type: String,
}

impl SignatureImage {
    /// Raw bytes; the type is sniffed from the leading magic bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let content_type = sniff_image_type(&bytes).unwrap_or(OCTET_STREAM).to_string();
        Self {
            bytes,
            content_type,
        }
    }

    /// Bytes loaded from `path`; the type comes from the extension, falling
    /// back to sniffing.
    pub fn from_file(path: &Path, bytes: Vec<u8>) -> Self {
        match mime_guess::from_path(path).first() {
            Some(mime) if mime.type_() == mime_guess::mime::IMAGE => Self {
                bytes,
                content_type: mime.essence_str().to_string(),
            },
            _ => Self::from_bytes(bytes),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

/// Fully resolved, immutable composer settings.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub kind: TemplateKind,
    pub template: BodyTemplate,
    pub signature: Option<SignatureImage>,
}

/// Resolve the settings for `sender` against `doc`.
///
/// The signature is only looked up for HTML templates; when one is found its
/// markup is appended to the template text.
///
/// # Errors
///
/// Fails if the profile names an unknown template type or the resolved
/// template text does not parse. Unreadable resource files are not errors.
pub fn resolve(doc: &ConfigDocument, sender: &str, overrides: Overrides) -> Result<ResolvedProfile> {
    let fallback = DomainProfile::default();
    let profile = doc.profile_for(sender).unwrap_or(&fallback);

    let kind = match (overrides.template_kind, profile.template_type()) {
        (Some(kind), _) => kind,
        (None, Some(raw)) => raw.parse()?,
        (None, None) => TemplateKind::default(),
    };

    let mut text = resolve_template_text(doc, profile, overrides.template);

    let signature = match kind {
        TemplateKind::Html => resolve_signature(doc, profile, overrides.signature_image),
        TemplateKind::Plain => None,
    };

    if signature.is_some() {
        text.push_str(SIGNATURE_MARKUP);
    }

    tracing::debug!(
        sender,
        kind = %kind,
        signature = signature.is_some(),
        "resolved mailer profile"
    );

    Ok(ResolvedProfile {
        kind,
        template: BodyTemplate::new(text)?,
        signature,
    })
}

fn resolve_template_text(
    doc: &ConfigDocument,
    profile: &DomainProfile,
    override_text: Option<String>,
) -> String {
    if let Some(text) = override_text.filter(|t| !t.is_empty()) {
        return text;
    }
    if let Some(text) = profile.template() {
        return text.to_string();
    }
    profile
        .template_file()
        .and_then(|file| doc.read_text(file))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string())
}

fn resolve_signature(
    doc: &ConfigDocument,
    profile: &DomainProfile,
    override_bytes: Option<Vec<u8>>,
) -> Option<SignatureImage> {
    if let Some(bytes) = override_bytes.filter(|b| !b.is_empty()) {
        return Some(SignatureImage::from_bytes(bytes));
    }

    let file = profile.signature_image()?;
    let bytes = doc.read_bytes(file).filter(|b| !b.is_empty())?;
    Some(SignatureImage::from_file(Path::new(file), bytes))
}
