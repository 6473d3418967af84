//! Per-domain configuration document.
//!
//! The document is a JSON object keyed by sender mail domain. The empty key
//! holds the default profile used when the sender's domain has no entry:
//!
//! ```json
//! {
//!     "": { "template_type": "plain", "template": "${text}" },
//!     "html.example.com": {
//!         "template_type": "html",
//!         "template_file": "templates/notice.html",
//!         "signature_image": "images/signature.png"
//!     }
//! }
//! ```
//!
//! File fields are absolute or relative to the directory holding the document.
//! The bundled document has no directory, so it must not name relative files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{MailerError, Result};

/// Document shipped with the crate, used when no path is given.
const BUNDLED_CONFIG: &str = include_str!("../resources/config.json");

/// Template and signature settings bound to one sender domain.
///
/// Empty strings are treated the same as missing fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DomainProfile {
    /// `"plain"` or `"html"`.
    pub template_type: Option<String>,
    /// Inline template text.
    pub template: Option<String>,
    /// Path to a file holding the template text.
    pub template_file: Option<String>,
    /// Path to the signature image.
    pub signature_image: Option<String>,
}

impl DomainProfile {
    pub fn template_type(&self) -> Option<&str> {
        non_empty(&self.template_type)
    }

    pub fn template(&self) -> Option<&str> {
        non_empty(&self.template)
    }

    pub fn template_file(&self) -> Option<&str> {
        non_empty(&self.template_file)
    }

    pub fn signature_image(&self) -> Option<&str> {
        non_empty(&self.signature_image)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Parsed configuration document plus the directory its relative paths hang off.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    profiles: HashMap<String, DomainProfile>,
    base_dir: Option<PathBuf>,
}

impl ConfigDocument {
    /// Read and parse the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MailerError::Config`] if the file is missing, unreadable, or
    /// not a JSON object of profiles.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path = std::path::absolute(path).map_err(|e| MailerError::config(path, e))?;
        let raw = std::fs::read_to_string(&path).map_err(|e| MailerError::config(&path, e))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let doc = Self::from_json(&raw, base_dir).map_err(|e| MailerError::config(&path, e))?;
        tracing::debug!(path = %path.display(), profiles = doc.profiles.len(), "loaded mailer config");
        Ok(doc)
    }

    /// The document compiled into the crate.
    ///
    /// It has no base directory: relative file fields in it read as absent,
    /// so it may only name absolute files or none at all.
    pub fn bundled() -> Result<Self> {
        let profiles: HashMap<String, DomainProfile> = serde_json::from_str(BUNDLED_CONFIG)
            .map_err(|e| MailerError::config("<bundled config.json>", e))?;
        Ok(Self {
            profiles,
            base_dir: None,
        })
    }

    /// Parse a document from a JSON string; relative paths resolve against `base_dir`.
    pub fn from_json(json: &str, base_dir: impl Into<PathBuf>) -> serde_json::Result<Self> {
        let profiles: HashMap<String, DomainProfile> = serde_json::from_str(json)?;
        Ok(Self {
            profiles,
            base_dir: Some(base_dir.into()),
        })
    }

    /// Select the profile for `sender`: its exact mail domain first, then the
    /// default (`""`) profile. `None` when neither exists.
    pub fn profile_for(&self, sender: &str) -> Option<&DomainProfile> {
        let domain = mail_domain(sender);
        let key = if self.profiles.contains_key(domain) {
            domain
        } else {
            ""
        };

        let profile = self.profiles.get(key);
        tracing::debug!(
            domain,
            matched = key,
            found = profile.is_some(),
            "selected domain profile"
        );
        profile
    }

    /// Resolve a resource path against the document's directory. `None` for a
    /// relative path in a document that has no directory.
    pub fn resolve_path(&self, file: &str) -> Option<PathBuf> {
        let path = Path::new(file);
        if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            self.base_dir.as_ref().map(|dir| dir.join(path))
        }
    }

    /// Read a text resource. Missing or unreadable files yield `None`.
    pub fn read_text(&self, file: &str) -> Option<String> {
        let bytes = self.read_bytes(file)?;
        match String::from_utf8(bytes) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(file, error = %e, "template file is not valid UTF-8, ignoring");
                None
            }
        }
    }

    /// Read a binary resource. Missing or unreadable files yield `None`.
    pub fn read_bytes(&self, file: &str) -> Option<Vec<u8>> {
        let Some(path) = self.resolve_path(file) else {
            tracing::debug!(file, "relative resource in a document without a directory");
            return None;
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "resource file not found");
            return None;
        }

        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read resource file, ignoring");
                None
            }
        }
    }
}

/// Mail domain of an address: everything after the first `@`, or `""`.
pub fn mail_domain(address: &str) -> &str {
    address.split_once('@').map_or("", |(_, domain)| domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "": { "template_type": "plain", "template": "default ${text}" },
        "html.example.com": {
            "template_type": "html",
            "template_file": "notice.html",
            "signature_image": "/abs/signature.png",
            "owner": "ops-team"
        }
    }"#;

    fn sample() -> ConfigDocument {
        ConfigDocument::from_json(SAMPLE, "/etc/mailer").unwrap()
    }

    #[test]
    fn mail_domain_after_first_at() {
        assert_eq!(mail_domain("from@example.com"), "example.com");
        assert_eq!(mail_domain("odd@name@example.com"), "name@example.com");
        assert_eq!(mail_domain("no-domain"), "");
        assert_eq!(mail_domain("trailing@"), "");
    }

    #[test]
    fn exact_domain_wins() {
        let doc = sample();
        let profile = doc.profile_for("from@html.example.com").unwrap();
        assert_eq!(profile.template_type(), Some("html"));
        assert_eq!(profile.template_file(), Some("notice.html"));
    }

    #[test]
    fn unknown_domain_falls_back_to_default() {
        let doc = sample();
        let profile = doc.profile_for("from@plain.example.com").unwrap();
        assert_eq!(profile.template(), Some("default ${text}"));
    }

    #[test]
    fn sender_without_domain_uses_default() {
        let doc = sample();
        let profile = doc.profile_for("postmaster").unwrap();
        assert_eq!(profile.template_type(), Some("plain"));
    }

    #[test]
    fn no_matching_profile_is_allowed() {
        let doc = ConfigDocument::from_json(r#"{"other.org": {}}"#, "/tmp").unwrap();
        assert!(doc.profile_for("from@example.com").is_none());
    }

    #[test]
    fn empty_fields_count_as_absent() {
        let doc = ConfigDocument::from_json(
            r#"{"": {"template_type": "", "template": "", "template_file": null}}"#,
            "/tmp",
        )
        .unwrap();
        let profile = doc.profile_for("a@b.c").unwrap();
        assert_eq!(profile.template_type(), None);
        assert_eq!(profile.template(), None);
        assert_eq!(profile.template_file(), None);
    }

    #[test]
    fn relative_paths_resolve_against_document_dir() {
        let doc = sample();
        assert_eq!(
            doc.resolve_path("notice.html"),
            Some(PathBuf::from("/etc/mailer/notice.html"))
        );
        assert_eq!(
            doc.resolve_path("/abs/signature.png"),
            Some(PathBuf::from("/abs/signature.png"))
        );
    }

    #[test]
    fn missing_resource_reads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = ConfigDocument::from_json("{}", tmp.path()).unwrap();
        assert!(doc.read_text("nope.txt").is_none());
        assert!(doc.read_bytes("nope.png").is_none());
    }

    #[test]
    fn reads_resources_relative_to_loaded_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.json"),
            r#"{"": {"template_file": "body.txt"}}"#,
        )
        .unwrap();
        std::fs::write(tmp.path().join("body.txt"), "Body: ${text}\n").unwrap();

        let doc = ConfigDocument::load(tmp.path().join("config.json")).unwrap();
        let file = doc.profile_for("x@y.z").unwrap().template_file().unwrap();
        assert_eq!(doc.read_text(file).as_deref(), Some("Body: ${text}\n"));
    }

    #[test]
    fn load_missing_document_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ConfigDocument::load(tmp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, MailerError::Config { .. }), "got: {err:?}");
    }

    #[test]
    fn load_malformed_document_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        let err = ConfigDocument::load(&path).unwrap_err();
        assert!(err.to_string().contains("config.json"), "got: {err}");
    }

    #[test]
    fn bundled_document_defaults_to_plain_text() {
        let doc = ConfigDocument::bundled().unwrap();
        let profile = doc.profile_for("from@anywhere.org").unwrap();
        assert_eq!(profile.template_type(), Some("plain"));
        assert_eq!(profile.template(), Some("${text}"));
    }

    #[test]
    fn bundled_document_has_no_directory() {
        let doc = ConfigDocument::bundled().unwrap();
        assert_eq!(doc.resolve_path("config.json"), None);
        assert!(doc.read_text("config.json").is_none());

        let profile = doc.profile_for("").unwrap();
        assert_eq!(profile.template_file(), None);
        assert_eq!(profile.signature_image(), None);
    }

    #[test]
    fn bundled_document_still_reads_absolute_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("body.txt");
        std::fs::write(&path, "abs ${text}").unwrap();

        let doc = ConfigDocument::bundled().unwrap();
        assert_eq!(doc.read_text(path.to_str().unwrap()).as_deref(), Some("abs ${text}"));
    }
}
