//! Body template rendering.
//!
//! Placeholders are `$name` or `${name}`, where a name is an ASCII letter or
//! underscore followed by letters, digits or underscores. `$$` is a literal
//! `$`. Any other `$` is a syntax error. Every placeholder must receive a
//! value, output is not escaped and a trailing newline in the template is
//! kept.
//!
//! The text is translated once into a minijinja template in which each
//! placeholder is a lookup into the substitutions map and every literal `$`
//! is emitted from an expression. Block and comment delimiters start with `$`
//! as well, so literal text can never open one.

use std::fmt;
use std::str::FromStr;

use minijinja::syntax::SyntaxConfig;
use minijinja::{context, AutoEscape, Environment, ErrorKind, UndefinedBehavior, Value};
use serde::Serialize;

use crate::error::{MailerError, Result};

/// Template used when nothing else supplies one.
pub const DEFAULT_TEMPLATE: &str = "${text}";

/// Body format of the rendered message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    #[default]
    Plain,
    Html,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = MailerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(Self::Plain),
            "html" => Ok(Self::Html),
            other => Err(MailerError::InvalidConfig(format!(
                "unsupported template_type `{other}`, expected `plain` or `html`"
            ))),
        }
    }
}

/// A syntax-checked body template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyTemplate {
    source: String,
    compiled: String,
    placeholders: Vec<String>,
}

impl BodyTemplate {
    /// Wrap template text, rejecting text that does not parse.
    ///
    /// # Errors
    ///
    /// Returns [`MailerError::Template`] for a `$` that is neither `$$` nor
    /// the start of a placeholder, such as `${name` or `${ text|upper }`.
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let (compiled, placeholders) = compile(&source)?;
        let env = Self::build_env()?;
        env.template_from_str(&compiled)
            .map_err(|e| MailerError::Template(e.to_string()))?;
        Ok(Self {
            source,
            compiled,
            placeholders,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of first use.
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Build the environment used for both validation and rendering.
    ///
    /// Templates are held as owned strings, so a fresh environment is built
    /// for each call rather than registering them.
    fn build_env() -> Result<Environment<'static>> {
        let syntax = SyntaxConfig::builder()
            .block_delimiters("$%", "%$")
            .variable_delimiters("${", "}")
            .comment_delimiters("$#", "#$")
            .build()
            .map_err(|e| MailerError::Template(e.to_string()))?;

        let mut env = Environment::new();
        env.set_syntax(syntax);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        Ok(env)
    }

    /// Substitute every placeholder from `substitutions`.
    ///
    /// # Errors
    ///
    /// Returns [`MailerError::Argument`] when a placeholder has no value, and
    /// [`MailerError::Template`] for any other rendering failure.
    pub fn render<S: Serialize + ?Sized>(&self, substitutions: &S) -> Result<String> {
        let vars = Value::from_serialize(substitutions);
        if let Some(missing) = self
            .placeholders
            .iter()
            .find(|name| vars.get_attr(name.as_str()).map_or(true, |v| v.is_undefined()))
        {
            return Err(MailerError::Argument(format!(
                "no value supplied for placeholder `{missing}`"
            )));
        }

        let env = Self::build_env()?;
        env.render_str(&self.compiled, context! { vars => vars })
            .map_err(|e| match e.kind() {
                ErrorKind::UndefinedError => {
                    MailerError::Argument(format!("no value supplied for a template placeholder: {e}"))
                }
                _ => MailerError::Template(e.to_string()),
            })
    }
}

impl Default for BodyTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
            compiled: lookup("text"),
            placeholders: vec!["text".to_string()],
        }
    }
}

const LITERAL_DOLLAR: &str = r#"${ "$" }"#;

fn lookup(name: &str) -> String {
    format!(r#"${{ vars["{name}"] }}"#)
}

/// Translate placeholder text into minijinja source.
fn compile(source: &str) -> Result<(String, Vec<String>)> {
    let mut compiled = String::with_capacity(source.len() + 16);
    let mut placeholders: Vec<String> = Vec::new();
    let mut rest = source;

    while let Some(at) = rest.find('$') {
        compiled.push_str(&rest[..at]);
        let after = &rest[at + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            compiled.push_str(LITERAL_DOLLAR);
            rest = tail;
            continue;
        }

        let (name, tail) = match after.strip_prefix('{') {
            Some(braced) => match identifier(braced) {
                Some(name) if braced[name.len()..].starts_with('}') => {
                    (name, &braced[name.len() + 1..])
                }
                _ => return Err(invalid_placeholder(source, source.len() - rest.len() + at)),
            },
            None => match identifier(after) {
                Some(name) => (name, &after[name.len()..]),
                None => return Err(invalid_placeholder(source, source.len() - rest.len() + at)),
            },
        };

        compiled.push_str(&lookup(name));
        if !placeholders.iter().any(|p| p == name) {
            placeholders.push(name.to_string());
        }
        rest = tail;
    }

    compiled.push_str(rest);
    Ok((compiled, placeholders))
}

/// The longest ASCII identifier at the start of `s`.
fn identifier(s: &str) -> Option<&str> {
    let len = s
        .bytes()
        .enumerate()
        .take_while(|&(i, b)| b == b'_' || b.is_ascii_alphabetic() || (i > 0 && b.is_ascii_digit()))
        .count();
    (len > 0).then(|| &s[..len])
}

fn invalid_placeholder(source: &str, offset: usize) -> MailerError {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let col = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    MailerError::Template(format!("invalid placeholder at line {line}, column {col}"))
}
