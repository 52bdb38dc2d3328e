//! Converters between the document model and its external representations.
//!
//! Conversion always goes document ↔ format, never format ↔ format. Import
//! produces detached block [`Shape`]s so a failed parse never touches the
//! live document.

use serde::{Deserialize, Serialize};

use crate::doc::{Document, Shape};

pub mod data;
pub mod html;
pub mod markdown;

pub use data::DataConverter;
pub use html::HtmlConverter;
pub use markdown::MarkdownConverter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// Structured markup (markdown-like text).
    Markdown,
    /// Tagged markup (HTML-like text).
    Html,
    /// Plain structured data mirroring the node tree.
    Data,
}

impl ContentFormat {
    pub const ALL: [ContentFormat; 3] = [
        ContentFormat::Markdown,
        ContentFormat::Html,
        ContentFormat::Data,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ContentFormat::Markdown => "markdown",
            ContentFormat::Html => "html",
            ContentFormat::Data => "data",
        }
    }
}

impl std::fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A value exchanged with the embedding application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalValue {
    Text(String),
    Data(serde_json::Value),
}

impl ExternalValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ExternalValue::Text(text) => Some(text),
            ExternalValue::Data(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            ExternalValue::Data(value) => Some(value),
            ExternalValue::Text(_) => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ExternalValue::Text(_) => "text",
            ExternalValue::Data(_) => "data",
        }
    }
}

impl From<String> for ExternalValue {
    fn from(value: String) -> Self {
        ExternalValue::Text(value)
    }
}

impl From<&str> for ExternalValue {
    fn from(value: &str) -> Self {
        ExternalValue::Text(value.to_string())
    }
}

impl From<serde_json::Value> for ExternalValue {
    fn from(value: serde_json::Value) -> Self {
        ExternalValue::Data(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed html at byte {offset}: {message}")]
    Html { offset: usize, message: String },
    #[error("malformed data tree: {0}")]
    Data(String),
    #[error("{format} import expects a {expected} value, got {found}")]
    WrongValue {
        format: ContentFormat,
        expected: &'static str,
        found: &'static str,
    },
}

pub trait Converter {
    fn format(&self) -> ContentFormat;

    fn export(&self, doc: &Document) -> ExternalValue;

    /// Parses `value` into top-level block shapes.
    fn import(&self, value: &ExternalValue) -> Result<Vec<Shape>, ParseError>;
}

/// Text payload of `value`, or a `WrongValue` error naming `format`.
pub(crate) fn expect_text(format: ContentFormat, value: &ExternalValue) -> Result<&str, ParseError> {
    value.as_text().ok_or(ParseError::WrongValue {
        format,
        expected: "text",
        found: value.kind_name(),
    })
}

pub fn converter_for(format: ContentFormat) -> Box<dyn Converter> {
    match format {
        ContentFormat::Markdown => Box::new(MarkdownConverter),
        ContentFormat::Html => Box::new(HtmlConverter),
        ContentFormat::Data => Box::new(DataConverter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_value_kind_is_rejected() {
        let err = converter_for(ContentFormat::Markdown)
            .import(&ExternalValue::Data(serde_json::json!({})))
            .unwrap_err();
        assert_eq!(
            err,
            ParseError::WrongValue {
                format: ContentFormat::Markdown,
                expected: "text",
                found: "data",
            }
        );
    }

    #[test]
    fn test_format_names_round_trip_through_serde() {
        for format in ContentFormat::ALL {
            let json = serde_json::to_string(&format).unwrap();
            assert_eq!(json, format!("\"{}\"", format.name()));
            let back: ContentFormat = serde_json::from_str(&json).unwrap();
            assert_eq!(back, format);
        }
    }
}
