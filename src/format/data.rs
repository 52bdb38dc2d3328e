//! Plain structured data: a JSON tree mirroring the node tree.
//!
//! ```json
//! { "root": { "type": "root", "version": 1, "children": [
//!     { "type": "heading", "version": 1, "tag": "h1", "children": [
//!         { "type": "text", "version": 1, "text": "Title", "format": 1 } ] } ] } }
//! ```
//!
//! Attributes this model does not know are ignored on import so newer
//! producers stay readable; unknown node types are rejected.

use serde::{Deserialize, Serialize};

use super::{ContentFormat, Converter, ExternalValue, ParseError};
use crate::doc::{Document, NodeKind, Shape, TextFormat, code_language};

pub const DATA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default)]
pub struct DataConverter;

impl Converter for DataConverter {
    fn format(&self) -> ContentFormat {
        ContentFormat::Data
    }

    fn export(&self, doc: &Document) -> ExternalValue {
        let tree = DataTree {
            root: DataNode::Root {
                version: DATA_VERSION,
                children: doc.block_shapes().iter().map(to_data).collect(),
            },
        };
        // A tree of plain structs and strings always serializes.
        ExternalValue::Data(serde_json::to_value(tree).unwrap_or(serde_json::Value::Null))
    }

    fn import(&self, value: &ExternalValue) -> Result<Vec<Shape>, ParseError> {
        let tree: DataTree = match value {
            ExternalValue::Data(value) => DataTree::deserialize(value),
            ExternalValue::Text(text) => serde_json::from_str(text),
        }
        .map_err(|err| ParseError::Data(err.to_string()))?;
        match tree.root {
            DataNode::Root { children, .. } => children.into_iter().map(from_data).collect(),
            other => Err(ParseError::Data(format!(
                "top-level node must be `root`, found `{}`",
                other.type_name()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DataTree {
    root: DataNode,
}

fn default_version() -> u32 {
    DATA_VERSION
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ListType {
    Bullet,
    Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum DataNode {
    Root {
        #[serde(default = "default_version")]
        version: u32,
        #[serde(default)]
        children: Vec<DataNode>,
    },
    Paragraph {
        #[serde(default = "default_version")]
        version: u32,
        #[serde(default)]
        children: Vec<DataNode>,
    },
    Heading {
        #[serde(default = "default_version")]
        version: u32,
        tag: String,
        #[serde(default)]
        children: Vec<DataNode>,
    },
    Quote {
        #[serde(default = "default_version")]
        version: u32,
        #[serde(default)]
        children: Vec<DataNode>,
    },
    Code {
        #[serde(default = "default_version")]
        version: u32,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        children: Vec<DataNode>,
    },
    List {
        #[serde(default = "default_version")]
        version: u32,
        #[serde(rename = "listType")]
        list_type: ListType,
        #[serde(default = "default_start")]
        start: u32,
        #[serde(default)]
        children: Vec<DataNode>,
    },
    ListItem {
        #[serde(default = "default_version")]
        version: u32,
        #[serde(default)]
        children: Vec<DataNode>,
    },
    Table {
        #[serde(default = "default_version")]
        version: u32,
        #[serde(default)]
        children: Vec<DataNode>,
    },
    TableRow {
        #[serde(default = "default_version")]
        version: u32,
        #[serde(default)]
        children: Vec<DataNode>,
    },
    TableCell {
        #[serde(default = "default_version")]
        version: u32,
        #[serde(rename = "headerState", default)]
        header_state: u8,
        #[serde(default)]
        children: Vec<DataNode>,
    },
    HorizontalRule {
        #[serde(default = "default_version")]
        version: u32,
    },
    Text {
        #[serde(default = "default_version")]
        version: u32,
        text: String,
        #[serde(default)]
        format: u8,
    },
    LineBreak {
        #[serde(default = "default_version")]
        version: u32,
    },
}

fn default_start() -> u32 {
    1
}

impl DataNode {
    fn type_name(&self) -> &'static str {
        match self {
            DataNode::Root { .. } => "root",
            DataNode::Paragraph { .. } => "paragraph",
            DataNode::Heading { .. } => "heading",
            DataNode::Quote { .. } => "quote",
            DataNode::Code { .. } => "code",
            DataNode::List { .. } => "list",
            DataNode::ListItem { .. } => "listitem",
            DataNode::Table { .. } => "table",
            DataNode::TableRow { .. } => "tablerow",
            DataNode::TableCell { .. } => "tablecell",
            DataNode::HorizontalRule { .. } => "horizontalrule",
            DataNode::Text { .. } => "text",
            DataNode::LineBreak { .. } => "linebreak",
        }
    }
}

fn to_data(shape: &Shape) -> DataNode {
    let version = DATA_VERSION;
    let children = || -> Vec<DataNode> { shape.children.iter().map(to_data).collect() };
    match &shape.kind {
        NodeKind::Root => DataNode::Root {
            version,
            children: children(),
        },
        NodeKind::Paragraph => DataNode::Paragraph {
            version,
            children: children(),
        },
        NodeKind::Heading { level } => DataNode::Heading {
            version,
            tag: format!("h{}", (*level).clamp(1, 6)),
            children: children(),
        },
        NodeKind::Quote => DataNode::Quote {
            version,
            children: children(),
        },
        NodeKind::Code { language } => DataNode::Code {
            version,
            language: language.clone(),
            children: children(),
        },
        NodeKind::List { ordered, start } => DataNode::List {
            version,
            list_type: if *ordered {
                ListType::Number
            } else {
                ListType::Bullet
            },
            start: *start,
            children: children(),
        },
        NodeKind::ListItem => DataNode::ListItem {
            version,
            children: children(),
        },
        NodeKind::Table => DataNode::Table {
            version,
            children: children(),
        },
        NodeKind::TableRow => DataNode::TableRow {
            version,
            children: children(),
        },
        NodeKind::TableCell { header } => DataNode::TableCell {
            version,
            header_state: u8::from(*header),
            children: children(),
        },
        NodeKind::HorizontalRule => DataNode::HorizontalRule { version },
        NodeKind::Text { text, format } => DataNode::Text {
            version,
            text: text.clone(),
            format: format.bits(),
        },
        NodeKind::LineBreak => DataNode::LineBreak { version },
    }
}

fn from_data(node: DataNode) -> Result<Shape, ParseError> {
    fn convert(children: Vec<DataNode>) -> Result<Vec<Shape>, ParseError> {
        children.into_iter().map(from_data).collect()
    }

    let shape = match node {
        DataNode::Root { .. } => {
            return Err(ParseError::Data("nested `root` node".to_string()));
        }
        DataNode::Paragraph { children, .. } => Shape::paragraph(convert(children)?),
        DataNode::Heading { tag, children, .. } => {
            let level = tag
                .strip_prefix('h')
                .and_then(|level| level.parse::<u8>().ok())
                .filter(|level| (1..=6).contains(level))
                .ok_or_else(|| ParseError::Data(format!("invalid heading tag `{tag}`")))?;
            Shape::heading(level, convert(children)?)
        }
        DataNode::Quote { children, .. } => Shape::quote(convert(children)?),
        DataNode::Code {
            language, children, ..
        } => Shape::with_children(
            NodeKind::Code {
                language: language.as_deref().and_then(code_language),
            },
            convert(children)?,
        ),
        DataNode::List {
            list_type,
            start,
            children,
            ..
        } => Shape::with_children(
            NodeKind::List {
                ordered: list_type == ListType::Number,
                start,
            },
            convert(children)?,
        ),
        DataNode::ListItem { children, .. } => Shape::list_item(convert(children)?),
        DataNode::Table { children, .. } => {
            Shape::with_children(NodeKind::Table, convert(children)?)
        }
        DataNode::TableRow { children, .. } => {
            Shape::with_children(NodeKind::TableRow, convert(children)?)
        }
        DataNode::TableCell {
            header_state,
            children,
            ..
        } => Shape::with_children(
            NodeKind::TableCell {
                header: header_state != 0,
            },
            convert(children)?,
        ),
        DataNode::HorizontalRule { .. } => Shape::horizontal_rule(),
        DataNode::Text { text, format, .. } => {
            Shape::formatted(text, TextFormat::from_bits(format))
        }
        DataNode::LineBreak { .. } => Shape::line_break(),
    };
    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn import(value: serde_json::Value) -> Result<Vec<Shape>, ParseError> {
        DataConverter.import(&ExternalValue::Data(value))
    }

    #[test]
    fn test_export_shape() {
        let doc = Document::from_blocks(&[Shape::heading(
            2,
            vec![Shape::formatted("Hi", TextFormat::BOLD)],
        )]);
        let ExternalValue::Data(value) = DataConverter.export(&doc) else {
            panic!("data export must produce a data value");
        };
        assert_eq!(
            value,
            json!({
                "root": {
                    "type": "root",
                    "version": 1,
                    "children": [{
                        "type": "heading",
                        "version": 1,
                        "tag": "h2",
                        "children": [
                            { "type": "text", "version": 1, "text": "Hi", "format": 1 }
                        ]
                    }]
                }
            })
        );
    }

    #[test]
    fn test_unknown_attributes_are_ignored() {
        let blocks = import(json!({
            "root": {
                "type": "root",
                "direction": "ltr",
                "children": [{
                    "type": "paragraph",
                    "indent": 2,
                    "textFormat": 0,
                    "children": [
                        { "type": "text", "text": "x", "format": 0, "style": "color: red", "mode": "normal" }
                    ]
                }]
            }
        }))
        .unwrap();
        assert_eq!(blocks, vec![Shape::paragraph(vec![Shape::text("x")])]);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = import(json!({
            "root": { "type": "root", "children": [{ "type": "video", "src": "x" }] }
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::Data(_)));
    }

    #[test]
    fn test_bad_heading_tag_is_rejected() {
        let err = import(json!({
            "root": { "type": "root", "children": [{ "type": "heading", "tag": "h9" }] }
        }))
        .unwrap_err();
        assert_eq!(err, ParseError::Data("invalid heading tag `h9`".to_string()));
    }

    #[test]
    fn test_code_language_is_cleaned_on_import() {
        let blocks = import(json!({
            "root": { "type": "root", "children": [{
                "type": "code",
                "language": "a`b",
                "children": [{ "type": "text", "text": "x" }]
            }] }
        }))
        .unwrap();
        assert_eq!(blocks, vec![Shape::code(Some("ab"), "x")]);
        let markdown = crate::format::markdown::serialize(&blocks);
        assert_eq!(crate::format::markdown::parse(&markdown), blocks);
    }

    #[test]
    fn test_text_payload_is_accepted() {
        let text = r#"{"root":{"type":"root","children":[{"type":"horizontalrule"}]}}"#;
        let blocks = DataConverter
            .import(&ExternalValue::Text(text.to_string()))
            .unwrap();
        assert_eq!(blocks, vec![Shape::horizontal_rule()]);
    }
}
