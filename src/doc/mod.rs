//! Document model: a keyed node arena mirroring the editing surface's tree.
//!
//! A [`Document`] is a tree rooted at [`NodeKey::ROOT`]. Element nodes
//! (paragraphs, headings, lists, tables, ...) hold ordered children; leaf
//! nodes are text runs and line breaks. Keys are allocated from a per-document
//! counter and are never reused, so state machines can hold a key across
//! updates and detect when the node disappears.
//!
//! [`Shape`] is the key-free projection of a subtree. Converters produce and
//! consume shapes, and structural equality of two documents is equality of
//! their shapes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod state;
pub mod table;

pub use state::{EditorState, Point, Selection, SelectionSnapshot};
pub use table::{TableCoords, locate_cell};
pub(crate) use state::{char_len, char_offset_to_byte};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey(pub u64);

impl NodeKey {
    pub const ROOT: NodeKey = NodeKey(0);
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inline formatting flags. Bit values follow the plain-data wire format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextFormat(u8);

impl TextFormat {
    pub const BOLD: TextFormat = TextFormat(1);
    pub const ITALIC: TextFormat = TextFormat(1 << 1);
    pub const STRIKETHROUGH: TextFormat = TextFormat(1 << 2);
    pub const CODE: TextFormat = TextFormat(1 << 4);

    const KNOWN: u8 = 1 | (1 << 1) | (1 << 2) | (1 << 4);

    pub const fn empty() -> Self {
        TextFormat(0)
    }

    /// Builds a format from wire bits, dropping flags this model does not know.
    pub const fn from_bits(bits: u8) -> Self {
        TextFormat(bits & Self::KNOWN)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: TextFormat) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: TextFormat) -> Self {
        TextFormat(self.0 | other.0)
    }

    pub const fn difference(self, other: TextFormat) -> Self {
        TextFormat(self.0 & !other.0)
    }

    pub fn insert(&mut self, other: TextFormat) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: TextFormat) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for TextFormat {
    type Output = TextFormat;

    fn bitor(self, rhs: TextFormat) -> TextFormat {
        self.union(rhs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Paragraph,
    Heading { level: u8 },
    Quote,
    Code { language: Option<String> },
    List { ordered: bool, start: u32 },
    ListItem,
    Table,
    TableRow,
    TableCell { header: bool },
    HorizontalRule,
    Text { text: String, format: TextFormat },
    LineBreak,
}

/// Type names of the baseline node set, registered with every runtime.
pub const BASELINE_NODE_TYPES: &[&str] = &[
    "root",
    "paragraph",
    "heading",
    "quote",
    "code",
    "list",
    "listitem",
    "table",
    "tablerow",
    "tablecell",
    "horizontalrule",
    "text",
    "linebreak",
];

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading { .. } => "heading",
            NodeKind::Quote => "quote",
            NodeKind::Code { .. } => "code",
            NodeKind::List { .. } => "list",
            NodeKind::ListItem => "listitem",
            NodeKind::Table => "table",
            NodeKind::TableRow => "tablerow",
            NodeKind::TableCell { .. } => "tablecell",
            NodeKind::HorizontalRule => "horizontalrule",
            NodeKind::Text { .. } => "text",
            NodeKind::LineBreak => "linebreak",
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        NodeKind::Text {
            text: text.into(),
            format: TextFormat::empty(),
        }
    }

    /// Leaves carry content and never have children.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            NodeKind::Text { .. } | NodeKind::LineBreak | NodeKind::HorizontalRule
        )
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, NodeKind::Text { .. } | NodeKind::LineBreak)
    }

    /// Blocks whose children are inline content.
    pub fn holds_inline(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph
                | NodeKind::Heading { .. }
                | NodeKind::Quote
                | NodeKind::Code { .. }
                | NodeKind::ListItem
                | NodeKind::TableCell { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub key: NodeKey,
    pub parent: Option<NodeKey>,
    pub kind: NodeKind,
    pub children: Vec<NodeKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("node {0} not found")]
    NodeNotFound(NodeKey),
    #[error("node {0} is not a text node")]
    NotText(NodeKey),
    #[error("node {0} cannot hold children")]
    NotElement(NodeKey),
    #[error("offset {offset} out of range for node {key}")]
    InvalidOffset { key: NodeKey, offset: usize },
    #[error("no selection")]
    NoSelection,
    #[error("selection shape not supported by this operation")]
    UnsupportedSelection,
    #[error("the root node cannot be removed or moved")]
    RootImmutable,
    #[error("node {0} is not inside a table")]
    NotInTable(NodeKey),
}

/// Key-free projection of a subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    pub kind: NodeKind,
    pub children: Vec<Shape>,
}

impl Shape {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: NodeKind, children: Vec<Shape>) -> Self {
        Self { kind, children }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(NodeKind::text(text))
    }

    pub fn formatted(text: impl Into<String>, format: TextFormat) -> Self {
        Self::new(NodeKind::Text {
            text: text.into(),
            format,
        })
    }

    pub fn line_break() -> Self {
        Self::new(NodeKind::LineBreak)
    }

    pub fn paragraph(children: Vec<Shape>) -> Self {
        Self::with_children(NodeKind::Paragraph, children)
    }

    pub fn heading(level: u8, children: Vec<Shape>) -> Self {
        Self::with_children(NodeKind::Heading { level }, children)
    }

    pub fn quote(children: Vec<Shape>) -> Self {
        Self::with_children(NodeKind::Quote, children)
    }

    pub fn code(language: Option<&str>, text: &str) -> Self {
        let children = if text.is_empty() {
            Vec::new()
        } else {
            vec![Shape::text(text)]
        };
        Self::with_children(
            NodeKind::Code {
                language: language.and_then(code_language),
            },
            children,
        )
    }

    pub fn list(ordered: bool, items: Vec<Shape>) -> Self {
        Self::with_children(NodeKind::List { ordered, start: 1 }, items)
    }

    pub fn list_item(children: Vec<Shape>) -> Self {
        Self::with_children(NodeKind::ListItem, children)
    }

    pub fn horizontal_rule() -> Self {
        Self::new(NodeKind::HorizontalRule)
    }

    /// Plain-text table whose first row is the header row.
    pub fn table(rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .enumerate()
            .map(|(index, cells)| {
                Shape::with_children(
                    NodeKind::TableRow,
                    cells
                        .iter()
                        .map(|cell| {
                            let children = if cell.is_empty() {
                                Vec::new()
                            } else {
                                vec![Shape::text(*cell)]
                            };
                            Shape::with_children(
                                NodeKind::TableCell { header: index == 0 },
                                children,
                            )
                        })
                        .collect(),
                )
            })
            .collect();
        Self::with_children(NodeKind::Table, rows)
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Concatenated text of all descendant text runs.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match &self.kind {
            NodeKind::Text { text, .. } => out.push_str(text),
            NodeKind::LineBreak => out.push('\n'),
            _ => {
                for child in &self.children {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Merges adjacent text runs with equal format and drops empty runs,
    /// recursively.
    pub fn normalize(&mut self) {
        for child in &mut self.children {
            child.normalize();
        }
        let children = std::mem::take(&mut self.children);
        self.children = normalize_inline(children);
    }
}

/// Canonical code-block language: no backticks or control characters, no
/// surrounding whitespace. Empty means no language.
pub fn code_language(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '`' && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Canonical form for a run of sibling shapes.
pub fn normalize_inline(children: Vec<Shape>) -> Vec<Shape> {
    let mut out: Vec<Shape> = Vec::with_capacity(children.len());
    for child in children {
        if let NodeKind::Text { text, format } = &child.kind {
            if text.is_empty() {
                continue;
            }
            if let Some(Shape {
                kind:
                    NodeKind::Text {
                        text: previous,
                        format: previous_format,
                    },
                ..
            }) = out.last_mut()
                && previous_format == format
            {
                previous.push_str(text);
                continue;
            }
        }
        out.push(child);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    nodes: BTreeMap<NodeKey, Node>,
    next_key: u64,
}

impl Document {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            NodeKey::ROOT,
            Node {
                key: NodeKey::ROOT,
                parent: None,
                kind: NodeKind::Root,
                children: Vec::new(),
            },
        );
        Self { nodes, next_key: 1 }
    }

    /// Builds a document whose root holds `blocks` in order.
    pub fn from_blocks(blocks: &[Shape]) -> Self {
        let mut doc = Self::new();
        doc.graft(blocks);
        doc
    }

    pub fn root(&self) -> &Node {
        &self.nodes[&NodeKey::ROOT]
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(&key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn kind(&self, key: NodeKey) -> Option<&NodeKind> {
        self.nodes.get(&key).map(|node| &node.kind)
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.nodes
            .get(&key)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(&key).and_then(|node| node.parent)
    }

    /// Top-level blocks in document order.
    pub fn blocks(&self) -> &[NodeKey] {
        self.children(NodeKey::ROOT)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn is_empty(&self) -> bool {
        self.root().children.is_empty()
    }

    pub fn text(&self, key: NodeKey) -> Option<&str> {
        match self.kind(key) {
            Some(NodeKind::Text { text, .. }) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn format(&self, key: NodeKey) -> Option<TextFormat> {
        match self.kind(key) {
            Some(NodeKind::Text { format, .. }) => Some(*format),
            _ => None,
        }
    }

    pub fn set_text(&mut self, key: NodeKey, value: String) -> Result<(), EditError> {
        match self.nodes.get_mut(&key).map(|node| &mut node.kind) {
            Some(NodeKind::Text { text, .. }) => {
                *text = value;
                Ok(())
            }
            Some(_) => Err(EditError::NotText(key)),
            None => Err(EditError::NodeNotFound(key)),
        }
    }

    pub fn set_format(&mut self, key: NodeKey, value: TextFormat) -> Result<(), EditError> {
        match self.nodes.get_mut(&key).map(|node| &mut node.kind) {
            Some(NodeKind::Text { format, .. }) => {
                *format = value;
                Ok(())
            }
            Some(_) => Err(EditError::NotText(key)),
            None => Err(EditError::NodeNotFound(key)),
        }
    }

    /// Replaces the kind of an element node, keeping its children.
    pub fn set_kind(&mut self, key: NodeKey, kind: NodeKind) -> Result<(), EditError> {
        if key == NodeKey::ROOT {
            return Err(EditError::RootImmutable);
        }
        let node = self
            .nodes
            .get_mut(&key)
            .ok_or(EditError::NodeNotFound(key))?;
        if node.kind.is_leaf() || kind.is_leaf() {
            return Err(EditError::NotElement(key));
        }
        node.kind = kind;
        Ok(())
    }

    /// Allocates a detached node.
    pub fn create(&mut self, kind: NodeKind) -> NodeKey {
        let key = NodeKey(self.next_key);
        self.next_key += 1;
        self.nodes.insert(
            key,
            Node {
                key,
                parent: None,
                kind,
                children: Vec::new(),
            },
        );
        key
    }

    /// Allocates a detached subtree from a shape.
    pub fn build(&mut self, shape: &Shape) -> NodeKey {
        let key = self.create(shape.kind.clone());
        for child in &shape.children {
            let child_key = self.build(child);
            // Freshly built nodes are detached, so the append cannot fail.
            let _ = self.append(key, child_key);
        }
        key
    }

    pub fn append(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), EditError> {
        let index = self.children(parent).len();
        self.insert_child(parent, index, child)
    }

    pub fn insert_child(
        &mut self,
        parent: NodeKey,
        index: usize,
        child: NodeKey,
    ) -> Result<(), EditError> {
        if child == NodeKey::ROOT {
            return Err(EditError::RootImmutable);
        }
        if !self.nodes.contains_key(&child) {
            return Err(EditError::NodeNotFound(child));
        }
        match self.nodes.get(&parent) {
            None => return Err(EditError::NodeNotFound(parent)),
            Some(node) if node.kind.is_leaf() => return Err(EditError::NotElement(parent)),
            Some(node) if index > node.children.len() => {
                return Err(EditError::InvalidOffset { key: parent, offset: index });
            }
            Some(_) => {}
        }
        self.detach(child);
        // Detaching may have shifted the target index when moving within one parent.
        let len = self.children(parent).len();
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.insert(index.min(len), child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        Ok(())
    }

    pub fn insert_after(&mut self, sibling: NodeKey, child: NodeKey) -> Result<(), EditError> {
        let parent = self
            .parent(sibling)
            .ok_or(EditError::NodeNotFound(sibling))?;
        let index = self
            .index_in_parent(sibling)
            .ok_or(EditError::NodeNotFound(sibling))?;
        self.insert_child(parent, index + 1, child)
    }

    pub fn insert_before(&mut self, sibling: NodeKey, child: NodeKey) -> Result<(), EditError> {
        let parent = self
            .parent(sibling)
            .ok_or(EditError::NodeNotFound(sibling))?;
        let index = self
            .index_in_parent(sibling)
            .ok_or(EditError::NodeNotFound(sibling))?;
        self.insert_child(parent, index, child)
    }

    /// Unlinks a node from its parent, keeping the subtree allocated.
    pub fn detach(&mut self, key: NodeKey) {
        let Some(parent) = self.parent(key) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|child| *child != key);
        }
        if let Some(node) = self.nodes.get_mut(&key) {
            node.parent = None;
        }
    }

    /// Removes a node and its whole subtree.
    pub fn remove(&mut self, key: NodeKey) -> Result<(), EditError> {
        if key == NodeKey::ROOT {
            return Err(EditError::RootImmutable);
        }
        if !self.nodes.contains_key(&key) {
            return Err(EditError::NodeNotFound(key));
        }
        self.detach(key);
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
        }
        Ok(())
    }

    /// Removes every top-level block.
    pub fn clear(&mut self) {
        let blocks = self.blocks().to_vec();
        for block in blocks {
            let _ = self.remove(block);
        }
    }

    /// Builds `blocks` and appends them to the root, returning their keys.
    pub fn graft(&mut self, blocks: &[Shape]) -> Vec<NodeKey> {
        blocks
            .iter()
            .map(|shape| {
                let key = self.build(shape);
                let _ = self.append(NodeKey::ROOT, key);
                key
            })
            .collect()
    }

    pub fn index_in_parent(&self, key: NodeKey) -> Option<usize> {
        let parent = self.parent(key)?;
        self.children(parent).iter().position(|child| *child == key)
    }

    pub fn previous_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let index = self.index_in_parent(key)?;
        index
            .checked_sub(1)
            .and_then(|prev| self.children(parent).get(prev).copied())
    }

    pub fn next_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let index = self.index_in_parent(key)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Parent chain of `key`, nearest first, excluding `key` itself.
    pub fn ancestors(&self, key: NodeKey) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(key),
        }
    }

    /// Nearest node, starting at `key` itself, whose kind satisfies `pred`.
    pub fn find_ancestor(
        &self,
        key: NodeKey,
        pred: impl Fn(&NodeKind) -> bool,
    ) -> Option<NodeKey> {
        if self.kind(key).is_some_and(&pred) {
            return Some(key);
        }
        self.ancestors(key)
            .find(|ancestor| self.kind(*ancestor).is_some_and(&pred))
    }

    /// The root child containing `key`.
    pub fn top_level_block(&self, key: NodeKey) -> Option<NodeKey> {
        if key == NodeKey::ROOT || !self.contains(key) {
            return None;
        }
        let mut current = key;
        loop {
            let parent = self.parent(current)?;
            if parent == NodeKey::ROOT {
                return Some(current);
            }
            current = parent;
        }
    }

    /// All attached nodes in document order, root first.
    pub fn preorder(&self) -> Vec<NodeKey> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![NodeKey::ROOT];
        while let Some(key) = stack.pop() {
            out.push(key);
            stack.extend(self.children(key).iter().rev());
        }
        out
    }

    /// Text runs below `key` in document order.
    pub fn text_nodes_in(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if matches!(self.kind(current), Some(NodeKind::Text { .. })) {
                out.push(current);
            }
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    pub fn text_content(&self, key: NodeKey) -> String {
        self.node_shape(key)
            .map(|shape| shape.text_content())
            .unwrap_or_default()
    }

    pub fn node_shape(&self, key: NodeKey) -> Option<Shape> {
        let node = self.nodes.get(&key)?;
        Some(Shape {
            kind: node.kind.clone(),
            children: node
                .children
                .iter()
                .filter_map(|child| self.node_shape(*child))
                .collect(),
        })
    }

    /// Key-free projection of the whole tree.
    pub fn shape(&self) -> Shape {
        self.node_shape(NodeKey::ROOT)
            .unwrap_or_else(|| Shape::new(NodeKind::Root))
    }

    pub fn block_shapes(&self) -> Vec<Shape> {
        self.shape().children
    }

    pub fn structurally_eq(&self, other: &Document) -> bool {
        self.shape() == other.shape()
    }

    /// Type names of every node in the arena.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.nodes.values().map(|node| node.kind.type_name())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeKey>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<NodeKey> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::from_blocks(&[
            Shape::heading(1, vec![Shape::text("Title")]),
            Shape::paragraph(vec![
                Shape::text("plain "),
                Shape::formatted("bold", TextFormat::BOLD),
            ]),
            Shape::table(&[&["a", "b"], &["1", "2"]]),
        ])
    }

    #[test]
    fn test_keys_are_unique_and_monotonic() {
        let mut doc = Document::new();
        let a = doc.create(NodeKind::Paragraph);
        let b = doc.create(NodeKind::Paragraph);
        assert_ne!(a, b);
        assert!(b > a);
        doc.remove(a).unwrap();
        let c = doc.create(NodeKind::Paragraph);
        assert!(c > b, "keys must never be reused");
    }

    #[test]
    fn test_shape_round_trip_through_arena() {
        let doc = sample();
        let rebuilt = Document::from_blocks(&doc.block_shapes());
        assert!(doc.structurally_eq(&rebuilt));
        assert_ne!(doc.node_count(), 1);
    }

    #[test]
    fn test_top_level_block_and_ancestors() {
        let doc = sample();
        let table = doc.blocks()[2];
        let texts = doc.text_nodes_in(table);
        let cell_text = texts[3];
        assert_eq!(doc.text(cell_text), Some("2"));
        assert_eq!(doc.top_level_block(cell_text), Some(table));
        let cell = doc
            .find_ancestor(cell_text, |kind| matches!(kind, NodeKind::TableCell { .. }))
            .unwrap();
        assert_eq!(doc.kind(cell), Some(&NodeKind::TableCell { header: false }));
        assert_eq!(doc.ancestors(cell_text).last(), Some(NodeKey::ROOT));
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut doc = sample();
        let before = doc.node_count();
        let table = doc.blocks()[2];
        doc.remove(table).unwrap();
        assert_eq!(doc.blocks().len(), 2);
        assert_eq!(doc.node_count(), before - 11);
        assert_eq!(doc.remove(NodeKey::ROOT), Err(EditError::RootImmutable));
    }

    #[test]
    fn test_insert_child_moves_within_parent() {
        let mut doc = sample();
        let first = doc.blocks()[0];
        doc.insert_child(NodeKey::ROOT, 3, first).unwrap();
        assert_eq!(doc.blocks().len(), 3);
        assert_eq!(doc.blocks()[2], first);
    }

    #[test]
    fn test_normalize_merges_and_drops() {
        let mut shape = Shape::paragraph(vec![
            Shape::text("a"),
            Shape::text(""),
            Shape::text("b"),
            Shape::formatted("c", TextFormat::BOLD),
            Shape::formatted("d", TextFormat::BOLD),
            Shape::line_break(),
            Shape::text("e"),
        ]);
        shape.normalize();
        assert_eq!(
            shape.children,
            vec![
                Shape::text("ab"),
                Shape::formatted("cd", TextFormat::BOLD),
                Shape::line_break(),
                Shape::text("e"),
            ]
        );
    }

    #[test]
    fn test_code_language_is_canonical() {
        assert_eq!(code_language(" rust "), Some("rust".to_string()));
        assert_eq!(code_language("a b"), Some("a b".to_string()));
        assert_eq!(code_language("a`b\n"), Some("ab".to_string()));
        assert_eq!(code_language("``"), None);
        assert_eq!(
            Shape::code(Some("`"), "x"),
            Shape::code(None, "x")
        );
    }

    #[test]
    fn test_format_bits_ignore_unknown_flags() {
        let format = TextFormat::from_bits(0b1111_1111);
        assert!(format.contains(TextFormat::BOLD | TextFormat::CODE));
        assert_eq!(format.bits(), 0b0001_0111);
    }
}
