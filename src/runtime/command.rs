//! Typed command identifiers for the runtime's command bus.
//!
//! A [`Command<P>`] is a named message whose payload type is fixed at the
//! declaration site, so handlers and dispatchers agree on the payload without
//! stringly-typed casts at call sites.

use std::fmt;
use std::marker::PhantomData;

use crate::doc::{NodeKey, NodeKind, TextFormat};

pub struct Command<P> {
    name: &'static str,
    _payload: PhantomData<fn(&P)>,
}

impl<P> Command<P> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _payload: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<P> Clone for Command<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Command<P> {}

impl<P> fmt::Debug for Command<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Command").field(&self.name).finish()
    }
}

impl<P> PartialEq for Command<P> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Handlers run from the highest priority down; within a priority, in
/// registration order. The first handler returning `true` stops dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandPriority {
    Editor,
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Paragraph,
    Heading(u8),
    Quote,
    Code,
}

impl BlockType {
    pub fn to_kind(self) -> NodeKind {
        match self {
            BlockType::Paragraph => NodeKind::Paragraph,
            BlockType::Heading(level) => NodeKind::Heading {
                level: level.clamp(1, 6),
            },
            BlockType::Quote => NodeKind::Quote,
            BlockType::Code => NodeKind::Code { language: None },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSize {
    pub rows: usize,
    pub columns: usize,
}

impl Default for TableSize {
    fn default() -> Self {
        Self {
            rows: 3,
            columns: 3,
        }
    }
}

/// Row or column insertion relative to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLine {
    pub cell: NodeKey,
    pub after: bool,
}

pub const SELECTION_CHANGE: Command<()> = Command::new("selection-change");
pub const FOCUS: Command<()> = Command::new("focus");
pub const BLUR: Command<()> = Command::new("blur");

pub const INSERT_TEXT: Command<String> = Command::new("insert-text");
pub const DELETE_CHARACTER: Command<()> = Command::new("delete-character");
pub const INSERT_PARAGRAPH: Command<()> = Command::new("insert-paragraph");
pub const INSERT_LINE_BREAK: Command<()> = Command::new("insert-line-break");
pub const FORMAT_TEXT: Command<TextFormat> = Command::new("format-text");
pub const SET_BLOCK_TYPE: Command<BlockType> = Command::new("set-block-type");
pub const INSERT_HORIZONTAL_RULE: Command<()> = Command::new("insert-horizontal-rule");

pub const UNDO: Command<()> = Command::new("undo");
pub const REDO: Command<()> = Command::new("redo");

/// Payload: `true` for a numbered list.
pub const INSERT_LIST: Command<bool> = Command::new("insert-list");
pub const REMOVE_LIST: Command<()> = Command::new("remove-list");

pub const INSERT_TABLE: Command<TableSize> = Command::new("insert-table");
pub const INSERT_TABLE_ROW: Command<TableLine> = Command::new("insert-table-row");
pub const INSERT_TABLE_COLUMN: Command<TableLine> = Command::new("insert-table-column");
pub const DELETE_TABLE_ROW: Command<NodeKey> = Command::new("delete-table-row");
pub const DELETE_TABLE_COLUMN: Command<NodeKey> = Command::new("delete-table-column");
pub const DELETE_TABLE: Command<NodeKey> = Command::new("delete-table");

pub const KEY_ARROW_UP: Command<()> = Command::new("key-arrow-up");
pub const KEY_ARROW_DOWN: Command<()> = Command::new("key-arrow-down");
pub const KEY_ENTER: Command<()> = Command::new("key-enter");
pub const KEY_ESCAPE: Command<()> = Command::new("key-escape");
