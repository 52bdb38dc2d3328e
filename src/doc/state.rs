//! Editor state: a document plus the model selection, and the text editing
//! primitives that mutate both together.

use super::{Document, EditError, NodeKey, NodeKind, Shape, TextFormat};

/// A caret position. On text nodes `offset` counts chars; on elements it is a
/// child index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
}

impl Point {
    pub fn new(key: NodeKey, offset: usize) -> Self {
        Self { key, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point,
            focus: point,
        }
    }

    pub fn range(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// Read-only view of the selection derived on every update tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSnapshot {
    pub collapsed: bool,
    pub anchor_block: Option<NodeKey>,
    pub text_extent: usize,
}

impl Default for SelectionSnapshot {
    fn default() -> Self {
        Self {
            collapsed: true,
            anchor_block: None,
            text_extent: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorState {
    pub document: Document,
    pub selection: Option<Selection>,
}

impl EditorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: Document) -> Self {
        Self {
            document,
            selection: None,
        }
    }

    pub fn cursor(&self) -> Option<Point> {
        self.selection
            .filter(Selection::is_collapsed)
            .map(|selection| selection.anchor)
    }

    pub fn set_cursor(&mut self, key: NodeKey, offset: usize) {
        self.selection = Some(Selection::collapsed(Point::new(key, offset)));
    }

    pub fn select_text(&mut self, key: NodeKey, start: usize, end: usize) {
        self.selection = Some(Selection::range(
            Point::new(key, start),
            Point::new(key, end),
        ));
    }

    /// Places the caret at the end of the last text run of `block`, or at the
    /// block's end when it has no text.
    pub fn select_end_of(&mut self, block: NodeKey) {
        match self.document.text_nodes_in(block).last().copied() {
            Some(text) => {
                let len = char_len(self.document.text(text).unwrap_or_default());
                self.set_cursor(text, len);
            }
            None => {
                let len = self.document.children(block).len();
                self.set_cursor(block, len);
            }
        }
    }

    /// Selection endpoints in document order.
    pub fn ordered_selection(&self) -> Option<(Point, Point)> {
        let selection = self.selection?;
        let order = self.document.preorder();
        let rank = |point: &Point| {
            (
                order
                    .iter()
                    .position(|key| *key == point.key)
                    .unwrap_or(usize::MAX),
                point.offset,
            )
        };
        if rank(&selection.anchor) <= rank(&selection.focus) {
            Some((selection.anchor, selection.focus))
        } else {
            Some((selection.focus, selection.anchor))
        }
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        let Some(selection) = self.selection else {
            return SelectionSnapshot::default();
        };
        let anchor_block = if selection.anchor.key == NodeKey::ROOT {
            self.document
                .blocks()
                .get(selection.anchor.offset)
                .copied()
        } else {
            self.document.top_level_block(selection.anchor.key)
        };
        SelectionSnapshot {
            collapsed: selection.is_collapsed(),
            anchor_block,
            text_extent: self.text_extent(),
        }
    }

    fn text_extent(&self) -> usize {
        let Some((start, end)) = self.ordered_selection() else {
            return 0;
        };
        if start == end {
            return 0;
        }
        if start.key == end.key {
            return end.offset.saturating_sub(start.offset);
        }
        let order = self.document.preorder();
        let (Some(from), Some(to)) = (
            order.iter().position(|key| *key == start.key),
            order.iter().position(|key| *key == end.key),
        ) else {
            return 0;
        };
        order[from..=to]
            .iter()
            .filter_map(|key| self.document.text(*key).map(|text| (*key, char_len(text))))
            .map(|(key, len)| {
                if key == start.key {
                    len.saturating_sub(start.offset)
                } else if key == end.key {
                    end.offset.min(len)
                } else {
                    len
                }
            })
            .sum()
    }

    /// Drops or clamps selection points that no longer resolve.
    pub fn repair_selection(&mut self) {
        let Some(selection) = self.selection else {
            return;
        };
        let clamp = |point: Point| -> Option<Point> {
            let node = self.document.get(point.key)?;
            let limit = match &node.kind {
                NodeKind::Text { text, .. } => char_len(text),
                _ => node.children.len(),
            };
            Some(Point::new(point.key, point.offset.min(limit)))
        };
        self.selection = match (clamp(selection.anchor), clamp(selection.focus)) {
            (Some(anchor), Some(focus)) => Some(Selection::range(anchor, focus)),
            _ => None,
        };
    }

    /// Inserts text at the selection, replacing selected text first.
    pub fn insert_text(&mut self, text: &str) -> Result<(), EditError> {
        let selection = self.selection.ok_or(EditError::NoSelection)?;
        if !selection.is_collapsed() {
            self.delete_selection()?;
        }
        let in_code = self.cursor().is_some_and(|point| {
            self.document
                .find_ancestor(point.key, |kind| matches!(kind, NodeKind::Code { .. }))
                .is_some()
        });
        if in_code {
            return self.insert_run(text);
        }
        for (index, segment) in text.split('\n').enumerate() {
            if index > 0 {
                self.insert_line_break()?;
            }
            if !segment.is_empty() {
                self.insert_run(segment)?;
            }
        }
        Ok(())
    }

    fn insert_run(&mut self, text: &str) -> Result<(), EditError> {
        let point = self.cursor().ok_or(EditError::NoSelection)?;
        let inserted = char_len(text);
        match self.document.kind(point.key) {
            Some(NodeKind::Text { .. }) => {
                let mut body = self.document.text(point.key).unwrap_or_default().to_string();
                let byte = char_offset_to_byte(&body, point.offset).ok_or(
                    EditError::InvalidOffset {
                        key: point.key,
                        offset: point.offset,
                    },
                )?;
                body.insert_str(byte, text);
                self.document.set_text(point.key, body)?;
                self.set_cursor(point.key, point.offset + inserted);
                Ok(())
            }
            Some(kind) if kind.holds_inline() => {
                let node = self.document.create(NodeKind::text(text));
                self.document.insert_child(point.key, point.offset, node)?;
                self.set_cursor(node, inserted);
                Ok(())
            }
            Some(_) => Err(EditError::UnsupportedSelection),
            None => Err(EditError::NodeNotFound(point.key)),
        }
    }

    pub fn insert_line_break(&mut self) -> Result<(), EditError> {
        if self.selection.is_some_and(|selection| !selection.is_collapsed()) {
            self.delete_selection()?;
        }
        let point = self.cursor().ok_or(EditError::NoSelection)?;
        match self.document.kind(point.key) {
            Some(NodeKind::Text { .. }) => {
                let tail = self.split_text(point.key, point.offset)?;
                let line_break = self.document.create(NodeKind::LineBreak);
                self.document.insert_after(point.key, line_break)?;
                self.set_cursor(tail, 0);
                Ok(())
            }
            Some(kind) if kind.holds_inline() => {
                let line_break = self.document.create(NodeKind::LineBreak);
                self.document
                    .insert_child(point.key, point.offset, line_break)?;
                self.set_cursor(point.key, point.offset + 1);
                Ok(())
            }
            Some(_) => Err(EditError::UnsupportedSelection),
            None => Err(EditError::NodeNotFound(point.key)),
        }
    }

    /// Splits a text node at `offset`; the tail moves into a new sibling with
    /// the same format, which is returned (possibly empty).
    pub fn split_text(&mut self, key: NodeKey, offset: usize) -> Result<NodeKey, EditError> {
        let Some(NodeKind::Text { text, format }) = self.document.kind(key).cloned() else {
            return Err(EditError::NotText(key));
        };
        let byte = char_offset_to_byte(&text, offset).ok_or(EditError::InvalidOffset { key, offset })?;
        let (head, tail) = text.split_at(byte);
        let tail_key = self.document.create(NodeKind::Text {
            text: tail.to_string(),
            format,
        });
        self.document.set_text(key, head.to_string())?;
        self.document.insert_after(key, tail_key)?;
        Ok(tail_key)
    }

    /// Removes chars `[start, end)` of a text node.
    pub fn delete_text(&mut self, key: NodeKey, start: usize, end: usize) -> Result<(), EditError> {
        let text = self.document.text(key).ok_or(EditError::NotText(key))?;
        let from = char_offset_to_byte(text, start).ok_or(EditError::InvalidOffset { key, offset: start })?;
        let to = char_offset_to_byte(text, end).ok_or(EditError::InvalidOffset { key, offset: end })?;
        if from > to {
            return Err(EditError::InvalidOffset { key, offset: end });
        }
        let mut body = text.to_string();
        body.replace_range(from..to, "");
        self.document.set_text(key, body)
    }

    /// Backspace. Returns whether anything was removed.
    pub fn delete_backward(&mut self) -> Result<bool, EditError> {
        let selection = self.selection.ok_or(EditError::NoSelection)?;
        if !selection.is_collapsed() {
            self.delete_selection()?;
            return Ok(true);
        }
        let point = selection.anchor;
        match self.document.kind(point.key) {
            Some(NodeKind::Text { .. }) if point.offset > 0 => {
                self.delete_text(point.key, point.offset - 1, point.offset)?;
                self.set_cursor(point.key, point.offset - 1);
                Ok(true)
            }
            Some(NodeKind::Text { .. }) => {
                let Some(previous) = self.document.previous_sibling(point.key) else {
                    return Ok(false);
                };
                match self.document.kind(previous) {
                    Some(NodeKind::LineBreak) => {
                        self.document.remove(previous)?;
                        Ok(true)
                    }
                    Some(NodeKind::Text { text, .. }) => {
                        let len = char_len(text);
                        if len == 0 {
                            return Ok(false);
                        }
                        self.delete_text(previous, len - 1, len)?;
                        self.set_cursor(previous, len - 1);
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
            Some(kind) if kind.holds_inline() && point.offset > 0 => {
                let previous = self.document.children(point.key)[point.offset - 1];
                match self.document.kind(previous) {
                    Some(NodeKind::LineBreak) => {
                        self.document.remove(previous)?;
                        self.set_cursor(point.key, point.offset - 1);
                        Ok(true)
                    }
                    Some(NodeKind::Text { text, .. }) => {
                        let len = char_len(text);
                        self.set_cursor(previous, len);
                        self.delete_backward()
                    }
                    _ => Ok(false),
                }
            }
            Some(_) => Ok(false),
            None => Err(EditError::NodeNotFound(point.key)),
        }
    }

    /// Deletes the selected range. Supports ranges inside one inline parent.
    pub fn delete_selection(&mut self) -> Result<(), EditError> {
        let (start, end) = self.ordered_selection().ok_or(EditError::NoSelection)?;
        if start == end {
            return Ok(());
        }
        if start.key == end.key {
            if self.document.text(start.key).is_none() {
                return Err(EditError::UnsupportedSelection);
            }
            self.delete_text(start.key, start.offset, end.offset)?;
            self.set_cursor(start.key, start.offset);
            return Ok(());
        }
        let (Some(start_text), Some(end_text)) =
            (self.document.text(start.key), self.document.text(end.key))
        else {
            return Err(EditError::UnsupportedSelection);
        };
        let parent = self.document.parent(start.key);
        if parent.is_none() || parent != self.document.parent(end.key) {
            return Err(EditError::UnsupportedSelection);
        }
        let start_len = char_len(start_text);
        let _ = end_text;
        let (Some(from), Some(to)) = (
            self.document.index_in_parent(start.key),
            self.document.index_in_parent(end.key),
        ) else {
            return Err(EditError::UnsupportedSelection);
        };
        let parent = parent.ok_or(EditError::UnsupportedSelection)?;
        let between: Vec<NodeKey> = self.document.children(parent)[from + 1..to].to_vec();
        for key in between {
            self.document.remove(key)?;
        }
        self.delete_text(start.key, start.offset, start_len)?;
        self.delete_text(end.key, 0, end.offset)?;
        self.set_cursor(start.key, start.offset);
        Ok(())
    }

    /// Toggles `flag` over the selected text. All-formatted ranges lose the
    /// flag; anything else gains it. Returns false for a collapsed selection.
    pub fn format_text(&mut self, flag: TextFormat) -> Result<bool, EditError> {
        let (start, end) = self.ordered_selection().ok_or(EditError::NoSelection)?;
        if start == end {
            return Ok(false);
        }
        if self.document.text(start.key).is_none() || self.document.text(end.key).is_none() {
            return Err(EditError::UnsupportedSelection);
        }

        let targets: Vec<NodeKey>;
        let anchor: Point;
        let focus: Point;
        if start.key == end.key {
            let middle = if start.offset > 0 {
                self.split_text(start.key, start.offset)?
            } else {
                start.key
            };
            let middle_len = end.offset - start.offset;
            if middle_len < char_len(self.document.text(middle).unwrap_or_default()) {
                self.split_text(middle, middle_len)?;
            }
            targets = vec![middle];
            anchor = Point::new(middle, 0);
            focus = Point::new(middle, middle_len);
        } else {
            let order = self.document.preorder();
            let from = order.iter().position(|key| *key == start.key);
            let to = order.iter().position(|key| *key == end.key);
            let (Some(from), Some(to)) = (from, to) else {
                return Err(EditError::UnsupportedSelection);
            };
            let inner: Vec<NodeKey> = order[from + 1..to]
                .iter()
                .copied()
                .filter(|key| self.document.text(*key).is_some())
                .collect();
            let first = if start.offset > 0 {
                self.split_text(start.key, start.offset)?
            } else {
                start.key
            };
            let end_len = char_len(self.document.text(end.key).unwrap_or_default());
            if end.offset < end_len {
                self.split_text(end.key, end.offset)?;
            }
            let mut all = vec![first];
            all.extend(inner);
            all.push(end.key);
            targets = all;
            anchor = Point::new(first, 0);
            focus = end;
        }

        let all_set = targets
            .iter()
            .all(|key| self.document.format(*key).is_some_and(|format| format.contains(flag)));
        for key in &targets {
            let mut format = self.document.format(*key).unwrap_or_default();
            if all_set {
                format.remove(flag);
            } else {
                format.insert(flag);
            }
            self.document.set_format(*key, format)?;
        }
        self.selection = Some(Selection::range(anchor, focus));
        Ok(true)
    }

    /// Nearest block around the anchor that holds inline content.
    pub fn anchor_text_block(&self) -> Option<NodeKey> {
        let selection = self.selection?;
        self.document
            .find_ancestor(selection.anchor.key, NodeKind::holds_inline)
    }

    /// Converts the anchor's text block to `kind`, keeping its children.
    pub fn set_block_type(&mut self, kind: NodeKind) -> Result<(), EditError> {
        if !kind.holds_inline() || matches!(kind, NodeKind::ListItem | NodeKind::TableCell { .. }) {
            return Err(EditError::UnsupportedSelection);
        }
        let block = self.anchor_text_block().ok_or(EditError::NoSelection)?;
        if matches!(
            self.document.kind(block),
            Some(NodeKind::ListItem | NodeKind::TableCell { .. })
        ) {
            return Err(EditError::UnsupportedSelection);
        }
        self.document.set_kind(block, kind)
    }

    /// Splits the current text block at the caret (Enter). Headings and
    /// quotes continue as paragraphs, list items as list items.
    pub fn insert_paragraph(&mut self) -> Result<NodeKey, EditError> {
        if self.selection.is_some_and(|selection| !selection.is_collapsed()) {
            self.delete_selection()?;
        }
        let point = self.cursor().ok_or(EditError::NoSelection)?;
        let block = self
            .document
            .find_ancestor(point.key, |kind| {
                matches!(
                    kind,
                    NodeKind::Paragraph | NodeKind::Heading { .. } | NodeKind::Quote | NodeKind::ListItem
                )
            })
            .ok_or(EditError::UnsupportedSelection)?;
        let next_kind = match self.document.kind(block) {
            Some(NodeKind::ListItem) => NodeKind::ListItem,
            _ => NodeKind::Paragraph,
        };

        // Index of the first child that moves into the new block.
        let split_index = if point.key == block {
            point.offset
        } else {
            let mut child = point.key;
            while self.document.parent(child) != Some(block) {
                child = self
                    .document
                    .parent(child)
                    .ok_or(EditError::UnsupportedSelection)?;
            }
            let index = self
                .document
                .index_in_parent(child)
                .ok_or(EditError::UnsupportedSelection)?;
            if self.document.text(point.key).is_some() && point.offset > 0 {
                self.split_text(point.key, point.offset)?;
                index + 1
            } else {
                index
            }
        };

        let moving: Vec<NodeKey> = self.document.children(block)[split_index..].to_vec();
        let next = self.document.create(next_kind);
        self.document.insert_after(block, next)?;
        for child in moving {
            self.document.append(next, child)?;
        }
        match self.document.children(next).first().copied() {
            Some(first) if self.document.text(first).is_some() => self.set_cursor(first, 0),
            _ => self.set_cursor(next, 0),
        }
        Ok(next)
    }

    /// Builds `shape` and inserts it right after the top-level block holding
    /// the anchor (or at the end of the document).
    pub fn insert_block_after_anchor(&mut self, shape: &Shape) -> Result<NodeKey, EditError> {
        let anchor_block = self
            .selection
            .and_then(|selection| self.document.top_level_block(selection.anchor.key));
        let key = self.document.build(shape);
        match anchor_block {
            Some(block) => self.document.insert_after(block, key)?,
            None => self.document.append(NodeKey::ROOT, key)?,
        }
        Ok(key)
    }
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

pub(crate) fn char_offset_to_byte(text: &str, char_offset: usize) -> Option<usize> {
    if char_offset == 0 {
        return Some(0);
    }
    let mut count = 0;
    for (byte_index, _) in text.char_indices() {
        if count == char_offset {
            return Some(byte_index);
        }
        count += 1;
    }
    if count == char_offset {
        Some(text.len())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph_state(text: &str) -> (EditorState, NodeKey) {
        let document = Document::from_blocks(&[Shape::paragraph(vec![Shape::text(text)])]);
        let text_key = document.text_nodes_in(NodeKey::ROOT)[0];
        let mut state = EditorState::from_document(document);
        state.set_cursor(text_key, char_len(text));
        (state, text_key)
    }

    #[test]
    fn test_insert_text_into_empty_paragraph_creates_run() {
        let document = Document::from_blocks(&[Shape::paragraph(vec![])]);
        let paragraph = document.blocks()[0];
        let mut state = EditorState::from_document(document);
        state.set_cursor(paragraph, 0);
        state.insert_text("/").unwrap();
        let cursor = state.cursor().unwrap();
        assert_eq!(state.document.text(cursor.key), Some("/"));
        assert_eq!(cursor.offset, 1);
        assert_eq!(state.document.parent(cursor.key), Some(paragraph));
    }

    #[test]
    fn test_insert_text_multibyte_offsets() {
        let (mut state, key) = paragraph_state("héllo");
        state.set_cursor(key, 2);
        state.insert_text("ü").unwrap();
        assert_eq!(state.document.text(key), Some("héüllo"));
        assert_eq!(state.cursor(), Some(Point::new(key, 3)));
    }

    #[test]
    fn test_insert_text_with_newline_adds_line_break() {
        let (mut state, _) = paragraph_state("a");
        state.insert_text("b\nc").unwrap();
        let shape = state.document.block_shapes().remove(0);
        let mut normalized = shape.clone();
        normalized.normalize();
        assert_eq!(
            normalized.children,
            vec![Shape::text("ab"), Shape::line_break(), Shape::text("c")]
        );
    }

    #[test]
    fn test_delete_backward_and_selection() {
        let (mut state, key) = paragraph_state("abc");
        assert!(state.delete_backward().unwrap());
        assert_eq!(state.document.text(key), Some("ab"));
        state.select_text(key, 0, 2);
        state.delete_backward().unwrap();
        assert_eq!(state.document.text(key), Some(""));
        assert_eq!(state.cursor(), Some(Point::new(key, 0)));
    }

    #[test]
    fn test_format_text_splits_single_run() {
        let (mut state, key) = paragraph_state("hello world");
        state.select_text(key, 6, 11);
        assert!(state.format_text(TextFormat::BOLD).unwrap());
        let paragraph = state.document.block_shapes().remove(0);
        assert_eq!(
            paragraph.children,
            vec![
                Shape::text("hello "),
                Shape::formatted("world", TextFormat::BOLD),
            ]
        );
        // Toggling again removes the flag.
        assert!(state.format_text(TextFormat::BOLD).unwrap());
        let mut paragraph = state.document.block_shapes().remove(0);
        paragraph.normalize();
        assert_eq!(paragraph.children, vec![Shape::text("hello world")]);
    }

    #[test]
    fn test_snapshot_extent_and_block() {
        let (mut state, key) = paragraph_state("hello");
        state.select_text(key, 1, 4);
        let snapshot = state.snapshot();
        assert!(!snapshot.collapsed);
        assert_eq!(snapshot.text_extent, 3);
        assert_eq!(snapshot.anchor_block, Some(state.document.blocks()[0]));
        state.selection = None;
        assert_eq!(state.snapshot(), SelectionSnapshot::default());
    }

    #[test]
    fn test_insert_paragraph_splits_heading() {
        let document = Document::from_blocks(&[Shape::heading(1, vec![Shape::text("Title rest")])]);
        let key = document.text_nodes_in(NodeKey::ROOT)[0];
        let mut state = EditorState::from_document(document);
        state.set_cursor(key, 5);
        state.insert_paragraph().unwrap();
        assert_eq!(
            state.document.block_shapes(),
            vec![
                Shape::heading(1, vec![Shape::text("Title")]),
                Shape::paragraph(vec![Shape::text(" rest")]),
            ]
        );
    }

    #[test]
    fn test_repair_selection_drops_missing_nodes() {
        let (mut state, key) = paragraph_state("abc");
        state.set_cursor(key, 10);
        state.repair_selection();
        assert_eq!(state.cursor(), Some(Point::new(key, 3)));
        state.document.clear();
        state.repair_selection();
        assert_eq!(state.selection, None);
    }
}
