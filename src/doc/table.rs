//! Table structure edits: rows and columns addressed through a cell key.

use super::{Document, EditError, EditorState, NodeKey, NodeKind, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCoords {
    pub table: NodeKey,
    pub row: NodeKey,
    pub cell: NodeKey,
    pub row_index: usize,
    pub column_index: usize,
}

/// Walks up from `key` to the nearest table cell and resolves its position.
pub fn locate_cell(doc: &Document, key: NodeKey) -> Option<TableCoords> {
    let cell = doc.find_ancestor(key, |kind| matches!(kind, NodeKind::TableCell { .. }))?;
    let row = doc.parent(cell)?;
    let table = doc.parent(row)?;
    if !matches!(doc.kind(table), Some(NodeKind::Table)) {
        return None;
    }
    Some(TableCoords {
        table,
        row,
        cell,
        row_index: doc.index_in_parent(row)?,
        column_index: doc.index_in_parent(cell)?,
    })
}

pub fn column_count(doc: &Document, table: NodeKey) -> usize {
    doc.children(table)
        .iter()
        .map(|row| doc.children(*row).len())
        .max()
        .unwrap_or(0)
}

/// Empty table with a header row.
pub fn table_shape(rows: usize, columns: usize) -> Shape {
    let rows = (0..rows.max(1))
        .map(|row| {
            Shape::with_children(
                NodeKind::TableRow,
                (0..columns.max(1))
                    .map(|_| Shape::new(NodeKind::TableCell { header: row == 0 }))
                    .collect(),
            )
        })
        .collect();
    Shape::with_children(NodeKind::Table, rows)
}

impl EditorState {
    /// Inserts an empty table after the anchor block and puts the caret in
    /// its first cell.
    pub fn insert_table(&mut self, rows: usize, columns: usize) -> Result<NodeKey, EditError> {
        let table = self.insert_block_after_anchor(&table_shape(rows, columns))?;
        if let Some(first_cell) = self
            .document
            .children(table)
            .first()
            .and_then(|row| self.document.children(*row).first())
            .copied()
        {
            self.set_cursor(first_cell, 0);
        }
        Ok(table)
    }

    pub fn insert_table_row(&mut self, cell: NodeKey, after: bool) -> Result<NodeKey, EditError> {
        let coords = locate_cell(&self.document, cell).ok_or(EditError::NotInTable(cell))?;
        let columns = column_count(&self.document, coords.table);
        let row = self.document.create(NodeKind::TableRow);
        for _ in 0..columns {
            let new_cell = self.document.create(NodeKind::TableCell { header: false });
            self.document.append(row, new_cell)?;
        }
        if after {
            self.document.insert_after(coords.row, row)?;
        } else {
            self.document.insert_before(coords.row, row)?;
        }
        Ok(row)
    }

    pub fn insert_table_column(&mut self, cell: NodeKey, after: bool) -> Result<(), EditError> {
        let coords = locate_cell(&self.document, cell).ok_or(EditError::NotInTable(cell))?;
        let rows = self.document.children(coords.table).to_vec();
        for (row_index, row) in rows.into_iter().enumerate() {
            let header = self
                .document
                .children(row)
                .first()
                .is_some_and(|first| {
                    matches!(
                        self.document.kind(*first),
                        Some(NodeKind::TableCell { header: true })
                    )
                })
                && row_index == 0;
            let new_cell = self.document.create(NodeKind::TableCell { header });
            let len = self.document.children(row).len();
            let index = if after {
                (coords.column_index + 1).min(len)
            } else {
                coords.column_index.min(len)
            };
            self.document.insert_child(row, index, new_cell)?;
        }
        Ok(())
    }

    /// Removes the row holding `cell`; removing the last row removes the table.
    pub fn delete_table_row(&mut self, cell: NodeKey) -> Result<(), EditError> {
        let coords = locate_cell(&self.document, cell).ok_or(EditError::NotInTable(cell))?;
        if self.document.children(coords.table).len() <= 1 {
            return self.delete_table(cell);
        }
        let fallback = self
            .document
            .next_sibling(coords.row)
            .or_else(|| self.document.previous_sibling(coords.row));
        self.document.remove(coords.row)?;
        if let Some(row) = fallback
            && let Some(target) = self
                .document
                .children(row)
                .get(coords.column_index)
                .or_else(|| self.document.children(row).last())
                .copied()
        {
            self.select_end_of(target);
        }
        Ok(())
    }

    /// Removes the column holding `cell`; removing the last column removes
    /// the table.
    pub fn delete_table_column(&mut self, cell: NodeKey) -> Result<(), EditError> {
        let coords = locate_cell(&self.document, cell).ok_or(EditError::NotInTable(cell))?;
        if column_count(&self.document, coords.table) <= 1 {
            return self.delete_table(cell);
        }
        let rows = self.document.children(coords.table).to_vec();
        for row in &rows {
            if let Some(target) = self.document.children(*row).get(coords.column_index).copied() {
                self.document.remove(target)?;
            }
        }
        let target = self
            .document
            .children(coords.row)
            .get(coords.column_index.saturating_sub(1))
            .copied();
        match target {
            Some(target) => self.select_end_of(target),
            None => self.repair_selection(),
        }
        Ok(())
    }

    pub fn delete_table(&mut self, cell: NodeKey) -> Result<(), EditError> {
        let coords = locate_cell(&self.document, cell).ok_or(EditError::NotInTable(cell))?;
        let neighbour = self
            .document
            .next_sibling(coords.table)
            .or_else(|| self.document.previous_sibling(coords.table));
        self.document.remove(coords.table)?;
        match neighbour {
            Some(block) => self.select_end_of(block),
            None => self.selection = None,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_state() -> (EditorState, NodeKey) {
        let document = Document::from_blocks(&[
            Shape::paragraph(vec![Shape::text("before")]),
            Shape::table(&[&["h1", "h2"], &["a", "b"]]),
        ]);
        let table = document.blocks()[1];
        let cell = document.children(document.children(table)[1])[1];
        let mut state = EditorState::from_document(document);
        state.select_end_of(cell);
        (state, cell)
    }

    #[test]
    fn test_locate_cell_from_text() {
        let (state, cell) = table_state();
        let text = state.document.text_nodes_in(cell)[0];
        let coords = locate_cell(&state.document, text).unwrap();
        assert_eq!(coords.cell, cell);
        assert_eq!(coords.row_index, 1);
        assert_eq!(coords.column_index, 1);
        assert!(locate_cell(&state.document, state.document.blocks()[0]).is_none());
    }

    #[test]
    fn test_insert_row_and_column() {
        let (mut state, cell) = table_state();
        state.insert_table_row(cell, true).unwrap();
        state.insert_table_column(cell, false).unwrap();
        let table = state.document.blocks()[1];
        assert_eq!(state.document.children(table).len(), 3);
        assert_eq!(column_count(&state.document, table), 3);
        let header_row = state.document.children(table)[0];
        let inserted_header = state.document.children(header_row)[1];
        assert_eq!(
            state.document.kind(inserted_header),
            Some(&NodeKind::TableCell { header: true })
        );
    }

    #[test]
    fn test_delete_last_row_removes_table() {
        let document = Document::from_blocks(&[Shape::table(&[&["only"]])]);
        let table = document.blocks()[0];
        let cell = document.children(document.children(table)[0])[0];
        let mut state = EditorState::from_document(document);
        state.delete_table_row(cell).unwrap();
        assert!(state.document.is_empty());
        assert_eq!(state.selection, None);
    }

    #[test]
    fn test_delete_column_moves_caret() {
        let (mut state, cell) = table_state();
        state.delete_table_column(cell).unwrap();
        let table = state.document.blocks()[1];
        assert_eq!(column_count(&state.document, table), 1);
        let caret = state.cursor().unwrap();
        assert_eq!(state.document.text(caret.key), Some("a"));
    }
}
