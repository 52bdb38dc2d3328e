//! Table action marker.
//!
//! Shown at the top-right corner of the table cell holding the selection
//! anchor (or the cell under a hover or context-menu event). Coordinates are
//! relative to the cell's nearest scrolling ancestor, offset by its scroll
//! position, so the marker scrolls with the table.

use std::cell::Cell;
use std::time::Instant;

use super::{MenuCommand, Overlay, OverlayCore, OverlayKind, OverlayState, OverlayView};
use crate::doc::{EditError, EditorState, NodeKey, locate_cell};
use crate::runtime::{Position, Rect, Runtime};
use crate::session::{SessionCore, SessionRef};

const KIND: OverlayKind = OverlayKind::TableMarker;

pub struct TableMarker {
    core: OverlayCore,
    cell: Cell<Option<NodeKey>>,
    position: Cell<Option<Position>>,
}

impl TableMarker {
    pub fn new(session: Option<SessionRef>) -> Self {
        Self {
            core: OverlayCore::new(session),
            cell: Cell::new(None),
            position: Cell::new(None),
        }
    }

    pub fn cell(&self) -> Option<NodeKey> {
        self.cell.get()
    }

    /// Follows the cell holding the selection anchor.
    pub fn refresh(&self) {
        let Some(session) = self.core.session() else {
            self.force_hidden();
            return;
        };
        if self.core.state().menu_open {
            return;
        }
        let cell = session
            .runtime()
            .read(|state| {
                let anchor = state.selection?.anchor.key;
                locate_cell(&state.document, anchor).map(|coords| coords.cell)
            })
            .ok()
            .flatten();
        match cell {
            Some(cell) => self.activate(&session, cell),
            None => self.hide(),
        }
    }

    /// Pointer hovering any node inside a table.
    pub fn hover(&self, node: NodeKey) {
        let Some(session) = self.core.session() else {
            self.force_hidden();
            return;
        };
        if self.core.state().menu_open {
            return;
        }
        if let Some(cell) = resolve_cell(&session, node) {
            self.activate(&session, cell);
        }
    }

    /// Context menu on a node: activates its cell and opens the menu.
    /// Returns whether the event was claimed.
    pub fn context_menu(&self, node: NodeKey) -> bool {
        let Some(session) = self.core.session() else {
            self.force_hidden();
            return false;
        };
        let Some(cell) = resolve_cell(&session, node) else {
            return false;
        };
        self.activate(&session, cell);
        self.set_menu_open(true);
        true
    }

    fn activate(&self, session: &SessionCore, cell: NodeKey) {
        let Some(surface) = session.runtime().root() else {
            self.hide();
            return;
        };
        let Some(rect) = surface.node_rect(cell) else {
            self.hide();
            return;
        };
        self.cell.set(Some(cell));
        self.position
            .set(Some(marker_position(rect, surface.scroll_container(cell))));
        self.core.show(KIND, rect);
    }

    fn hide(&self) {
        self.cell.set(None);
        self.position.set(None);
        self.core.hide(KIND);
    }

    fn force_hidden(&self) {
        self.hide();
    }
}

fn resolve_cell(session: &SessionCore, node: NodeKey) -> Option<NodeKey> {
    session
        .runtime()
        .read(|state| locate_cell(&state.document, node).map(|coords| coords.cell))
        .ok()
        .flatten()
}

/// Top-right corner of `cell` in the coordinate space of its scrolling
/// ancestor's content.
pub fn marker_position(cell: Rect, container: Option<crate::runtime::ScrollContainer>) -> Position {
    match container {
        Some(container) => Position::new(
            cell.right() - container.rect.left() + container.scroll_left,
            cell.top() - container.rect.top() + container.scroll_top,
        ),
        None => Position::new(cell.right(), cell.top()),
    }
}

impl Overlay for TableMarker {
    fn kind(&self) -> OverlayKind {
        KIND
    }

    fn state(&self) -> OverlayState {
        self.core.state()
    }

    fn view(&self) -> OverlayView {
        if !self.core.state().visible {
            return OverlayView::HIDDEN;
        }
        OverlayView {
            visible: true,
            position: self.position.get(),
        }
    }

    fn commands(&self) -> &'static [MenuCommand] {
        &TABLE_COMMANDS
    }

    fn target(&self) -> Option<NodeKey> {
        self.cell.get()
    }

    fn set_menu_open(&self, open: bool) {
        if self.core.set_menu_open(KIND, open) && !open {
            // Hides that arrived while the menu was open apply now.
            self.refresh();
        }
    }

    fn advance(&self, _now: Instant) {}

    fn execute(&self, id: &str) -> bool {
        super::execute(self, &self.core, id)
    }

    fn teardown(&self) {
        self.force_hidden();
        self.core.detach();
    }
}

fn edit_cell(
    runtime: &Runtime,
    target: Option<NodeKey>,
    edit: impl FnOnce(&mut EditorState, NodeKey) -> Result<(), EditError>,
) -> bool {
    let Some(cell) = target else {
        return false;
    };
    match runtime.try_update(|state| edit(state, cell)) {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(%cell, error = %err, "table command rejected");
            false
        }
    }
}

static TABLE_COMMANDS: [MenuCommand; 7] = [
    MenuCommand::new("insert-row-above", "Insert row above", "row-insert-top", |rt, cell| {
        edit_cell(rt, cell, |state, cell| state.insert_table_row(cell, false).map(drop))
    }),
    MenuCommand::new("insert-row-below", "Insert row below", "row-insert-bottom", |rt, cell| {
        edit_cell(rt, cell, |state, cell| state.insert_table_row(cell, true).map(drop))
    }),
    MenuCommand::new("insert-column-left", "Insert column left", "column-insert-left", |rt, cell| {
        edit_cell(rt, cell, |state, cell| state.insert_table_column(cell, false))
    }),
    MenuCommand::new("insert-column-right", "Insert column right", "column-insert-right", |rt, cell| {
        edit_cell(rt, cell, |state, cell| state.insert_table_column(cell, true))
    }),
    MenuCommand::new("delete-row", "Delete row", "row-remove", |rt, cell| {
        edit_cell(rt, cell, EditorState::delete_table_row)
    }),
    MenuCommand::new("delete-column", "Delete column", "column-remove", |rt, cell| {
        edit_cell(rt, cell, EditorState::delete_table_column)
    }),
    MenuCommand::new("delete-table", "Delete table", "table-off", |rt, cell| {
        edit_cell(rt, cell, EditorState::delete_table)
    }),
];
