//! Per-block action handle.
//!
//! The handle attaches to the block under the pointer (first block rect in
//! document order containing it) and, on every update tick, to the block
//! holding the caret. Leaving the root arms a delayed hide that entering the
//! handle or opening its menu cancels.

use std::cell::Cell;
use std::time::Instant;

use super::{MenuCommand, Overlay, OverlayCore, OverlayKind, OverlayState, OverlayView, PointerOutcome};
use crate::doc::{EditError, NodeKey, NodeKind};
use crate::runtime::{Position, Rect, Runtime};
use crate::session::{SessionCore, SessionRef};

const KIND: OverlayKind = OverlayKind::BlockHandle;

pub struct BlockHandle {
    core: OverlayCore,
    block: Cell<Option<NodeKey>>,
    over_handle: Cell<bool>,
    pointer_in_root: Cell<bool>,
}

impl BlockHandle {
    pub fn new(session: Option<SessionRef>) -> Self {
        Self {
            core: OverlayCore::new(session),
            block: Cell::new(None),
            over_handle: Cell::new(false),
            pointer_in_root: Cell::new(false),
        }
    }

    /// Block the handle is attached to.
    pub fn block(&self) -> Option<NodeKey> {
        self.block.get()
    }

    pub fn pointer_move(&self, position: Position) {
        let Some(session) = self.core.session() else {
            self.force_hidden();
            return;
        };
        self.pointer_in_root.set(true);
        let Some(surface) = session.runtime().root() else {
            self.hide();
            return;
        };
        let hit = surface
            .block_rects()
            .into_iter()
            .find(|(_, rect)| rect.contains(position));
        if let Some((block, rect)) = hit {
            self.attach(block, rect);
        }
    }

    pub fn pointer_leave(&self) {
        self.pointer_in_root.set(false);
        self.schedule_hide();
    }

    pub fn pointer_enter_handle(&self) {
        self.over_handle.set(true);
        self.core.cancel_timer();
    }

    pub fn pointer_leave_handle(&self) {
        self.over_handle.set(false);
        if !self.pointer_in_root.get() {
            self.schedule_hide();
        }
    }

    /// Pressing the handle must not move focus out of the editor.
    pub fn mouse_down(&self) -> PointerOutcome {
        PointerOutcome::PreventDefault
    }

    /// Moves the handle to the block holding the caret.
    pub fn follow_cursor(&self) {
        let Some(session) = self.core.session() else {
            self.force_hidden();
            return;
        };
        let state = self.core.state();
        if let Some(current) = self.block.get() {
            let exists = session
                .runtime()
                .read(|editor| editor.document.contains(current))
                .unwrap_or(true);
            if !exists && !state.menu_open {
                self.hide();
                return;
            }
        }
        if state.menu_open {
            return;
        }
        let Some(anchor_block) = session.snapshot().anchor_block else {
            return;
        };
        let Some(rect) = session
            .runtime()
            .root()
            .and_then(|surface| surface.node_rect(anchor_block))
        else {
            return;
        };
        self.attach(anchor_block, rect);
    }

    fn attach(&self, block: NodeKey, rect: Rect) {
        self.block.set(Some(block));
        self.core.cancel_timer();
        self.core.show(KIND, rect);
    }

    fn schedule_hide(&self) {
        let state = self.core.state();
        if !state.visible || state.menu_open || self.over_handle.get() {
            return;
        }
        if let Some(session) = self.core.session() {
            self.core
                .arm(&session, session.config().overlay.handle_hide_delay());
        }
    }

    fn hide(&self) {
        self.block.set(None);
        self.core.hide(KIND);
    }

    fn force_hidden(&self) {
        self.over_handle.set(false);
        self.pointer_in_root.set(false);
        self.hide();
    }

    fn position(&self, session: &SessionCore) -> Option<Position> {
        let rect = self.core.state().anchor_rect?;
        Some(Position::new(
            rect.left() - session.config().overlay.handle_offset,
            rect.top(),
        ))
    }
}

impl Overlay for BlockHandle {
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
        let Some(session) = self.core.session() else {
            return OverlayView::HIDDEN;
        };
        OverlayView {
            visible: true,
            position: self.position(&session),
        }
    }

    fn commands(&self) -> &'static [MenuCommand] {
        &BLOCK_COMMANDS
    }

    fn target(&self) -> Option<NodeKey> {
        self.block.get()
    }

    fn set_menu_open(&self, open: bool) {
        if !self.core.set_menu_open(KIND, open) {
            return;
        }
        if open {
            self.core.cancel_timer();
        } else if self.block.get().is_none() {
            self.hide();
        } else if !self.pointer_in_root.get() {
            self.schedule_hide();
        }
    }

    fn advance(&self, now: Instant) {
        if self.core.fire(now).is_none() {
            return;
        }
        let state = self.core.state();
        if !state.menu_open && !self.over_handle.get() {
            self.hide();
        }
    }

    fn execute(&self, id: &str) -> bool {
        super::execute(self, &self.core, id)
    }

    fn teardown(&self) {
        self.force_hidden();
        self.core.detach();
    }
}

fn edit_block(
    runtime: &Runtime,
    target: Option<NodeKey>,
    edit: impl FnOnce(&mut crate::doc::EditorState, NodeKey) -> Result<(), EditError>,
) -> bool {
    let Some(block) = target else {
        return false;
    };
    match runtime.try_update(|state| edit(state, block)) {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(%block, error = %err, "block command rejected");
            false
        }
    }
}

fn insert_below(runtime: &Runtime, target: Option<NodeKey>) -> bool {
    edit_block(runtime, target, |state, block| {
        let paragraph = state.document.create(NodeKind::Paragraph);
        state.document.insert_after(block, paragraph)?;
        state.set_cursor(paragraph, 0);
        Ok(())
    })
}

fn duplicate(runtime: &Runtime, target: Option<NodeKey>) -> bool {
    edit_block(runtime, target, |state, block| {
        let shape = state
            .document
            .node_shape(block)
            .ok_or(EditError::NodeNotFound(block))?;
        let copy = state.document.build(&shape);
        state.document.insert_after(block, copy)
    })
}

fn move_up(runtime: &Runtime, target: Option<NodeKey>) -> bool {
    edit_block(runtime, target, |state, block| {
        let previous = state
            .document
            .previous_sibling(block)
            .ok_or(EditError::UnsupportedSelection)?;
        state.document.insert_before(previous, block)
    })
}

fn move_down(runtime: &Runtime, target: Option<NodeKey>) -> bool {
    edit_block(runtime, target, |state, block| {
        let next = state
            .document
            .next_sibling(block)
            .ok_or(EditError::UnsupportedSelection)?;
        // Moving the follower up avoids shifting indices within one parent.
        state.document.insert_before(block, next)
    })
}

fn delete(runtime: &Runtime, target: Option<NodeKey>) -> bool {
    edit_block(runtime, target, |state, block| state.document.remove(block))
}

fn turn_into(runtime: &Runtime, target: Option<NodeKey>, kind: NodeKind) -> bool {
    edit_block(runtime, target, |state, block| {
        match state.document.kind(block) {
            Some(NodeKind::Paragraph | NodeKind::Heading { .. } | NodeKind::Quote) => {
                state.document.set_kind(block, kind)
            }
            _ => Err(EditError::UnsupportedSelection),
        }
    })
}

static BLOCK_COMMANDS: [MenuCommand; 8] = [
    MenuCommand::new("insert-below", "Insert paragraph below", "plus", insert_below),
    MenuCommand::new("duplicate", "Duplicate", "copy", duplicate),
    MenuCommand::new("move-up", "Move up", "arrow-up", move_up),
    MenuCommand::new("move-down", "Move down", "arrow-down", move_down),
    MenuCommand::new("delete", "Delete", "trash", delete),
    MenuCommand::new("turn-into-heading", "Turn into heading", "heading", |rt, target| {
        turn_into(rt, target, NodeKind::Heading { level: 1 })
    }),
    MenuCommand::new("turn-into-quote", "Turn into quote", "quote", |rt, target| {
        turn_into(rt, target, NodeKind::Quote)
    }),
    MenuCommand::new("turn-into-paragraph", "Turn into text", "pilcrow", |rt, target| {
        turn_into(rt, target, NodeKind::Paragraph)
    }),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::Shape;
    use crate::runtime::RuntimeConfig;

    fn runtime_with(blocks: &[Shape]) -> (Runtime, Vec<NodeKey>) {
        let runtime = Runtime::create(RuntimeConfig::new("handle-test")).unwrap();
        let keys = runtime
            .update(|state| state.document.graft(blocks))
            .unwrap();
        (runtime, keys)
    }

    fn texts(runtime: &Runtime) -> Vec<String> {
        runtime
            .read(|state| {
                state
                    .document
                    .block_shapes()
                    .iter()
                    .map(Shape::text_content)
                    .collect()
            })
            .unwrap()
    }

    #[test]
    fn test_move_commands_reorder_blocks() {
        let (rt, keys) = runtime_with(&[
            Shape::paragraph(vec![Shape::text("a")]),
            Shape::paragraph(vec![Shape::text("b")]),
            Shape::paragraph(vec![Shape::text("c")]),
        ]);
        assert!(move_down(&rt, Some(keys[0])));
        assert_eq!(texts(&rt), vec!["b", "a", "c"]);
        assert!(move_up(&rt, Some(keys[2])));
        assert_eq!(texts(&rt), vec!["b", "c", "a"]);
        assert!(!move_down(&rt, Some(keys[0])));
    }

    #[test]
    fn test_duplicate_and_delete() {
        let (rt, keys) = runtime_with(&[Shape::heading(2, vec![Shape::text("t")])]);
        assert!(duplicate(&rt, Some(keys[0])));
        assert_eq!(texts(&rt), vec!["t", "t"]);
        assert!(delete(&rt, Some(keys[0])));
        assert_eq!(
            rt.read(|state| state.document.block_shapes()).unwrap(),
            vec![Shape::heading(2, vec![Shape::text("t")])]
        );
        assert!(!delete(&rt, None));
    }

    #[test]
    fn test_turn_into_skips_structural_blocks() {
        let (rt, keys) = runtime_with(&[
            Shape::paragraph(vec![Shape::text("p")]),
            Shape::table(&[&["x"]]),
        ]);
        assert!(turn_into(&rt, Some(keys[0]), NodeKind::Quote));
        assert!(!turn_into(&rt, Some(keys[1]), NodeKind::Quote));
        let blocks = rt.read(|state| state.document.block_shapes()).unwrap();
        assert_eq!(blocks[0], Shape::quote(vec![Shape::text("p")]));
    }

    #[test]
    fn test_detached_handle_prevents_default_and_stays_hidden() {
        let handle = BlockHandle::new(None);
        handle.pointer_move(Position::new(1.0, 1.0));
        assert_eq!(handle.view(), OverlayView::HIDDEN);
        assert_eq!(handle.mouse_down(), PointerOutcome::PreventDefault);
    }
}
