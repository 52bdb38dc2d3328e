//! Floating formatting toolbar.
//!
//! Visible exactly when the platform reports a non-collapsed selection
//! anchored inside the editing root. It sits above the selection rect and
//! flips below when there is no room above the viewport top.

use std::cell::Cell;
use std::time::Instant;

use super::{
    MenuCommand, Overlay, OverlayCore, OverlayKind, OverlayState, OverlayView, PointerOutcome,
    PointerTarget,
};
use crate::doc::{NodeKey, TextFormat};
use crate::runtime::{BlockType, Position, Rect, Runtime, command};
use crate::session::{SessionCore, SessionRef};

const KIND: OverlayKind = OverlayKind::Toolbar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Above,
    Below,
}

pub struct FloatingToolbar {
    core: OverlayCore,
    placement: Cell<Placement>,
    position: Cell<Option<Position>>,
    /// A hide was requested while the menu was open.
    hide_pending: Cell<bool>,
}

impl FloatingToolbar {
    pub fn new(session: Option<SessionRef>) -> Self {
        Self {
            core: OverlayCore::new(session),
            placement: Cell::new(Placement::Above),
            position: Cell::new(None),
            hide_pending: Cell::new(false),
        }
    }

    pub fn placement(&self) -> Placement {
        self.placement.get()
    }

    pub fn is_hide_pending(&self) -> bool {
        self.hide_pending.get()
    }

    /// Re-evaluates visibility against the current native selection.
    pub fn refresh(&self) {
        let Some(session) = self.core.session() else {
            self.force_hidden();
            return;
        };
        let surface = session.runtime().root();
        let selection = surface.as_ref().and_then(|surface| {
            surface
                .native_selection()
                .filter(|selection| selection.anchor_in_root && !selection.collapsed)
                .map(|selection| (selection.rect, surface.viewport()))
        });
        match selection {
            Some((rect, viewport)) => {
                self.hide_pending.set(false);
                self.core.cancel_timer();
                self.core.show(KIND, rect);
                self.place(&session, rect, viewport);
            }
            None => self.request_hide(),
        }
    }

    fn place(&self, session: &SessionCore, rect: Rect, viewport: Rect) {
        let overlay = &session.config().overlay;
        let above = rect.top() - overlay.toolbar_gap - overlay.toolbar_height;
        let (placement, y) = if above < viewport.top() {
            (Placement::Below, rect.bottom() + overlay.toolbar_gap)
        } else {
            (Placement::Above, above)
        };
        self.placement.set(placement);
        self.position
            .set(Some(Position::new(rect.left().max(viewport.left()), y)));
    }

    fn request_hide(&self) {
        if self.core.state().menu_open {
            self.hide_pending.set(true);
            return;
        }
        self.hide_pending.set(false);
        self.core.hide(KIND);
        self.position.set(None);
    }

    fn force_hidden(&self) {
        self.hide_pending.set(false);
        self.core.hide(KIND);
        self.position.set(None);
    }

    /// Escape hides the toolbar. Returns whether it was visible.
    pub fn escape(&self) -> bool {
        let visible = self.core.state().visible;
        if visible {
            self.request_hide();
        }
        visible
    }

    pub fn pointer_down(&self, target: PointerTarget) -> PointerOutcome {
        match target {
            PointerTarget::Overlay => PointerOutcome::PreventDefault,
            PointerTarget::Root => PointerOutcome::Default,
            PointerTarget::Outside => {
                self.request_hide();
                PointerOutcome::Default
            }
        }
    }
}

impl Overlay for FloatingToolbar {
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
        &TOOLBAR_COMMANDS
    }

    fn target(&self) -> Option<NodeKey> {
        None
    }

    fn set_menu_open(&self, open: bool) {
        if !self.core.set_menu_open(KIND, open) {
            return;
        }
        if open {
            self.core.cancel_timer();
            return;
        }
        if self.hide_pending.get()
            && let Some(session) = self.core.session()
        {
            self.core.arm(&session, session.config().overlay.menu_recheck_delay());
        }
    }

    fn advance(&self, now: Instant) {
        if self.core.fire(now).is_some() {
            self.hide_pending.set(false);
            self.refresh();
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

fn toggle(runtime: &Runtime, format: TextFormat) -> bool {
    runtime.dispatch(command::FORMAT_TEXT, format)
}

fn block(runtime: &Runtime, block_type: BlockType) -> bool {
    runtime.dispatch(command::SET_BLOCK_TYPE, block_type)
}

static TOOLBAR_COMMANDS: [MenuCommand; 8] = [
    MenuCommand::new("bold", "Bold", "bold", |rt, _| toggle(rt, TextFormat::BOLD)),
    MenuCommand::new("italic", "Italic", "italic", |rt, _| toggle(rt, TextFormat::ITALIC)),
    MenuCommand::new("strikethrough", "Strikethrough", "strikethrough", |rt, _| {
        toggle(rt, TextFormat::STRIKETHROUGH)
    }),
    MenuCommand::new("code", "Inline code", "code", |rt, _| toggle(rt, TextFormat::CODE)),
    MenuCommand::new("paragraph", "Text", "pilcrow", |rt, _| block(rt, BlockType::Paragraph)),
    MenuCommand::new("heading-1", "Heading 1", "heading-1", |rt, _| {
        block(rt, BlockType::Heading(1))
    }),
    MenuCommand::new("heading-2", "Heading 2", "heading-2", |rt, _| {
        block(rt, BlockType::Heading(2))
    }),
    MenuCommand::new("quote", "Quote", "quote", |rt, _| block(rt, BlockType::Quote)),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::OverlayPhase;

    #[test]
    fn test_detached_toolbar_stays_hidden() {
        let toolbar = FloatingToolbar::new(None);
        toolbar.refresh();
        assert_eq!(toolbar.view(), OverlayView::HIDDEN);
        toolbar.set_menu_open(true);
        assert_eq!(toolbar.state().phase(), OverlayPhase::Hidden);
        assert_eq!(toolbar.pointer_down(PointerTarget::Overlay), PointerOutcome::PreventDefault);
    }

    #[test]
    fn test_command_ids_are_unique() {
        let toolbar = FloatingToolbar::new(None);
        let mut ids: Vec<&str> = toolbar.commands().iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), TOOLBAR_COMMANDS.len());
    }
}
