//! Selection-reactive overlays: the floating formatting toolbar, the block
//! action handle, and the table action marker.
//!
//! Each overlay is a small state machine over [`OverlayState`] driven purely
//! by runtime notifications, pointer events routed by the session, and
//! explicit [`Overlay::set_menu_open`] calls from the menu widget. None of
//! them keeps the session alive: they hold an optional [`SessionRef`], and
//! without a live session they are forced hidden and do no positioning work.
//!
//! Timers never write state blindly. When a deadline fires the machine first
//! re-checks that the session is still mounted and that the selection
//! snapshot still matches the one that armed the timer.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use crate::doc::{NodeKey, SelectionSnapshot};
use crate::runtime::{Position, Rect, Runtime};
use crate::session::{SessionCore, SessionRef};

pub mod block_handle;
pub mod table_marker;
pub mod timer;
pub mod toolbar;

pub use block_handle::BlockHandle;
pub use table_marker::TableMarker;
pub use timer::{Clock, DebounceTimer, ManualClock, SystemClock};
pub use toolbar::{FloatingToolbar, Placement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKind {
    Toolbar,
    BlockHandle,
    TableMarker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPhase {
    Hidden,
    Visible,
    VisibleWithMenuOpen,
}

/// `menu_open` implies `visible`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OverlayState {
    pub visible: bool,
    pub anchor_rect: Option<Rect>,
    pub menu_open: bool,
}

impl OverlayState {
    pub const HIDDEN: OverlayState = OverlayState {
        visible: false,
        anchor_rect: None,
        menu_open: false,
    };

    pub fn shown(anchor_rect: Rect) -> Self {
        Self {
            visible: true,
            anchor_rect: Some(anchor_rect),
            menu_open: false,
        }
    }

    pub fn phase(&self) -> OverlayPhase {
        match (self.visible, self.menu_open) {
            (false, _) => OverlayPhase::Hidden,
            (true, false) => OverlayPhase::Visible,
            (true, true) => OverlayPhase::VisibleWithMenuOpen,
        }
    }
}

/// What a renderer needs to draw an overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OverlayView {
    pub visible: bool,
    pub position: Option<Position>,
}

impl OverlayView {
    pub const HIDDEN: OverlayView = OverlayView {
        visible: false,
        position: None,
    };
}

/// Where a pointer press landed, as classified by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    /// The overlay widget itself.
    Overlay,
    /// Inside the editing root.
    Root,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOutcome {
    /// The platform should suppress its default action (focus loss).
    PreventDefault,
    Default,
}

pub type MenuAction = fn(&Runtime, Option<NodeKey>) -> bool;

/// An entry of an overlay menu. `run` receives the overlay's target node,
/// if any, and reports whether the command applied.
#[derive(Clone, Copy)]
pub struct MenuCommand {
    pub id: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
    action: MenuAction,
}

impl MenuCommand {
    pub const fn new(id: &'static str, label: &'static str, icon: &'static str, action: MenuAction) -> Self {
        Self {
            id,
            label,
            icon,
            action,
        }
    }

    pub fn run(&self, runtime: &Runtime, target: Option<NodeKey>) -> bool {
        (self.action)(runtime, target)
    }
}

impl std::fmt::Debug for MenuCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuCommand")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Common surface of the three overlay state machines.
pub trait Overlay {
    fn kind(&self) -> OverlayKind;

    fn state(&self) -> OverlayState;

    fn view(&self) -> OverlayView;

    fn commands(&self) -> &'static [MenuCommand];

    /// Node the menu commands act on.
    fn target(&self) -> Option<NodeKey>;

    /// Pushed by the menu widget whenever it opens or closes.
    fn set_menu_open(&self, open: bool);

    /// Fires a due timer, if any.
    fn advance(&self, now: Instant);

    /// Runs the menu command `id` against [`Overlay::target`], then closes
    /// the menu and returns focus to the editor.
    fn execute(&self, id: &str) -> bool;

    /// Forces the hidden state and cancels pending work.
    fn teardown(&self);
}

pub(crate) fn execute(overlay: &dyn Overlay, core: &OverlayCore, id: &str) -> bool {
    let Some(session) = core.session() else {
        return false;
    };
    let Some(command) = overlay.commands().iter().find(|command| command.id == id) else {
        return false;
    };
    let applied = command.run(session.runtime(), overlay.target());
    tracing::debug!(overlay = ?overlay.kind(), command = id, applied, "overlay command");
    overlay.set_menu_open(false);
    session.runtime().focus();
    applied
}

/// State, session link, and timer shared by every overlay machine.
#[derive(Default)]
pub(crate) struct OverlayCore {
    session: RefCell<Option<SessionRef>>,
    state: Cell<OverlayState>,
    timer: DebounceTimer,
    armed_with: RefCell<Option<SelectionSnapshot>>,
}

impl OverlayCore {
    pub(crate) fn new(session: Option<SessionRef>) -> Self {
        Self {
            session: RefCell::new(session),
            ..Self::default()
        }
    }

    /// The live session, or `None` after teardown or unmount.
    pub(crate) fn session(&self) -> Option<Rc<SessionCore>> {
        let session = self.session.borrow().clone()?;
        session.upgrade()
    }

    pub(crate) fn detach(&self) {
        self.session.borrow_mut().take();
    }

    pub(crate) fn state(&self) -> OverlayState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, kind: OverlayKind, next: OverlayState) {
        let previous = self.state.replace(next);
        if previous.phase() != next.phase() {
            tracing::trace!(overlay = ?kind, from = ?previous.phase(), to = ?next.phase(), "overlay transition");
        }
    }

    pub(crate) fn hide(&self, kind: OverlayKind) {
        self.timer.cancel();
        self.set_state(kind, OverlayState::HIDDEN);
    }

    pub(crate) fn show(&self, kind: OverlayKind, anchor_rect: Rect) {
        let menu_open = self.state.get().menu_open;
        self.set_state(
            kind,
            OverlayState {
                visible: true,
                anchor_rect: Some(anchor_rect),
                menu_open,
            },
        );
    }

    /// Opens or closes the menu. Opening requires a visible overlay.
    pub(crate) fn set_menu_open(&self, kind: OverlayKind, open: bool) -> bool {
        let mut state = self.state.get();
        if open && !state.visible {
            return false;
        }
        state.menu_open = open;
        self.set_state(kind, state);
        true
    }

    pub(crate) fn arm(&self, core: &SessionCore, delay: std::time::Duration) {
        *self.armed_with.borrow_mut() = Some(core.snapshot());
        self.timer.arm(core.now(), delay);
    }

    pub(crate) fn cancel_timer(&self) {
        self.timer.cancel();
        self.armed_with.borrow_mut().take();
    }

    #[cfg(test)]
    pub(crate) fn timer(&self) -> &DebounceTimer {
        &self.timer
    }

    /// Consumes a due deadline and returns the live session when the
    /// selection still matches the snapshot taken at arming time.
    pub(crate) fn fire(&self, now: Instant) -> Option<Rc<SessionCore>> {
        if !self.timer.fire_if_due(now) {
            return None;
        }
        let armed_with = self.armed_with.borrow_mut().take();
        let core = self.session()?;
        if armed_with.is_some_and(|snapshot| snapshot != core.snapshot()) {
            tracing::trace!("stale overlay timer ignored");
            return None;
        }
        Some(core)
    }
}
