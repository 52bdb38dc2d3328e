//! Editor session facade.
//!
//! A [`Session`] owns one runtime, the resolved plugin set, and the cleanup
//! of every plugin that registered. It routes platform events to the
//! overlay state machines and the slash detector, forwards content changes
//! to the embedder's callbacks, and feeds external values back in without
//! echo re-imports.
//!
//! ```
//! use futures::executor::block_on;
//! use md_surface::config::EditorConfig;
//! use md_surface::session::Session;
//!
//! let config = EditorConfig::default().with_initial_content("# Notes");
//! let session = block_on(Session::mount(config)).unwrap();
//! assert!(session.is_mounted());
//! session.unmount();
//! session.unmount();
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ConfigError, EditorConfig};
use crate::doc::{NodeKey, SelectionSnapshot};
use crate::format::{ContentFormat, ExternalValue};
use crate::overlay::{
    BlockHandle, Clock, FloatingToolbar, MenuCommand, Overlay, OverlayKind, OverlayState,
    OverlayView, PointerOutcome, PointerTarget, SystemClock, TableMarker,
};
use crate::plugin::{self, PluginConfig, PluginDescriptor, PluginError, PluginRegistry, PluginSlots};
use crate::runtime::{
    CommandPriority, Position, Runtime, RuntimeConfig, RuntimeError, Surface, TransactionError,
    Unregister, UpdateEvent, command,
};
use crate::slash::{KeyOutcome, SlashCommand, SlashDetector, SlashState, default_commands};
use crate::sync::{ContentSync, ExternalValueWatcher, SyncError, WatchOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Mounting,
    Ready,
    /// Mounted, but at least one plugin failed to register.
    Degraded,
    Destroyed,
}

/// Errors delivered to the `on_error` callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditorError {
    #[error("plugin `{id}` is unavailable: {source}")]
    Plugin {
        id: String,
        #[source]
        source: PluginError,
    },
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MountError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("editor runtime could not be created: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("plugin registry is invalid: {0}")]
    Registry(#[from] PluginError),
}

impl MountError {
    /// Static text for the fallback shown in place of the editor.
    pub fn fallback_message(&self) -> &'static str {
        "The editor could not be loaded."
    }
}

/// Keys the session intercepts before the platform acts on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    Enter,
    Escape,
}

/// Non-owning link to a session. State machines hold one of these so they
/// never keep the session alive.
#[derive(Clone)]
pub struct SessionRef {
    id: SessionId,
    core: Weak<SessionCore>,
}

impl SessionRef {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The session, unless it was dropped or unmounted.
    pub fn upgrade(&self) -> Option<Rc<SessionCore>> {
        self.core.upgrade().filter(|core| core.is_mounted())
    }

    pub fn is_mounted(&self) -> bool {
        self.upgrade().is_some()
    }

    /// The session even while it is being torn down.
    pub(crate) fn core(&self) -> Option<Rc<SessionCore>> {
        self.core.upgrade()
    }
}

impl std::fmt::Debug for SessionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRef")
            .field("id", &self.id)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

#[derive(Default)]
struct Callbacks {
    on_ready: Option<Rc<dyn Fn()>>,
    on_error: Option<Rc<dyn Fn(&EditorError)>>,
    on_input: Option<Rc<dyn Fn(&ExternalValue)>>,
    on_change: Option<Rc<dyn Fn(&ExternalValue)>>,
    on_blur: Option<Rc<dyn Fn()>>,
}

/// Shared state of a mounted session, reachable from plugins through
/// [`SessionRef::upgrade`].
pub struct SessionCore {
    id: SessionId,
    runtime: Runtime,
    config: EditorConfig,
    plugin_config: PluginConfig,
    sync: ContentSync,
    watcher: ExternalValueWatcher,
    clock: Rc<dyn Clock>,
    status: Cell<SessionStatus>,
    tick: Cell<u64>,
    snapshot: RefCell<SelectionSnapshot>,
    callbacks: Callbacks,
    extra_slash_commands: Vec<SlashCommand>,
    plugins: PluginSlots,
    wiring: RefCell<Vec<Unregister>>,
    toolbar: RefCell<Option<Rc<FloatingToolbar>>>,
    block_handle: RefCell<Option<Rc<BlockHandle>>>,
    table_marker: RefCell<Option<Rc<TableMarker>>>,
    slash: RefCell<Option<Rc<SlashDetector>>>,
}

impl SessionCore {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn plugin_config(&self) -> &PluginConfig {
        &self.plugin_config
    }

    pub fn status(&self) -> SessionStatus {
        self.status.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.status.get() != SessionStatus::Destroyed
    }

    /// Selection snapshot as of the latest update tick.
    pub fn snapshot(&self) -> SelectionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Latest update tick observed by the session.
    pub fn tick(&self) -> u64 {
        self.tick.get()
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn sync(&self) -> &ContentSync {
        &self.sync
    }

    /// Palette commands: the defaults followed by the embedder's own.
    pub fn slash_commands(&self) -> Vec<SlashCommand> {
        let mut commands = default_commands();
        commands.extend(self.extra_slash_commands.iter().cloned());
        commands
    }

    pub fn report_error(&self, error: EditorError) {
        tracing::warn!(session = %self.id, error = %error, "editor error");
        if let Some(on_error) = self.callbacks.on_error.clone() {
            on_error(&error);
        }
    }

    pub(crate) fn set_toolbar(&self, toolbar: Option<Rc<FloatingToolbar>>) {
        *self.toolbar.borrow_mut() = toolbar;
    }

    pub(crate) fn set_block_handle(&self, handle: Option<Rc<BlockHandle>>) {
        *self.block_handle.borrow_mut() = handle;
    }

    pub(crate) fn set_table_marker(&self, marker: Option<Rc<TableMarker>>) {
        *self.table_marker.borrow_mut() = marker;
    }

    pub(crate) fn set_slash(&self, detector: Option<Rc<SlashDetector>>) {
        *self.slash.borrow_mut() = detector;
    }

    fn overlay(&self, kind: OverlayKind) -> Option<Rc<dyn Overlay>> {
        match kind {
            OverlayKind::Toolbar => self
                .toolbar
                .borrow()
                .clone()
                .map(|overlay| overlay as Rc<dyn Overlay>),
            OverlayKind::BlockHandle => self
                .block_handle
                .borrow()
                .clone()
                .map(|overlay| overlay as Rc<dyn Overlay>),
            OverlayKind::TableMarker => self
                .table_marker
                .borrow()
                .clone()
                .map(|overlay| overlay as Rc<dyn Overlay>),
        }
    }

    fn on_update(&self, event: &UpdateEvent) {
        self.tick.set(event.tick);
        if let Ok(snapshot) = self.runtime.read(|state| state.snapshot()) {
            *self.snapshot.borrow_mut() = snapshot;
        }
        match self.sync.outbound(&self.runtime, event) {
            Ok(Some(outbound)) => {
                if let Some(on_input) = self.callbacks.on_input.clone() {
                    on_input(&outbound.value);
                }
                if outbound.changed
                    && let Some(on_change) = self.callbacks.on_change.clone()
                {
                    on_change(&outbound.value);
                }
            }
            Ok(None) => {}
            Err(err) => self.report_error(err.into()),
        }
    }

    fn on_blur(&self) {
        if let Some(on_blur) = self.callbacks.on_blur.clone() {
            on_blur();
        }
    }
}

pub struct SessionBuilder {
    config: EditorConfig,
    surface: Option<Rc<dyn Surface>>,
    clock: Option<Rc<dyn Clock>>,
    plugins: Vec<PluginDescriptor>,
    slash_commands: Vec<SlashCommand>,
    callbacks: Callbacks,
}

impl SessionBuilder {
    pub fn surface(mut self, surface: Rc<dyn Surface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Appends a plugin that registers after the built-ins.
    pub fn plugin(mut self, descriptor: PluginDescriptor) -> Self {
        self.plugins.push(descriptor);
        self
    }

    /// Adds a palette command after the default ones.
    pub fn slash_command(mut self, command: SlashCommand) -> Self {
        self.slash_commands.push(command);
        self
    }

    pub fn on_ready(mut self, callback: impl Fn() + 'static) -> Self {
        self.callbacks.on_ready = Some(Rc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&EditorError) + 'static) -> Self {
        self.callbacks.on_error = Some(Rc::new(callback));
        self
    }

    /// Every content-changing update, with the exported value.
    pub fn on_input(mut self, callback: impl Fn(&ExternalValue) + 'static) -> Self {
        self.callbacks.on_input = Some(Rc::new(callback));
        self
    }

    /// Only when the exported value differs from the last one forwarded.
    pub fn on_change(mut self, callback: impl Fn(&ExternalValue) + 'static) -> Self {
        self.callbacks.on_change = Some(Rc::new(callback));
        self
    }

    pub fn on_blur(mut self, callback: impl Fn() + 'static) -> Self {
        self.callbacks.on_blur = Some(Rc::new(callback));
        self
    }

    /// Creates the runtime and session wiring. Plugins are not registered
    /// until [`Session::start`].
    pub fn build(self) -> Result<Session, MountError> {
        self.config.validate()?;
        let mut registry = PluginRegistry::builtin();
        for descriptor in self.plugins {
            registry.push(descriptor)?;
        }
        let mut runtime_config = RuntimeConfig::new(self.config.namespace.clone());
        runtime_config.editable = self.config.editable;
        let runtime = Runtime::create(runtime_config)?;

        let id = SessionId::new();
        let format = self.config.format;
        let core = Rc::new(SessionCore {
            id,
            runtime,
            plugin_config: self.config.plugin_config(),
            config: self.config,
            sync: ContentSync::new(format),
            watcher: ExternalValueWatcher::new(format),
            clock: self.clock.unwrap_or_else(|| Rc::new(SystemClock)),
            status: Cell::new(SessionStatus::Mounting),
            tick: Cell::new(0),
            snapshot: RefCell::new(SelectionSnapshot::default()),
            callbacks: self.callbacks,
            extra_slash_commands: self.slash_commands,
            plugins: PluginSlots::new(),
            wiring: RefCell::new(Vec::new()),
            toolbar: RefCell::new(None),
            block_handle: RefCell::new(None),
            table_marker: RefCell::new(None),
            slash: RefCell::new(None),
        });
        let session = Session {
            core,
            registry: Rc::new(registry),
        };
        session.wire();
        if let Some(surface) = self.surface {
            session.core.runtime.bind_root(Some(surface));
        }
        tracing::debug!(session = %id, %format, "session created");
        Ok(session)
    }

    /// Builds the session and registers its plugins.
    pub async fn mount(self) -> Result<Session, MountError> {
        let session = self.build()?;
        session.start().await;
        Ok(session)
    }
}

pub struct Session {
    core: Rc<SessionCore>,
    registry: Rc<PluginRegistry>,
}

impl Session {
    pub fn builder(config: EditorConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            surface: None,
            clock: None,
            plugins: Vec::new(),
            slash_commands: Vec::new(),
            callbacks: Callbacks::default(),
        }
    }

    pub async fn mount(config: EditorConfig) -> Result<Session, MountError> {
        Self::builder(config).mount().await
    }

    fn wire(&self) {
        let runtime = &self.core.runtime;
        let session = self.session_ref();
        let on_update = runtime.register_update_listener(move |event| {
            if let Some(core) = session.upgrade() {
                core.on_update(event);
            }
        });
        let session = self.session_ref();
        let on_blur = runtime.register_command_handler(command::BLUR, CommandPriority::Editor, move |_| {
            if let Some(core) = session.upgrade() {
                core.on_blur();
            }
            false
        });
        self.core.wiring.borrow_mut().extend([on_update, on_blur]);
    }

    /// Loads the initial content and registers every enabled plugin. Only
    /// the first call does anything.
    pub async fn start(&self) {
        if self.core.status() != SessionStatus::Mounting {
            return;
        }
        if let Some(initial) = self.core.config.initial_content.clone() {
            let format = self.core.config.format;
            if let Err(err) = self
                .core
                .sync
                .import_content(&self.core.runtime, format, &initial)
                .await
            {
                self.core.report_error(err.into());
            }
        }

        let failures = plugin::mount(
            &self.registry,
            &self.core.plugin_config,
            self.session_ref(),
            &self.core.plugins,
        )
        .await;
        if !self.core.is_mounted() {
            return;
        }
        let status = if failures.is_empty() {
            SessionStatus::Ready
        } else {
            SessionStatus::Degraded
        };
        for (id, source) in failures {
            self.core.report_error(EditorError::Plugin { id, source });
        }
        self.core.status.set(status);
        tracing::debug!(session = %self.core.id, ?status, plugins = ?self.core.plugins.registered(), "session ready");
        if let Some(on_ready) = self.core.callbacks.on_ready.clone() {
            on_ready();
        }
    }

    /// Tears the session down: plugin cleanups in reverse registration
    /// order, then the runtime. Later calls do nothing.
    pub fn unmount(&self) {
        if self.core.status.replace(SessionStatus::Destroyed) == SessionStatus::Destroyed {
            return;
        }
        self.core.plugins.teardown();
        for unregister in self.core.wiring.borrow_mut().drain(..) {
            unregister.unregister();
        }
        self.core.runtime.dispose();
        tracing::debug!(session = %self.core.id, "session unmounted");
    }

    pub fn id(&self) -> SessionId {
        self.core.id
    }

    pub fn session_ref(&self) -> SessionRef {
        SessionRef {
            id: self.core.id,
            core: Rc::downgrade(&self.core),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.core.status()
    }

    pub fn is_mounted(&self) -> bool {
        self.core.is_mounted()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.core.runtime
    }

    pub fn config(&self) -> &EditorConfig {
        &self.core.config
    }

    pub fn format(&self) -> ContentFormat {
        self.core.config.format
    }

    /// Ids of plugins whose registration succeeded and which are still
    /// mounted, in registration order.
    pub fn registered_plugins(&self) -> Vec<String> {
        self.core.plugins.registered()
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        self.core.snapshot()
    }

    pub fn import_count(&self) -> usize {
        self.core.sync.import_count()
    }

    pub async fn get_content(&self) -> Result<ExternalValue, EditorError> {
        self.get_content_as(self.format()).await
    }

    pub async fn get_content_as(&self, format: ContentFormat) -> Result<ExternalValue, EditorError> {
        Ok(self
            .core
            .sync
            .export_content(&self.core.runtime, format)
            .await?)
    }

    /// Replaces the document. A value that fails to parse is reported to
    /// `on_error` and leaves the document untouched.
    pub async fn set_content(&self, value: impl Into<ExternalValue>) -> Result<(), EditorError> {
        if !self.is_mounted() {
            return Ok(());
        }
        let value = value.into();
        let result = self
            .core
            .sync
            .import_content(&self.core.runtime, self.format(), &value)
            .await
            .map_err(EditorError::from);
        if let Err(err) = &result {
            self.core.report_error(err.clone());
        }
        result
    }

    /// Feeds the embedder's current value back in. Values equal to the
    /// current export are skipped.
    pub async fn watch_external_value(
        &self,
        value: impl Into<ExternalValue>,
    ) -> Result<WatchOutcome, EditorError> {
        if !self.is_mounted() {
            return Ok(WatchOutcome::Skipped);
        }
        let value = value.into();
        let result = self
            .core
            .watcher
            .observe(&self.core.sync, &self.core.runtime, &value)
            .await
            .map_err(EditorError::from);
        if let Err(err) = &result {
            self.core.report_error(err.clone());
        }
        result
    }

    pub fn dispatch<P: 'static>(&self, command: crate::runtime::Command<P>, payload: P) -> bool {
        self.core.runtime.dispatch(command, payload)
    }

    pub fn insert_text(&self, text: &str) -> bool {
        self.dispatch(command::INSERT_TEXT, text.to_string())
    }

    pub fn focus(&self) {
        self.core.runtime.focus();
    }

    pub fn blur(&self) {
        self.core.runtime.blur();
    }

    pub fn set_editable(&self, editable: bool) {
        self.core.runtime.set_editable(editable);
    }

    pub fn bind_surface(&self, surface: Option<Rc<dyn Surface>>) {
        self.core.runtime.bind_root(surface);
    }

    pub fn toolbar(&self) -> Option<Rc<FloatingToolbar>> {
        self.core.toolbar.borrow().clone()
    }

    pub fn block_handle(&self) -> Option<Rc<BlockHandle>> {
        self.core.block_handle.borrow().clone()
    }

    pub fn table_marker(&self) -> Option<Rc<TableMarker>> {
        self.core.table_marker.borrow().clone()
    }

    pub fn slash(&self) -> Option<Rc<SlashDetector>> {
        self.core.slash.borrow().clone()
    }

    /// The platform reports a native selection change.
    pub fn native_selection_changed(&self) {
        if let Some(toolbar) = self.toolbar() {
            toolbar.refresh();
        }
    }

    pub fn pointer_move(&self, position: Position) {
        if let Some(handle) = self.block_handle() {
            handle.pointer_move(position);
        }
    }

    pub fn pointer_leave(&self) {
        if let Some(handle) = self.block_handle() {
            handle.pointer_leave();
        }
    }

    pub fn pointer_enter_handle(&self) {
        if let Some(handle) = self.block_handle() {
            handle.pointer_enter_handle();
        }
    }

    pub fn pointer_leave_handle(&self) {
        if let Some(handle) = self.block_handle() {
            handle.pointer_leave_handle();
        }
    }

    pub fn handle_mouse_down(&self) -> PointerOutcome {
        self.block_handle()
            .map_or(PointerOutcome::Default, |handle| handle.mouse_down())
    }

    pub fn pointer_down(&self, target: PointerTarget) -> PointerOutcome {
        self.toolbar()
            .map_or(PointerOutcome::Default, |toolbar| toolbar.pointer_down(target))
    }

    pub fn table_hover(&self, node: NodeKey) {
        if let Some(marker) = self.table_marker() {
            marker.hover(node);
        }
    }

    pub fn context_menu(&self, node: NodeKey) -> bool {
        self.table_marker()
            .is_some_and(|marker| marker.context_menu(node))
    }

    pub fn key_down(&self, key: Key) -> KeyOutcome {
        let command = match key {
            Key::ArrowUp => command::KEY_ARROW_UP,
            Key::ArrowDown => command::KEY_ARROW_DOWN,
            Key::Enter => command::KEY_ENTER,
            Key::Escape => command::KEY_ESCAPE,
        };
        if self.core.runtime.dispatch(command, ()) {
            KeyOutcome::Handled
        } else {
            KeyOutcome::PassThrough
        }
    }

    pub fn set_menu_open(&self, kind: OverlayKind, open: bool) {
        if let Some(overlay) = self.core.overlay(kind) {
            overlay.set_menu_open(open);
        }
    }

    pub fn overlay_state(&self, kind: OverlayKind) -> OverlayState {
        self.core
            .overlay(kind)
            .map_or(OverlayState::HIDDEN, |overlay| overlay.state())
    }

    pub fn overlay_view(&self, kind: OverlayKind) -> OverlayView {
        self.core
            .overlay(kind)
            .map_or(OverlayView::HIDDEN, |overlay| overlay.view())
    }

    pub fn overlay_commands(&self, kind: OverlayKind) -> &'static [MenuCommand] {
        self.core
            .overlay(kind)
            .map(|overlay| overlay.commands())
            .unwrap_or_default()
    }

    pub fn run_overlay_command(&self, kind: OverlayKind, id: &str) -> bool {
        self.core
            .overlay(kind)
            .is_some_and(|overlay| overlay.execute(id))
    }

    pub fn slash_state(&self) -> SlashState {
        self.slash()
            .map_or(SlashState::Inactive, |detector| detector.state())
    }

    pub fn slash_palette(&self) -> Vec<SlashCommand> {
        self.slash().map_or_else(Vec::new, |detector| {
            detector.filtered().into_iter().cloned().collect()
        })
    }

    pub fn run_slash_command(&self, id: &str) -> bool {
        self.slash().is_some_and(|detector| detector.execute(id))
    }

    /// Fires overlay timers that are due at `now`.
    pub fn advance_timers(&self, now: Instant) {
        if !self.is_mounted() {
            return;
        }
        for kind in [OverlayKind::Toolbar, OverlayKind::BlockHandle, OverlayKind::TableMarker] {
            if let Some(overlay) = self.core.overlay(kind) {
                overlay.advance(now);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.core.id)
            .field("status", &self.core.status())
            .field("format", &self.core.config.format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_mount_rejects_bad_config() {
        let mut config = EditorConfig::default();
        config.namespace = String::new();
        let err = block_on(Session::mount(config)).unwrap_err();
        assert_eq!(err, MountError::Config(ConfigError::EmptyNamespace));
        assert_eq!(err.fallback_message(), "The editor could not be loaded.");
    }

    #[test]
    fn test_session_ref_dies_with_unmount() {
        let session = block_on(Session::mount(EditorConfig::default())).unwrap();
        let link = session.session_ref();
        assert!(link.is_mounted());
        assert_eq!(link.id(), session.id());
        session.unmount();
        assert!(!link.is_mounted());
        assert_eq!(session.status(), SessionStatus::Destroyed);
    }

    #[test]
    fn test_session_ref_does_not_keep_session_alive() {
        let session = block_on(Session::mount(EditorConfig::default())).unwrap();
        let link = session.session_ref();
        drop(session);
        assert!(link.upgrade().is_none());
    }

    #[test]
    fn test_initial_content_is_loaded() {
        let config = EditorConfig::default().with_initial_content("# Title\n\nbody");
        let session = block_on(Session::mount(config)).unwrap();
        assert_eq!(
            block_on(session.get_content()).unwrap(),
            ExternalValue::from("# Title\n\nbody")
        );
        assert_eq!(session.status(), SessionStatus::Ready);
    }

    #[test]
    fn test_use_after_unmount_is_silent() {
        let session = block_on(Session::mount(EditorConfig::default())).unwrap();
        session.unmount();
        assert!(!session.insert_text("x"));
        assert_eq!(block_on(session.set_content("# x")), Ok(()));
        assert_eq!(
            block_on(session.watch_external_value("# x")),
            Ok(WatchOutcome::Skipped)
        );
        assert_eq!(session.key_down(Key::Enter), KeyOutcome::PassThrough);
        session.advance_timers(Instant::now());
    }
}
