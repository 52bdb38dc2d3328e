//! Headless document runtime.
//!
//! [`Runtime`] owns an [`EditorState`] and exposes the collaborator interface
//! the integration layer is written against:
//!
//! - a typed command bus with priorities ([`Command`], [`CommandPriority`])
//! - read and mutate transactions ([`Runtime::read`], [`Runtime::update`])
//! - mutation observers per node type and update listeners, notified after
//!   every committed update with a monotonically increasing tick
//! - root binding ([`Surface`]), editability, and focus
//!
//! The runtime is single-threaded. Notifications are delivered synchronously
//! in subscription order; an update requested while notifications are being
//! delivered is applied at once but its notification is queued behind the
//! current one, so no tick is ever re-dispatched reentrantly.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::{Rc, Weak};

use crate::doc::{BASELINE_NODE_TYPES, EditError, EditorState, NodeKey};

pub mod command;
pub mod surface;

pub use command::{BlockType, Command, CommandPriority, TableLine, TableSize};
pub use surface::{NativeSelection, Position, Rect, ScrollContainer, Surface};

/// Tag carried by the notification that follows a root (re)binding.
pub const TAG_ROOT_CHANGED: &str = "root-changed";
/// Tag carried by full-document replacements from content import.
pub const TAG_IMPORT: &str = "import";
/// Tag carried by undo/redo restorations.
pub const TAG_HISTORIC: &str = "historic";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub namespace: String,
    pub editable: bool,
    pub nodes: Vec<String>,
}

impl RuntimeConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            editable: true,
            nodes: BASELINE_NODE_TYPES.iter().map(|name| name.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime namespace must not be empty")]
    EmptyNamespace,
    #[error("unknown node type `{0}`")]
    UnknownNodeType(String),
    #[error("node type `{0}` registered twice")]
    DuplicateNodeType(String),
    #[error("baseline node type `{0}` is not registered")]
    MissingBaseline(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("mutating update requested inside a read transaction")]
    NestedUpdate,
    #[error("runtime is busy with another update")]
    Busy,
    #[error("node type `{0}` is not registered with this runtime")]
    UnregisteredNode(String),
    #[error("runtime has been disposed")]
    Disposed,
    #[error(transparent)]
    Edit(#[from] EditError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Created,
    Updated,
    Destroyed,
}

/// Mutations of one node type within a single update.
pub type MutationSet = BTreeMap<NodeKey, Mutation>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub tick: u64,
    pub dirty_elements: BTreeSet<NodeKey>,
    pub dirty_leaves: BTreeSet<NodeKey>,
    pub selection_changed: bool,
    pub tags: Vec<&'static str>,
}

impl UpdateEvent {
    /// True when the update touched the tree rather than only the selection.
    pub fn is_content_dirty(&self) -> bool {
        !self.dirty_elements.is_empty() || !self.dirty_leaves.is_empty()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag)
    }
}

/// Detaches a handler, observer, or listener. Dropping it without calling
/// [`Unregister::unregister`] leaves the registration in place.
#[must_use = "keep the Unregister to detach the registration later"]
pub struct Unregister(Option<Box<dyn FnOnce()>>);

impl Unregister {
    fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    pub fn noop() -> Self {
        Self(None)
    }

    pub fn unregister(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl std::fmt::Debug for Unregister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Unregister").field(&self.0.is_some()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Reading(u32),
    Updating,
}

type ErasedHandler = Rc<dyn Fn(&dyn Any) -> bool>;

struct HandlerEntry {
    id: u64,
    command: &'static str,
    priority: CommandPriority,
    handler: ErasedHandler,
}

struct ObserverEntry {
    id: u64,
    kind: String,
    callback: Rc<dyn Fn(&MutationSet)>,
}

struct ListenerEntry {
    id: u64,
    callback: Rc<dyn Fn(&UpdateEvent)>,
}

struct Notification {
    event: UpdateEvent,
    mutations: BTreeMap<&'static str, MutationSet>,
}

struct Inner {
    namespace: String,
    nodes: BTreeSet<String>,
    state: RefCell<EditorState>,
    phase: Cell<Phase>,
    tick: Cell<u64>,
    editable: Cell<bool>,
    focused: Cell<bool>,
    disposed: Cell<bool>,
    root: RefCell<Option<Rc<dyn Surface>>>,
    next_id: Cell<u64>,
    handlers: RefCell<Vec<HandlerEntry>>,
    observers: RefCell<Vec<ObserverEntry>>,
    listeners: RefCell<Vec<ListenerEntry>>,
    delivering: Cell<bool>,
    queue: RefCell<VecDeque<Notification>>,
}

impl Inner {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

/// Cheaply clonable handle to one runtime instance.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<Inner>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("namespace", &self.inner.namespace)
            .field("tick", &self.inner.tick.get())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

impl Runtime {
    pub fn create(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        if config.namespace.trim().is_empty() {
            return Err(RuntimeError::EmptyNamespace);
        }
        let mut nodes = BTreeSet::new();
        for name in config.nodes {
            if !BASELINE_NODE_TYPES.contains(&name.as_str()) {
                return Err(RuntimeError::UnknownNodeType(name));
            }
            if nodes.contains(&name) {
                return Err(RuntimeError::DuplicateNodeType(name));
            }
            nodes.insert(name);
        }
        if let Some(missing) = ["root", "paragraph", "text"]
            .iter()
            .find(|name| !nodes.contains(**name))
        {
            return Err(RuntimeError::MissingBaseline(missing.to_string()));
        }

        tracing::debug!(namespace = %config.namespace, "runtime created");
        Ok(Self {
            inner: Rc::new(Inner {
                namespace: config.namespace,
                nodes,
                state: RefCell::new(EditorState::new()),
                phase: Cell::new(Phase::Idle),
                tick: Cell::new(0),
                editable: Cell::new(config.editable),
                focused: Cell::new(false),
                disposed: Cell::new(false),
                root: RefCell::new(None),
                next_id: Cell::new(1),
                handlers: RefCell::new(Vec::new()),
                observers: RefCell::new(Vec::new()),
                listeners: RefCell::new(Vec::new()),
                delivering: Cell::new(false),
                queue: RefCell::new(VecDeque::new()),
            }),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Number of committed updates so far.
    pub fn tick(&self) -> u64 {
        self.inner.tick.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn is_registered(&self, node_type: &str) -> bool {
        self.inner.nodes.contains(node_type)
    }

    /// Read-only transaction. Reads may nest; reading during an update fails.
    pub fn read<R>(&self, f: impl FnOnce(&EditorState) -> R) -> Result<R, TransactionError> {
        let depth = match self.inner.phase.get() {
            Phase::Updating => return Err(TransactionError::Busy),
            Phase::Reading(depth) => depth,
            Phase::Idle => 0,
        };
        self.inner.phase.set(Phase::Reading(depth + 1));
        let result = {
            let state = self.inner.state.borrow();
            f(&state)
        };
        self.inner.phase.set(if depth == 0 {
            Phase::Idle
        } else {
            Phase::Reading(depth)
        });
        Ok(result)
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut EditorState) -> R) -> Result<R, TransactionError> {
        self.try_update_tagged(&[], |state| Ok(f(state)))
    }

    /// Mutating transaction that rolls back when `f` fails.
    pub fn try_update<R>(
        &self,
        f: impl FnOnce(&mut EditorState) -> Result<R, EditError>,
    ) -> Result<R, TransactionError> {
        self.try_update_tagged(&[], f)
    }

    pub fn try_update_tagged<R>(
        &self,
        tags: &[&'static str],
        f: impl FnOnce(&mut EditorState) -> Result<R, EditError>,
    ) -> Result<R, TransactionError> {
        let inner = &self.inner;
        if inner.disposed.get() {
            return Err(TransactionError::Disposed);
        }
        match inner.phase.get() {
            Phase::Reading(_) => return Err(TransactionError::NestedUpdate),
            Phase::Updating => return Err(TransactionError::Busy),
            Phase::Idle => {}
        }

        inner.phase.set(Phase::Updating);
        let outcome = {
            let mut state = inner.state.borrow_mut();
            let before = state.clone();
            match f(&mut state) {
                Ok(value) => {
                    let unregistered = state
                        .document
                        .type_names()
                        .find(|name| !inner.nodes.contains(*name));
                    match unregistered {
                        Some(name) => {
                            *state = before;
                            Err(TransactionError::UnregisteredNode(name.to_string()))
                        }
                        None => {
                            state.repair_selection();
                            Ok((value, diff(&before, &state)))
                        }
                    }
                }
                Err(err) => {
                    *state = before;
                    Err(TransactionError::Edit(err))
                }
            }
        };
        inner.phase.set(Phase::Idle);

        let (value, change) = outcome?;
        if let Some(mut notification) = change {
            notification.event.tags = tags.to_vec();
            self.commit(notification);
        }
        Ok(value)
    }

    fn commit(&self, mut notification: Notification) {
        let tick = self.inner.tick.get() + 1;
        self.inner.tick.set(tick);
        notification.event.tick = tick;
        tracing::trace!(
            tick,
            elements = notification.event.dirty_elements.len(),
            leaves = notification.event.dirty_leaves.len(),
            "update committed"
        );
        self.inner.queue.borrow_mut().push_back(notification);
        self.flush();
    }

    fn flush(&self) {
        if self.inner.delivering.replace(true) {
            return;
        }
        loop {
            let next = self.inner.queue.borrow_mut().pop_front();
            let Some(notification) = next else {
                break;
            };
            self.deliver(&notification);
        }
        self.inner.delivering.set(false);
    }

    fn deliver(&self, notification: &Notification) {
        for (kind, mutations) in &notification.mutations {
            let observers: Vec<(u64, Rc<dyn Fn(&MutationSet)>)> = self
                .inner
                .observers
                .borrow()
                .iter()
                .filter(|entry| entry.kind == *kind)
                .map(|entry| (entry.id, entry.callback.clone()))
                .collect();
            for (id, callback) in observers {
                if self.observer_alive(id) {
                    callback(mutations);
                }
            }
        }

        let listeners: Vec<(u64, Rc<dyn Fn(&UpdateEvent)>)> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|entry| (entry.id, entry.callback.clone()))
            .collect();
        for (id, callback) in listeners {
            if self.listener_alive(id) {
                callback(&notification.event);
            }
        }

        if notification.event.selection_changed {
            self.dispatch(command::SELECTION_CHANGE, ());
        }
    }

    fn observer_alive(&self, id: u64) -> bool {
        self.inner.observers.borrow().iter().any(|entry| entry.id == id)
    }

    fn listener_alive(&self, id: u64) -> bool {
        self.inner.listeners.borrow().iter().any(|entry| entry.id == id)
    }

    fn handler_alive(&self, id: u64) -> bool {
        self.inner.handlers.borrow().iter().any(|entry| entry.id == id)
    }

    /// Runs handlers for `command` until one reports it handled the payload.
    pub fn dispatch<P: 'static>(&self, command: Command<P>, payload: P) -> bool {
        if self.inner.disposed.get() {
            return false;
        }
        let mut handlers: Vec<(u64, CommandPriority, ErasedHandler)> = self
            .inner
            .handlers
            .borrow()
            .iter()
            .filter(|entry| entry.command == command.name())
            .map(|entry| (entry.id, entry.priority, entry.handler.clone()))
            .collect();
        // Stable sort keeps registration order within a priority.
        handlers.sort_by(|a, b| b.1.cmp(&a.1));
        for (id, _, handler) in handlers {
            if self.handler_alive(id) && handler(&payload) {
                tracing::trace!(command = command.name(), "command handled");
                return true;
            }
        }
        false
    }

    pub fn has_handler<P>(&self, command: Command<P>) -> bool {
        self.inner
            .handlers
            .borrow()
            .iter()
            .any(|entry| entry.command == command.name())
    }

    pub fn register_command_handler<P: 'static>(
        &self,
        command: Command<P>,
        priority: CommandPriority,
        handler: impl Fn(&P) -> bool + 'static,
    ) -> Unregister {
        if self.inner.disposed.get() {
            return Unregister::noop();
        }
        let id = self.inner.next_id();
        let erased: ErasedHandler = Rc::new(move |payload: &dyn Any| {
            payload
                .downcast_ref::<P>()
                .is_some_and(|payload| handler(payload))
        });
        self.inner.handlers.borrow_mut().push(HandlerEntry {
            id,
            command: command.name(),
            priority,
            handler: erased,
        });
        let weak = Rc::downgrade(&self.inner);
        Unregister::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handlers.borrow_mut().retain(|entry| entry.id != id);
            }
        })
    }

    pub fn register_mutation_observer(
        &self,
        node_type: &str,
        callback: impl Fn(&MutationSet) + 'static,
    ) -> Unregister {
        if self.inner.disposed.get() {
            return Unregister::noop();
        }
        let id = self.inner.next_id();
        self.inner.observers.borrow_mut().push(ObserverEntry {
            id,
            kind: node_type.to_string(),
            callback: Rc::new(callback),
        });
        let weak = Rc::downgrade(&self.inner);
        Unregister::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.observers.borrow_mut().retain(|entry| entry.id != id);
            }
        })
    }

    pub fn register_update_listener(&self, callback: impl Fn(&UpdateEvent) + 'static) -> Unregister {
        if self.inner.disposed.get() {
            return Unregister::noop();
        }
        let id = self.inner.next_id();
        self.inner.listeners.borrow_mut().push(ListenerEntry {
            id,
            callback: Rc::new(callback),
        });
        let weak = Rc::downgrade(&self.inner);
        Unregister::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|entry| entry.id != id);
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len() + self.inner.observers.borrow().len()
    }

    /// Binds (or unbinds) the editing root and notifies listeners.
    pub fn bind_root(&self, root: Option<Rc<dyn Surface>>) {
        if self.inner.disposed.get() {
            return;
        }
        *self.inner.root.borrow_mut() = root;
        self.commit(Notification {
            event: UpdateEvent {
                tick: 0,
                dirty_elements: BTreeSet::new(),
                dirty_leaves: BTreeSet::new(),
                selection_changed: false,
                tags: vec![TAG_ROOT_CHANGED],
            },
            mutations: BTreeMap::new(),
        });
    }

    pub fn root(&self) -> Option<Rc<dyn Surface>> {
        self.inner.root.borrow().clone()
    }

    pub fn set_editable(&self, editable: bool) {
        self.inner.editable.set(editable);
    }

    pub fn is_editable(&self) -> bool {
        self.inner.editable.get()
    }

    pub fn focus(&self) {
        if self.inner.disposed.get() {
            return;
        }
        self.inner.focused.set(true);
        self.dispatch(command::FOCUS, ());
    }

    pub fn blur(&self) {
        if self.inner.disposed.get() || !self.inner.focused.replace(false) {
            return;
        }
        self.dispatch(command::BLUR, ());
    }

    pub fn is_focused(&self) -> bool {
        self.inner.focused.get()
    }

    /// Drops every registration and the root. Later calls become no-ops.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.handlers.borrow_mut().clear();
        self.inner.observers.borrow_mut().clear();
        self.inner.listeners.borrow_mut().clear();
        self.inner.queue.borrow_mut().clear();
        *self.inner.root.borrow_mut() = None;
        self.inner.focused.set(false);
        tracing::debug!(namespace = %self.inner.namespace, "runtime disposed");
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

/// Handle passed to menu and palette actions.
pub type RuntimeHandle = Runtime;

#[derive(Clone)]
pub struct WeakRuntime {
    inner: Weak<Inner>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

fn diff(before: &EditorState, after: &EditorState) -> Option<Notification> {
    let mut dirty_elements = BTreeSet::new();
    let mut dirty_leaves = BTreeSet::new();
    let mut mutations: BTreeMap<&'static str, MutationSet> = BTreeMap::new();

    for node in after.document.nodes() {
        let mutation = match before.document.get(node.key) {
            None => Mutation::Created,
            Some(previous) if previous != node => Mutation::Updated,
            Some(_) => continue,
        };
        if node.kind.is_leaf() {
            dirty_leaves.insert(node.key);
        } else {
            dirty_elements.insert(node.key);
        }
        mutations
            .entry(node.kind.type_name())
            .or_default()
            .insert(node.key, mutation);
    }
    for node in before.document.nodes() {
        if after.document.contains(node.key) {
            continue;
        }
        if node.kind.is_leaf() {
            dirty_leaves.insert(node.key);
        } else {
            dirty_elements.insert(node.key);
        }
        mutations
            .entry(node.kind.type_name())
            .or_default()
            .insert(node.key, Mutation::Destroyed);
    }

    let selection_changed = before.selection != after.selection;
    if dirty_elements.is_empty() && dirty_leaves.is_empty() && !selection_changed {
        return None;
    }
    Some(Notification {
        event: UpdateEvent {
            tick: 0,
            dirty_elements,
            dirty_leaves,
            selection_changed,
            tags: Vec::new(),
        },
        mutations,
    })
}
