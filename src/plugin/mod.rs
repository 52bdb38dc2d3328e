//! Plugin registry and lifecycle.
//!
//! A [`PluginRegistry`] is a per-session value listing descriptors in their
//! declared order. Mounting registers every enabled plugin concurrently but
//! records each cleanup at the plugin's position, so teardown can always run
//! in exact reverse registration order no matter which registration finished
//! first.
//!
//! Failures are isolated: a plugin whose registration fails is reported once
//! and leaves no cleanup behind, while its siblings stay registered.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

use futures::future::{LocalBoxFuture, join_all};
use serde::{Deserialize, Serialize};

use crate::runtime::TransactionError;
use crate::session::SessionRef;

mod builtin;

pub const RICH_TEXT: &str = "rich-text";
pub const HISTORY: &str = "history";
pub const LIST: &str = "list";
pub const TABLE: &str = "table";
pub const MARKDOWN_SHORTCUTS: &str = "markdown-shortcuts";
pub const SLASH_COMMANDS: &str = "slash-commands";
pub const FLOATING_TOOLBAR: &str = "floating-toolbar";
pub const BLOCK_HANDLE: &str = "block-handle";
pub const TABLE_ACTIONS: &str = "table-actions";

/// Declared registration order of the built-in plugins. Later plugins rely
/// on command handlers installed by earlier ones.
pub const BUILTIN_ORDER: [&str; 9] = [
    RICH_TEXT,
    HISTORY,
    LIST,
    TABLE,
    MARKDOWN_SHORTCUTS,
    SLASH_COMMANDS,
    FLOATING_TOOLBAR,
    BLOCK_HANDLE,
    TABLE_ACTIONS,
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    #[error("plugin `{0}` is declared more than once")]
    DuplicateId(String),
    #[error("plugin `{id}` failed to register: {message}")]
    Registration { id: String, message: String },
    #[error("plugin `{id}` cleanup failed: {message}")]
    Cleanup { id: String, message: String },
    #[error("session is no longer mounted")]
    SessionGone,
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Undoes everything a plugin registered.
pub type Cleanup = Box<dyn FnOnce() -> Result<(), PluginError>>;

pub type Registration = LocalBoxFuture<'static, Result<Cleanup, PluginError>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Text editing and history only.
    Minimal,
    /// Lists, tables, shortcuts, and the formatting toolbar on top of minimal.
    #[default]
    Standard,
    /// Every built-in plugin.
    Full,
}

impl Preset {
    pub fn plugin_ids(self) -> &'static [&'static str] {
        match self {
            Preset::Minimal => &[RICH_TEXT, HISTORY],
            Preset::Standard => &[
                RICH_TEXT,
                HISTORY,
                LIST,
                TABLE,
                MARKDOWN_SHORTCUTS,
                FLOATING_TOOLBAR,
            ],
            Preset::Full => &BUILTIN_ORDER,
        }
    }

    pub fn config(self) -> PluginConfig {
        PluginConfig {
            enabled: self.plugin_ids().iter().map(|id| id.to_string()).collect(),
        }
    }
}

/// The set of enabled plugin ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginConfig {
    enabled: BTreeSet<String>,
}

impl PluginConfig {
    pub fn none() -> Self {
        Self {
            enabled: BTreeSet::new(),
        }
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.contains(id)
    }

    pub fn set(&mut self, id: impl Into<String>, enabled: bool) {
        let id = id.into();
        if enabled {
            self.enabled.insert(id);
        } else {
            self.enabled.remove(&id);
        }
    }

    pub fn with(mut self, id: impl Into<String>, enabled: bool) -> Self {
        self.set(id, enabled);
        self
    }

    pub fn enabled_ids(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Preset::default().config()
    }
}

/// Per-plugin switches applied on top of a preset. Keys are plugin ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginOverrides(pub BTreeMap<String, bool>);

impl PluginOverrides {
    pub fn set(mut self, id: impl Into<String>, enabled: bool) -> Self {
        self.0.insert(id.into(), enabled);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetOrConfig {
    Preset(Preset),
    Config(PluginConfig),
    /// A preset adjusted by explicit switches; the switches win.
    Custom {
        preset: Preset,
        overrides: PluginOverrides,
    },
}

/// Pure: the same input always resolves to the same config.
pub fn resolve(input: &PresetOrConfig) -> PluginConfig {
    match input {
        PresetOrConfig::Preset(preset) => preset.config(),
        PresetOrConfig::Config(config) => config.clone(),
        PresetOrConfig::Custom { preset, overrides } => {
            let mut config = preset.config();
            for (id, enabled) in &overrides.0 {
                config.set(id.clone(), *enabled);
            }
            config
        }
    }
}

pub struct PluginDescriptor {
    id: String,
    enabled: Box<dyn Fn(&PluginConfig) -> bool>,
    register: Box<dyn Fn(SessionRef) -> Registration>,
}

impl PluginDescriptor {
    pub fn new(
        id: impl Into<String>,
        enabled: impl Fn(&PluginConfig) -> bool + 'static,
        register: impl Fn(SessionRef) -> Registration + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            enabled: Box::new(enabled),
            register: Box::new(register),
        }
    }

    /// Descriptor enabled whenever its id is in the config.
    pub fn keyed(
        id: impl Into<String>,
        register: impl Fn(SessionRef) -> Registration + 'static,
    ) -> Self {
        let id = id.into();
        let key = id.clone();
        Self::new(id, move |config| config.is_enabled(&key), register)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_enabled(&self, config: &PluginConfig) -> bool {
        (self.enabled)(config)
    }

    pub fn register(&self, session: SessionRef) -> Registration {
        (self.register)(session)
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct PluginRegistry {
    descriptors: Vec<PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new(
        descriptors: impl IntoIterator<Item = PluginDescriptor>,
    ) -> Result<Self, PluginError> {
        let mut registry = Self {
            descriptors: Vec::new(),
        };
        for descriptor in descriptors {
            registry.push(descriptor)?;
        }
        Ok(registry)
    }

    /// The built-in plugins in declared order.
    pub fn builtin() -> Self {
        Self {
            descriptors: builtin::descriptors(),
        }
    }

    /// Appends a descriptor after those already present.
    pub fn push(&mut self, descriptor: PluginDescriptor) -> Result<(), PluginError> {
        if self.contains(descriptor.id()) {
            return Err(PluginError::DuplicateId(descriptor.id));
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.descriptors.iter().any(|descriptor| descriptor.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.descriptors.iter().map(PluginDescriptor::id).collect()
    }

    pub fn enabled<'a>(
        &'a self,
        config: &'a PluginConfig,
    ) -> impl Iterator<Item = &'a PluginDescriptor> + 'a {
        self.descriptors
            .iter()
            .filter(move |descriptor| descriptor.is_enabled(config))
    }
}

struct Slot {
    id: String,
    cleanup: Option<Cleanup>,
}

/// Cleanups recorded at the registering plugin's position.
#[derive(Default)]
pub struct PluginSlots {
    slots: RefCell<Vec<Slot>>,
    torn_down: Cell<bool>,
}

impl PluginSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids whose registration succeeded and whose cleanup is still pending.
    pub fn registered(&self) -> Vec<String> {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| slot.cleanup.is_some())
            .map(|slot| slot.id.clone())
            .collect()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.get()
    }

    fn reserve(&self, ids: Vec<String>) -> usize {
        let mut slots = self.slots.borrow_mut();
        let base = slots.len();
        slots.extend(ids.into_iter().map(|id| Slot { id, cleanup: None }));
        base
    }

    fn fill(&self, index: usize, cleanup: Cleanup) {
        if let Some(slot) = self.slots.borrow_mut().get_mut(index) {
            slot.cleanup = Some(cleanup);
        }
    }

    /// Runs every recorded cleanup in reverse order. Errors are logged and
    /// swallowed; later calls do nothing.
    pub fn teardown(&self) {
        if self.torn_down.replace(true) {
            return;
        }
        let cleanups: Vec<(String, Cleanup)> = self
            .slots
            .borrow_mut()
            .iter_mut()
            .filter_map(|slot| slot.cleanup.take().map(|cleanup| (slot.id.clone(), cleanup)))
            .collect();
        for (id, cleanup) in cleanups.into_iter().rev() {
            run_cleanup(&id, cleanup);
        }
    }
}

fn run_cleanup(id: &str, cleanup: Cleanup) {
    match cleanup() {
        Ok(()) => tracing::trace!(plugin = id, "plugin cleaned up"),
        Err(err) => tracing::warn!(plugin = id, error = %err, "plugin cleanup failed"),
    }
}

/// Registers every enabled plugin of `registry` concurrently. Returns the
/// failed registrations, in declared order.
pub async fn mount(
    registry: &PluginRegistry,
    config: &PluginConfig,
    session: SessionRef,
    slots: &PluginSlots,
) -> Vec<(String, PluginError)> {
    let enabled: Vec<&PluginDescriptor> = registry.enabled(config).collect();
    let base = slots.reserve(enabled.iter().map(|d| d.id.clone()).collect());
    tracing::debug!(session = %session.id(), plugins = enabled.len(), "mounting plugins");

    let registrations = enabled.iter().enumerate().map(|(position, descriptor)| {
        let id = descriptor.id.clone();
        let registration = descriptor.register(session.clone());
        let session = session.clone();
        async move {
            match registration.await {
                Ok(cleanup) if !session.is_mounted() || slots.is_torn_down() => {
                    tracing::debug!(plugin = %id, "registration finished after teardown");
                    run_cleanup(&id, cleanup);
                    None
                }
                Ok(cleanup) => {
                    slots.fill(base + position, cleanup);
                    tracing::debug!(plugin = %id, "plugin registered");
                    None
                }
                Err(err) => {
                    tracing::warn!(plugin = %id, error = %err, "plugin registration failed");
                    Some((id, err))
                }
            }
        }
    });
    join_all(registrations).await.into_iter().flatten().collect()
}
