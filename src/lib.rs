//! md-surface: integration core for a rich-text editing surface.
//!
//! The crate sits between an embedding application and a headless document
//! runtime. It provides:
//!
//! - **Runtime** - document state, transactions, a prioritized command bus,
//!   and mutation/update listeners
//! - **Plugins** - declared-order registration with isolated failures and
//!   reverse-order cleanup
//! - **Content sync** - markdown, HTML and structured-data conversion with
//!   round-trip suppression
//! - **Overlays** - state machines for the floating toolbar, the block
//!   handle and the table action marker
//! - **Slash commands** - trigger detection and a filtered command palette
//!
//! # Quick Start
//!
//! ```rust
//! use futures::executor::block_on;
//! use md_surface::{EditorConfig, Session};
//!
//! let session = block_on(Session::mount(
//!     EditorConfig::default().with_initial_content("# Hello\n\nWorld"),
//! ))
//! .unwrap();
//! let content = block_on(session.get_content()).unwrap();
//! assert_eq!(content.as_text(), Some("# Hello\n\nWorld"));
//! ```

pub mod config;

// Document model and editing operations
pub mod doc;

// Markdown, HTML and structured-data converters
pub mod format;

pub mod overlay;

pub mod plugin;

// Headless runtime and command bus
pub mod runtime;

pub mod session;

pub mod slash;

// Content synchronization
pub mod sync;

pub use config::{ConfigError, EditorConfig, OverlayConfig};

pub use doc::{
    Document, EditError, EditorState, NodeKey, NodeKind, Point, Selection, SelectionSnapshot,
    Shape, TextFormat,
};

pub use format::{ContentFormat, Converter, ExternalValue, ParseError};

pub use overlay::{
    BlockHandle, FloatingToolbar, MenuCommand, Overlay, OverlayKind, OverlayPhase, OverlayState,
    OverlayView, PointerOutcome, PointerTarget, TableMarker,
};

pub use plugin::{
    Cleanup, PluginConfig, PluginDescriptor, PluginError, PluginOverrides, PluginRegistry, Preset,
    PresetOrConfig, Registration,
};

pub use runtime::{
    Command, CommandPriority, Runtime, RuntimeConfig, RuntimeError, RuntimeHandle, Surface,
    TransactionError, Unregister, UpdateEvent,
};

pub use session::{
    EditorError, Key, MountError, Session, SessionBuilder, SessionId, SessionRef, SessionStatus,
};

pub use slash::{KeyOutcome, SlashCommand, SlashDetector, SlashState};

pub use sync::{ContentSync, ExternalValueWatcher, SyncError, WatchOutcome};
