//! Content synchronization between the live document and its external value.
//!
//! - [`ContentSync::export_content`] serializes inside a read transaction.
//! - [`ContentSync::import_content`] parses into detached shapes first and only
//!   then replaces the whole document in one tagged update, so a malformed
//!   value never leaves a half-cleared document behind.
//! - [`ExternalValueWatcher`] re-imports an external value only when it
//!   differs from the current export (round-trip suppression).
//! - [`ContentSync::outbound`] turns content-dirty update ticks into values
//!   for the embedder's input/change callbacks.

use std::cell::{Cell, OnceCell, RefCell};
use std::rc::Rc;

use crate::format::{ContentFormat, Converter, ExternalValue, ParseError, converter_for};
use crate::runtime::{Runtime, TAG_IMPORT, TransactionError, UpdateEvent};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("failed to parse {format} content: {source}")]
    Parse {
        format: ContentFormat,
        #[source]
        source: ParseError,
    },
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Converters are built on first use and then shared for the session.
#[derive(Default)]
pub struct ConverterRegistry {
    markdown: OnceCell<Rc<dyn Converter>>,
    html: OnceCell<Rc<dyn Converter>>,
    data: OnceCell<Rc<dyn Converter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, format: ContentFormat) -> &OnceCell<Rc<dyn Converter>> {
        match format {
            ContentFormat::Markdown => &self.markdown,
            ContentFormat::Html => &self.html,
            ContentFormat::Data => &self.data,
        }
    }

    pub fn get(&self, format: ContentFormat) -> Rc<dyn Converter> {
        self.cell(format)
            .get_or_init(|| {
                tracing::debug!(%format, "converter loaded");
                Rc::from(converter_for(format))
            })
            .clone()
    }

    /// Suspension point for converters that are loaded on demand.
    pub async fn load(&self, format: ContentFormat) -> Rc<dyn Converter> {
        self.get(format)
    }

    pub fn is_loaded(&self, format: ContentFormat) -> bool {
        self.cell(format).get().is_some()
    }
}

/// Value forwarded to the embedder after a content-dirty tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub value: ExternalValue,
    /// False when the value equals the one forwarded last time.
    pub changed: bool,
}

pub struct ContentSync {
    format: ContentFormat,
    converters: ConverterRegistry,
    imports: Cell<usize>,
    last_forwarded: RefCell<Option<ExternalValue>>,
}

impl ContentSync {
    pub fn new(format: ContentFormat) -> Self {
        Self {
            format,
            converters: ConverterRegistry::new(),
            imports: Cell::new(0),
            last_forwarded: RefCell::new(None),
        }
    }

    /// The session's external value format.
    pub fn format(&self) -> ContentFormat {
        self.format
    }

    /// Number of imports that replaced the document.
    pub fn import_count(&self) -> usize {
        self.imports.get()
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn export_now(
        &self,
        runtime: &Runtime,
        format: ContentFormat,
    ) -> Result<ExternalValue, SyncError> {
        let converter = self.converters.get(format);
        Ok(runtime.read(|state| converter.export(&state.document))?)
    }

    pub async fn export_content(
        &self,
        runtime: &Runtime,
        format: ContentFormat,
    ) -> Result<ExternalValue, SyncError> {
        let converter = self.converters.load(format).await;
        Ok(runtime.read(|state| converter.export(&state.document))?)
    }

    /// Replaces the whole document with `value` parsed as `format`.
    pub async fn import_content(
        &self,
        runtime: &Runtime,
        format: ContentFormat,
        value: &ExternalValue,
    ) -> Result<(), SyncError> {
        let converter = self.converters.load(format).await;
        let blocks = converter
            .import(value)
            .map_err(|source| SyncError::Parse { format, source })?;
        runtime.try_update_tagged(&[TAG_IMPORT], |state| {
            state.document.clear();
            state.document.graft(&blocks);
            state.selection = None;
            Ok(())
        })?;
        self.imports.set(self.imports.get() + 1);
        tracing::debug!(%format, blocks = blocks.len(), "content imported");

        if format == self.format {
            let current = self.export_now(runtime, format)?;
            *self.last_forwarded.borrow_mut() = Some(current);
        }
        Ok(())
    }

    /// Exports after a content-dirty tick. Selection-only ticks and imports
    /// produce nothing.
    pub fn outbound(
        &self,
        runtime: &Runtime,
        event: &UpdateEvent,
    ) -> Result<Option<Outbound>, SyncError> {
        if !event.is_content_dirty() || event.has_tag(TAG_IMPORT) {
            return Ok(None);
        }
        let value = self.export_now(runtime, self.format)?;
        let mut last = self.last_forwarded.borrow_mut();
        let changed = last.as_ref() != Some(&value);
        if changed {
            *last = Some(value.clone());
        }
        Ok(Some(Outbound { value, changed }))
    }

    pub fn last_forwarded(&self) -> Option<ExternalValue> {
        self.last_forwarded.borrow().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The value already matches the document.
    Skipped,
    Imported,
}

/// Feeds external values back into the document without echo re-imports.
#[derive(Debug)]
pub struct ExternalValueWatcher {
    format: ContentFormat,
    skipped: Cell<usize>,
}

impl ExternalValueWatcher {
    pub fn new(format: ContentFormat) -> Self {
        Self {
            format,
            skipped: Cell::new(0),
        }
    }

    pub fn format(&self) -> ContentFormat {
        self.format
    }

    pub fn skipped(&self) -> usize {
        self.skipped.get()
    }

    pub async fn observe(
        &self,
        sync: &ContentSync,
        runtime: &Runtime,
        value: &ExternalValue,
    ) -> Result<WatchOutcome, SyncError> {
        let current = sync.export_content(runtime, self.format).await?;
        if current == *value {
            self.skipped.set(self.skipped.get() + 1);
            tracing::trace!(format = %self.format, "external value matches document, import skipped");
            return Ok(WatchOutcome::Skipped);
        }
        sync.import_content(runtime, self.format, value).await?;
        Ok(WatchOutcome::Imported)
    }
}
