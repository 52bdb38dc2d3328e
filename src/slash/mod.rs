//! Slash-trigger detection and the command palette model.
//!
//! Typing the trigger character at the start of a text run, or right after
//! whitespace, activates the palette. While the caret stays in that text
//! node past the trigger, everything between the trigger and the caret is
//! the filter. The palette closes when the caret leaves, on Escape, or once
//! a command runs.
//!
//! Running a command removes the trigger and the filter text in a single
//! transaction, puts the caret where the trigger was, and only then invokes
//! the command, so block conversions apply to a clean block.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use unicode_segmentation::UnicodeSegmentation;

use crate::doc::{EditError, EditorState, NodeKey, char_len};
use crate::runtime::{BlockType, Runtime, TableSize, command};
use crate::session::SessionRef;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SlashState {
    #[default]
    Inactive,
    Active {
        anchor_node: NodeKey,
        /// Char offset of the trigger within `anchor_node`.
        anchor_offset: usize,
        filter_text: String,
    },
}

impl SlashState {
    pub fn is_active(&self) -> bool {
        matches!(self, SlashState::Active { .. })
    }

    pub fn filter_text(&self) -> Option<&str> {
        match self {
            SlashState::Active { filter_text, .. } => Some(filter_text),
            SlashState::Inactive => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The palette consumed the key; the platform must not act on it.
    Handled,
    PassThrough,
}

pub type SlashAction = Rc<dyn Fn(&Runtime) -> bool>;

#[derive(Clone)]
pub struct SlashCommand {
    pub id: String,
    pub label: String,
    pub icon: String,
    pub keywords: Vec<String>,
    action: SlashAction,
}

impl SlashCommand {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        action: impl Fn(&Runtime) -> bool + 'static,
    ) -> Self {
        let id = id.into();
        Self {
            icon: id.clone(),
            id,
            label: label.into(),
            keywords: Vec::new(),
            action: Rc::new(action),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|keyword| keyword.to_string()).collect();
        self
    }

    pub fn run(&self, runtime: &Runtime) -> bool {
        (self.action)(runtime)
    }

    /// Case-insensitive prefix match against the label, its words, and the
    /// keywords' words. An empty query matches everything.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        let label = self.label.to_lowercase();
        label.starts_with(&query)
            || label.unicode_words().any(|word| word.starts_with(&query))
            || self.keywords.iter().any(|keyword| {
                keyword
                    .to_lowercase()
                    .unicode_words()
                    .any(|word| word.starts_with(&query))
            })
    }
}

impl std::fmt::Debug for SlashCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlashCommand")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("keywords", &self.keywords)
            .finish_non_exhaustive()
    }
}

fn set_block(block_type: BlockType) -> impl Fn(&Runtime) -> bool {
    move |runtime| runtime.dispatch(command::SET_BLOCK_TYPE, block_type)
}

pub fn default_commands() -> Vec<SlashCommand> {
    vec![
        SlashCommand::new("paragraph", "Text", set_block(BlockType::Paragraph))
            .with_icon("pilcrow")
            .with_keywords(&["paragraph", "plain"]),
        SlashCommand::new("heading-1", "Heading 1", set_block(BlockType::Heading(1)))
            .with_keywords(&["h1", "title"]),
        SlashCommand::new("heading-2", "Heading 2", set_block(BlockType::Heading(2)))
            .with_keywords(&["h2", "subtitle"]),
        SlashCommand::new("heading-3", "Heading 3", set_block(BlockType::Heading(3)))
            .with_keywords(&["h3"]),
        SlashCommand::new("quote", "Quote", set_block(BlockType::Quote))
            .with_keywords(&["blockquote", "citation"]),
        SlashCommand::new("bulleted-list", "Bulleted list", |runtime: &Runtime| {
            runtime.dispatch(command::INSERT_LIST, false)
        })
        .with_icon("list")
        .with_keywords(&["unordered", "ul", "bullet"]),
        SlashCommand::new("numbered-list", "Numbered list", |runtime: &Runtime| {
            runtime.dispatch(command::INSERT_LIST, true)
        })
        .with_icon("list-numbers")
        .with_keywords(&["ordered", "ol"]),
        SlashCommand::new("code-block", "Code block", set_block(BlockType::Code))
            .with_icon("code")
            .with_keywords(&["code", "pre", "snippet"]),
        SlashCommand::new("table", "Table", |runtime: &Runtime| {
            runtime.dispatch(command::INSERT_TABLE, TableSize::default())
        })
        .with_keywords(&["grid"]),
        SlashCommand::new("divider", "Divider", |runtime: &Runtime| {
            runtime.dispatch(command::INSERT_HORIZONTAL_RULE, ())
        })
        .with_icon("separator")
        .with_keywords(&["hr", "rule", "separator"]),
    ]
}

/// Collapsed caret inside a text node: `(node, offset, chars)`.
fn caret(state: &EditorState) -> Option<(NodeKey, usize, Vec<char>)> {
    let point = state.cursor()?;
    let text = state.document.text(point.key)?;
    Some((point.key, point.offset, text.chars().collect()))
}

pub struct SlashDetector {
    session: RefCell<Option<SessionRef>>,
    trigger: char,
    commands: Vec<SlashCommand>,
    state: RefCell<SlashState>,
    highlighted: Cell<usize>,
}

impl SlashDetector {
    pub fn new(session: Option<SessionRef>, trigger: char, commands: Vec<SlashCommand>) -> Self {
        Self {
            session: RefCell::new(session),
            trigger,
            commands,
            state: RefCell::new(SlashState::Inactive),
            highlighted: Cell::new(0),
        }
    }

    pub fn trigger(&self) -> char {
        self.trigger
    }

    pub fn state(&self) -> SlashState {
        self.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().is_active()
    }

    pub fn commands(&self) -> &[SlashCommand] {
        &self.commands
    }

    /// Commands matching the current filter, in declared order.
    pub fn filtered(&self) -> Vec<&SlashCommand> {
        let state = self.state.borrow();
        let query = state.filter_text().unwrap_or_default();
        self.commands
            .iter()
            .filter(|command| command.matches(query))
            .collect()
    }

    pub fn highlighted(&self) -> usize {
        self.highlighted.get()
    }

    pub fn highlighted_command(&self) -> Option<SlashCommand> {
        self.filtered().get(self.highlighted.get()).map(|command| (*command).clone())
    }

    fn runtime(&self) -> Option<Runtime> {
        let session = self.session.borrow().clone()?;
        Some(session.upgrade()?.runtime().clone())
    }

    fn set_state(&self, next: SlashState) {
        let mut state = self.state.borrow_mut();
        if *state == next {
            return;
        }
        if state.filter_text() != next.filter_text() {
            self.highlighted.set(0);
        }
        match (&*state, &next) {
            (SlashState::Inactive, SlashState::Active { anchor_node, .. }) => {
                tracing::debug!(node = %anchor_node, "slash palette opened");
            }
            (SlashState::Active { .. }, SlashState::Inactive) => {
                tracing::debug!("slash palette closed");
            }
            _ => {}
        }
        *state = next;
    }

    /// Called after text mutations: activates on a freshly typed trigger and
    /// keeps the filter in sync.
    pub fn on_text_change(&self) {
        let Some(runtime) = self.runtime() else {
            self.set_state(SlashState::Inactive);
            return;
        };
        let caret = runtime.read(caret).ok().flatten();
        let next = match caret {
            None => SlashState::Inactive,
            Some(caret) => self.track(&caret).unwrap_or_else(|| self.activate(&caret)),
        };
        self.set_state(next);
    }

    /// Called on selection changes: never activates, only tracks or
    /// dismisses.
    pub fn on_selection_change(&self) {
        if !self.is_active() {
            return;
        }
        let caret = self
            .runtime()
            .and_then(|runtime| runtime.read(caret).ok().flatten());
        let next = caret
            .and_then(|caret| self.track(&caret))
            .unwrap_or(SlashState::Inactive);
        self.set_state(next);
    }

    /// The active state re-derived for `caret`, or `None` when the caret
    /// has left the trigger's node or moved before it.
    fn track(&self, (key, offset, chars): &(NodeKey, usize, Vec<char>)) -> Option<SlashState> {
        let SlashState::Active {
            anchor_node,
            anchor_offset,
            ..
        } = *self.state.borrow()
        else {
            return None;
        };
        let valid = *key == anchor_node
            && *offset > anchor_offset
            && *offset <= chars.len()
            && chars.get(anchor_offset) == Some(&self.trigger);
        valid.then(|| SlashState::Active {
            anchor_node,
            anchor_offset,
            filter_text: chars[anchor_offset + 1..*offset].iter().collect(),
        })
    }

    fn activate(&self, (key, offset, chars): &(NodeKey, usize, Vec<char>)) -> SlashState {
        let Some(trigger_at) = offset.checked_sub(1) else {
            return SlashState::Inactive;
        };
        let typed_trigger = chars.get(trigger_at) == Some(&self.trigger);
        let at_boundary = trigger_at == 0 || chars.get(trigger_at - 1).is_some_and(|c| c.is_whitespace());
        if typed_trigger && at_boundary {
            SlashState::Active {
                anchor_node: *key,
                anchor_offset: trigger_at,
                filter_text: String::new(),
            }
        } else {
            SlashState::Inactive
        }
    }

    /// Moves the highlight within the filtered list, clamping at both ends.
    pub fn move_highlight(&self, delta: isize) -> KeyOutcome {
        if !self.is_active() {
            return KeyOutcome::PassThrough;
        }
        let len = self.filtered().len();
        let current = self.highlighted.get().min(len.saturating_sub(1));
        let next = current.saturating_add_signed(delta).min(len.saturating_sub(1));
        self.highlighted.set(next);
        KeyOutcome::Handled
    }

    /// Enter: runs the highlighted command, or closes an empty palette.
    pub fn confirm(&self) -> KeyOutcome {
        if !self.is_active() {
            return KeyOutcome::PassThrough;
        }
        match self.highlighted_command() {
            Some(command) => {
                self.run(&command);
            }
            None => self.dismiss(),
        }
        KeyOutcome::Handled
    }

    /// Escape.
    pub fn escape(&self) -> KeyOutcome {
        if !self.is_active() {
            return KeyOutcome::PassThrough;
        }
        self.dismiss();
        KeyOutcome::Handled
    }

    pub fn dismiss(&self) {
        self.set_state(SlashState::Inactive);
    }

    /// Runs the palette command `id`. Returns whether it applied.
    pub fn execute(&self, id: &str) -> bool {
        let Some(command) = self.filtered().into_iter().find(|command| command.id == id).cloned() else {
            return false;
        };
        self.run(&command)
    }

    fn run(&self, command: &SlashCommand) -> bool {
        let SlashState::Active {
            anchor_node,
            anchor_offset,
            filter_text,
        } = self.state()
        else {
            return false;
        };
        self.set_state(SlashState::Inactive);
        let Some(runtime) = self.runtime() else {
            return false;
        };
        let removed = 1 + char_len(&filter_text);
        let cleared = runtime.try_update(|state| {
            remove_trigger(state, anchor_node, anchor_offset, anchor_offset + removed)
        });
        if let Err(err) = cleared {
            tracing::warn!(command = %command.id, error = %err, "could not remove slash trigger");
            return false;
        }
        let applied = command.run(&runtime);
        tracing::debug!(command = %command.id, applied, "slash command executed");
        runtime.focus();
        applied
    }

    pub fn teardown(&self) {
        self.set_state(SlashState::Inactive);
        self.session.borrow_mut().take();
    }
}

/// Deletes `[start, end)` of `key` and parks the caret where the trigger
/// was. An emptied text node is removed so the block is left empty.
fn remove_trigger(
    state: &mut EditorState,
    key: NodeKey,
    start: usize,
    end: usize,
) -> Result<(), EditError> {
    state.delete_text(key, start, end)?;
    if state.document.text(key).is_some_and(str::is_empty) {
        let parent = state.document.parent(key).ok_or(EditError::NodeNotFound(key))?;
        let index = state
            .document
            .index_in_parent(key)
            .ok_or(EditError::NodeNotFound(key))?;
        state.document.remove(key)?;
        if matches!(state.document.kind(parent), Some(kind) if kind.holds_inline()) {
            state.set_cursor(parent, index);
        }
        return Ok(());
    }
    state.set_cursor(key, start);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::{Document, NodeKind, Shape};

    fn labels(commands: &[&SlashCommand]) -> Vec<String> {
        commands.iter().map(|command| command.label.clone()).collect()
    }

    #[test]
    fn test_palette_prefix_matching() {
        let detector = SlashDetector::new(None, '/', default_commands());
        *detector.state.borrow_mut() = SlashState::Active {
            anchor_node: NodeKey(1),
            anchor_offset: 0,
            filter_text: "tab".into(),
        };
        assert_eq!(labels(&detector.filtered()), vec!["Table"]);

        *detector.state.borrow_mut() = SlashState::Active {
            anchor_node: NodeKey(1),
            anchor_offset: 0,
            filter_text: "LIST".into(),
        };
        assert_eq!(labels(&detector.filtered()), vec!["Bulleted list", "Numbered list"]);

        *detector.state.borrow_mut() = SlashState::Active {
            anchor_node: NodeKey(1),
            anchor_offset: 0,
            filter_text: "h2".into(),
        };
        assert_eq!(labels(&detector.filtered()), vec!["Heading 2"]);
    }

    #[test]
    fn test_highlight_clamps() {
        let detector = SlashDetector::new(None, '/', default_commands());
        assert_eq!(detector.move_highlight(1), KeyOutcome::PassThrough);
        *detector.state.borrow_mut() = SlashState::Active {
            anchor_node: NodeKey(1),
            anchor_offset: 0,
            filter_text: "list".into(),
        };
        assert_eq!(detector.move_highlight(-1), KeyOutcome::Handled);
        assert_eq!(detector.highlighted(), 0);
        detector.move_highlight(5);
        assert_eq!(detector.highlighted(), 1);
    }

    #[test]
    fn test_activation_rules() {
        let detector = SlashDetector::new(None, '/', Vec::new());
        let key = NodeKey(7);
        let at = |text: &str, offset: usize| (key, offset, text.chars().collect::<Vec<_>>());
        assert!(detector.activate(&at("/", 1)).is_active());
        assert!(detector.activate(&at("see /", 5)).is_active());
        assert!(!detector.activate(&at("a/b", 2)).is_active());
        assert!(!detector.activate(&at("/x", 2)).is_active());
        assert!(!detector.activate(&at("", 0)).is_active());
    }

    #[test]
    fn test_remove_trigger_empties_block() {
        let document = Document::from_blocks(&[Shape::paragraph(vec![Shape::text("/tab")])]);
        let paragraph = document.blocks()[0];
        let text = document.text_nodes_in(paragraph)[0];
        let mut state = EditorState::from_document(document);
        remove_trigger(&mut state, text, 0, 4).unwrap();
        assert!(state.document.children(paragraph).is_empty());
        assert_eq!(state.cursor().map(|point| point.key), Some(paragraph));

        let document = Document::from_blocks(&[Shape::paragraph(vec![Shape::text("go /ta now")])]);
        let text = document.text_nodes_in(NodeKey::ROOT)[0];
        let mut state = EditorState::from_document(document);
        remove_trigger(&mut state, text, 3, 6).unwrap();
        assert_eq!(state.document.text(text), Some("go  now"));
        assert_eq!(state.cursor().map(|point| point.offset), Some(3));
        assert!(matches!(state.document.kind(text), Some(NodeKind::Text { .. })));
    }
}
