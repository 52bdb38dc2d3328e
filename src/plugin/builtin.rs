//! Built-in plugins.
//!
//! Each plugin installs command handlers, listeners and state machines on
//! the session's runtime and hands back a cleanup that removes all of them.
//! Handlers hold the runtime weakly so nothing registered keeps it alive.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::{
    BLOCK_HANDLE, Cleanup, FLOATING_TOOLBAR, HISTORY, LIST, MARKDOWN_SHORTCUTS,
    PluginDescriptor, PluginError, RICH_TEXT, Registration, SLASH_COMMANDS, TABLE, TABLE_ACTIONS,
};
use crate::doc::{EditError, EditorState, NodeKey, NodeKind, Shape, char_offset_to_byte};
use crate::overlay::{BlockHandle, FloatingToolbar, Overlay, TableMarker};
use crate::runtime::{
    Command, CommandPriority, Runtime, TAG_HISTORIC, TAG_IMPORT, Unregister, UpdateEvent, command,
};
use crate::session::{SessionCore, SessionRef};
use crate::slash::{KeyOutcome, SlashDetector};

type Install = fn(&SessionCore, &SessionRef) -> Cleanup;

/// Installers keyed by plugin id, in [`BUILTIN_ORDER`](super::BUILTIN_ORDER).
const INSTALLERS: [(&str, Install); 9] = [
    (RICH_TEXT, rich_text),
    (HISTORY, history),
    (LIST, list),
    (TABLE, table),
    (MARKDOWN_SHORTCUTS, markdown_shortcuts),
    (SLASH_COMMANDS, slash_commands),
    (FLOATING_TOOLBAR, floating_toolbar),
    (BLOCK_HANDLE, block_handle),
    (TABLE_ACTIONS, table_actions),
];

/// Descriptors for every built-in plugin, in [`BUILTIN_ORDER`](super::BUILTIN_ORDER).
pub(crate) fn descriptors() -> Vec<PluginDescriptor> {
    INSTALLERS
        .iter()
        .map(|&(id, install)| descriptor(id, install))
        .collect()
}

fn descriptor(id: &'static str, install: Install) -> PluginDescriptor {
    PluginDescriptor::keyed(id, move |session: SessionRef| -> Registration {
        Box::pin(async move {
            let core = session.upgrade().ok_or(PluginError::SessionGone)?;
            Ok(install(&core, &session))
        })
    })
}

fn cleanup(registrations: Vec<Unregister>, teardown: impl FnOnce() + 'static) -> Cleanup {
    Box::new(move || {
        for registration in registrations {
            registration.unregister();
        }
        teardown();
        Ok(())
    })
}

/// Registers an editor-priority handler that applies `edit` in one
/// transaction. Read-only editors and failed edits report "not handled".
fn edit_handler<P: 'static>(
    runtime: &Runtime,
    command: Command<P>,
    edit: impl Fn(&mut EditorState, &P) -> Result<bool, EditError> + 'static,
) -> Unregister {
    let weak = runtime.downgrade();
    runtime.register_command_handler(command, CommandPriority::Editor, move |payload| {
        let Some(runtime) = weak.upgrade() else {
            return false;
        };
        if !runtime.is_editable() {
            return false;
        }
        match runtime.try_update(|state| edit(state, payload)) {
            Ok(applied) => applied,
            Err(err) => {
                tracing::debug!(command = command.name(), error = %err, "edit rejected");
                false
            }
        }
    })
}

fn rich_text(core: &SessionCore, _session: &SessionRef) -> Cleanup {
    let runtime = core.runtime();
    let weak = runtime.downgrade();
    let focus = runtime.register_command_handler(command::FOCUS, CommandPriority::Editor, move |_| {
        if let Some(runtime) = weak.upgrade() {
            let placed = runtime.update(|state| {
                if state.selection.is_none()
                    && let Some(last) = state.document.blocks().last().copied()
                {
                    state.select_end_of(last);
                }
            });
            if let Err(err) = placed {
                tracing::debug!(error = %err, "could not place caret on focus");
            }
        }
        false
    });
    let registrations = vec![
        focus,
        edit_handler(runtime, command::INSERT_TEXT, |state, text: &String| {
            state.insert_text(text).map(|()| true)
        }),
        edit_handler(runtime, command::DELETE_CHARACTER, |state, _| state.delete_backward()),
        edit_handler(runtime, command::INSERT_PARAGRAPH, |state, _| {
            state.insert_paragraph().map(|_| true)
        }),
        edit_handler(runtime, command::INSERT_LINE_BREAK, |state, _| {
            state.insert_line_break().map(|()| true)
        }),
        edit_handler(runtime, command::FORMAT_TEXT, |state, format| state.format_text(*format)),
        edit_handler(runtime, command::SET_BLOCK_TYPE, |state, block_type| {
            state.set_block_type(block_type.to_kind()).map(|()| true)
        }),
        edit_handler(runtime, command::INSERT_HORIZONTAL_RULE, |state, _| {
            insert_horizontal_rule(state).map(|()| true)
        }),
    ];
    cleanup(registrations, || {})
}

/// An empty paragraph at the caret becomes the line after the rule;
/// otherwise a fresh paragraph follows it.
fn insert_horizontal_rule(state: &mut EditorState) -> Result<(), EditError> {
    let empty_paragraph = state
        .selection
        .and_then(|selection| state.document.top_level_block(selection.anchor.key))
        .filter(|block| {
            state.document.kind(*block) == Some(&NodeKind::Paragraph)
                && state.document.text_content(*block).is_empty()
        });
    if let Some(paragraph) = empty_paragraph {
        let rule = state.document.build(&Shape::horizontal_rule());
        state.document.insert_before(paragraph, rule)?;
        state.select_end_of(paragraph);
        return Ok(());
    }
    let rule = state.insert_block_after_anchor(&Shape::horizontal_rule())?;
    let paragraph = state.document.create(NodeKind::Paragraph);
    state.document.insert_after(rule, paragraph)?;
    state.set_cursor(paragraph, 0);
    Ok(())
}

/// Undo and redo stacks of whole editor states.
struct History {
    depth: usize,
    current: RefCell<EditorState>,
    undo: RefCell<VecDeque<EditorState>>,
    redo: RefCell<Vec<EditorState>>,
}

impl History {
    fn new(depth: usize, current: EditorState) -> Self {
        Self {
            depth,
            current: RefCell::new(current),
            undo: RefCell::new(VecDeque::new()),
            redo: RefCell::new(Vec::new()),
        }
    }

    fn record(&self, runtime: &Runtime, event: &UpdateEvent) {
        let Ok(next) = runtime.read(EditorState::clone) else {
            return;
        };
        let previous = self.current.replace(next);
        if event.has_tag(TAG_IMPORT) {
            self.undo.borrow_mut().clear();
            self.redo.borrow_mut().clear();
            return;
        }
        if event.has_tag(TAG_HISTORIC) || !event.is_content_dirty() {
            return;
        }
        self.push_undo(previous);
        self.redo.borrow_mut().clear();
    }

    fn push_undo(&self, state: EditorState) {
        let mut undo = self.undo.borrow_mut();
        undo.push_back(state);
        while undo.len() > self.depth {
            undo.pop_front();
        }
    }

    fn step(&self, runtime: &Runtime, backward: bool) -> bool {
        if !runtime.is_editable() {
            return false;
        }
        let target = if backward {
            self.undo.borrow_mut().pop_back()
        } else {
            self.redo.borrow_mut().pop()
        };
        let Some(target) = target else {
            return false;
        };
        let current = self.current.borrow().clone();
        let restore = target.clone();
        let restored = runtime.try_update_tagged(&[TAG_HISTORIC], move |state| {
            *state = restore;
            Ok(())
        });
        match restored {
            Ok(()) if backward => self.redo.borrow_mut().push(current),
            Ok(()) => self.push_undo(current),
            Err(err) => {
                tracing::debug!(error = %err, backward, "history step rejected");
                if backward {
                    self.undo.borrow_mut().push_back(target);
                } else {
                    self.redo.borrow_mut().push(target);
                }
                return false;
            }
        }
        true
    }
}

fn history(core: &SessionCore, _session: &SessionRef) -> Cleanup {
    let runtime = core.runtime();
    let initial = runtime.read(EditorState::clone).unwrap_or_default();
    let history = Rc::new(History::new(core.config().history_depth, initial));
    let weak = runtime.downgrade();
    let registrations = vec![
        {
            let history = history.clone();
            let weak = weak.clone();
            runtime.register_update_listener(move |event| {
                if let Some(runtime) = weak.upgrade() {
                    history.record(&runtime, event);
                }
            })
        },
        {
            let history = history.clone();
            let weak = weak.clone();
            runtime.register_command_handler(command::UNDO, CommandPriority::Editor, move |_| {
                weak.upgrade()
                    .is_some_and(|runtime| history.step(&runtime, true))
            })
        },
        runtime.register_command_handler(command::REDO, CommandPriority::Editor, move |_| {
            weak.upgrade()
                .is_some_and(|runtime| history.step(&runtime, false))
        }),
    ];
    cleanup(registrations, || {})
}

/// Replaces `block` with a one-item list holding its inline content.
fn wrap_in_list(
    state: &mut EditorState,
    block: NodeKey,
    ordered: bool,
    start: u32,
) -> Result<NodeKey, EditError> {
    let list = state.document.create(NodeKind::List { ordered, start });
    let item = state.document.create(NodeKind::ListItem);
    state.document.append(list, item)?;
    state.document.insert_before(block, list)?;
    for child in state.document.children(block).to_vec() {
        state.document.append(item, child)?;
    }
    state.document.remove(block)?;
    if let Some(selection) = state.selection.as_mut() {
        for point in [&mut selection.anchor, &mut selection.focus] {
            if point.key == block {
                point.key = item;
            }
        }
    }
    Ok(item)
}

fn is_list(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::List { .. })
}

fn insert_list(state: &mut EditorState, ordered: bool) -> Result<bool, EditError> {
    let anchor = state.selection.ok_or(EditError::NoSelection)?.anchor.key;
    if let Some(list) = state.document.find_ancestor(anchor, is_list) {
        let start = match state.document.kind(list) {
            Some(NodeKind::List { start, .. }) => *start,
            _ => 1,
        };
        state.document.set_kind(list, NodeKind::List { ordered, start })?;
        return Ok(true);
    }
    let block = state
        .document
        .top_level_block(anchor)
        .ok_or(EditError::UnsupportedSelection)?;
    match state.document.kind(block) {
        Some(NodeKind::Paragraph | NodeKind::Heading { .. } | NodeKind::Quote) => {
            wrap_in_list(state, block, ordered, 1)?;
            Ok(true)
        }
        _ => Err(EditError::UnsupportedSelection),
    }
}

/// Turns every item of the list around the anchor into a paragraph.
fn remove_list(state: &mut EditorState) -> Result<bool, EditError> {
    let anchor = state.selection.ok_or(EditError::NoSelection)?.anchor.key;
    let list = state
        .document
        .find_ancestor(anchor, is_list)
        .ok_or(EditError::UnsupportedSelection)?;
    for item in state.document.children(list).to_vec() {
        let nested = state
            .document
            .children(item)
            .iter()
            .any(|child| state.document.kind(*child).is_some_and(|kind| !kind.is_inline()));
        if nested {
            return Err(EditError::UnsupportedSelection);
        }
        state.document.set_kind(item, NodeKind::Paragraph)?;
        state.document.insert_before(list, item)?;
    }
    state.document.remove(list)?;
    Ok(true)
}

fn list(core: &SessionCore, _session: &SessionRef) -> Cleanup {
    let runtime = core.runtime();
    let registrations = vec![
        edit_handler(runtime, command::INSERT_LIST, |state, ordered| {
            insert_list(state, *ordered)
        }),
        edit_handler(runtime, command::REMOVE_LIST, |state, _| remove_list(state)),
    ];
    cleanup(registrations, || {})
}

fn table(core: &SessionCore, _session: &SessionRef) -> Cleanup {
    let runtime = core.runtime();
    let registrations = vec![
        edit_handler(runtime, command::INSERT_TABLE, |state, size| {
            state.insert_table(size.rows, size.columns).map(|_| true)
        }),
        edit_handler(runtime, command::INSERT_TABLE_ROW, |state, line| {
            state.insert_table_row(line.cell, line.after).map(|_| true)
        }),
        edit_handler(runtime, command::INSERT_TABLE_COLUMN, |state, line| {
            state.insert_table_column(line.cell, line.after).map(|()| true)
        }),
        edit_handler(runtime, command::DELETE_TABLE_ROW, |state, cell| {
            state.delete_table_row(*cell).map(|()| true)
        }),
        edit_handler(runtime, command::DELETE_TABLE_COLUMN, |state, cell| {
            state.delete_table_column(*cell).map(|()| true)
        }),
        edit_handler(runtime, command::DELETE_TABLE, |state, cell| {
            state.delete_table(*cell).map(|()| true)
        }),
    ];
    cleanup(registrations, || {})
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shortcut {
    Heading(u8),
    Quote,
    List { ordered: bool, start: u32 },
}

fn parse_shortcut(prefix: &str) -> Option<Shortcut> {
    match prefix {
        "# " => Some(Shortcut::Heading(1)),
        "## " => Some(Shortcut::Heading(2)),
        "### " => Some(Shortcut::Heading(3)),
        "> " => Some(Shortcut::Quote),
        "- " | "* " => Some(Shortcut::List {
            ordered: false,
            start: 1,
        }),
        _ => {
            let digits = prefix.strip_suffix(". ")?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            Some(Shortcut::List {
                ordered: true,
                start: digits.parse().ok()?,
            })
        }
    }
}

/// A shortcut typed at the very start of a top-level paragraph:
/// `(paragraph, text node, prefix length, shortcut)`.
fn find_shortcut(state: &EditorState) -> Option<(NodeKey, NodeKey, usize, Shortcut)> {
    let point = state.cursor()?;
    let text = state.document.text(point.key)?;
    let paragraph = state.document.parent(point.key)?;
    if state.document.kind(paragraph) != Some(&NodeKind::Paragraph)
        || state.document.parent(paragraph) != Some(NodeKey::ROOT)
        || state.document.children(paragraph).first() != Some(&point.key)
    {
        return None;
    }
    let end = char_offset_to_byte(text, point.offset)?;
    let shortcut = parse_shortcut(&text[..end])?;
    Some((paragraph, point.key, point.offset, shortcut))
}

fn apply_shortcut(
    state: &mut EditorState,
    (paragraph, text, len, shortcut): (NodeKey, NodeKey, usize, Shortcut),
) -> Result<(), EditError> {
    state.delete_text(text, 0, len)?;
    if state.document.text(text).is_some_and(str::is_empty) {
        state.document.remove(text)?;
        state.set_cursor(paragraph, 0);
    } else {
        state.set_cursor(text, 0);
    }
    match shortcut {
        Shortcut::Heading(level) => state.document.set_kind(paragraph, NodeKind::Heading { level }),
        Shortcut::Quote => state.document.set_kind(paragraph, NodeKind::Quote),
        Shortcut::List { ordered, start } => wrap_in_list(state, paragraph, ordered, start).map(drop),
    }
}

fn markdown_shortcuts(core: &SessionCore, _session: &SessionRef) -> Cleanup {
    let runtime = core.runtime();
    let weak = runtime.downgrade();
    let listener = runtime.register_update_listener(move |event| {
        if !event.is_content_dirty() || event.has_tag(TAG_HISTORIC) || event.has_tag(TAG_IMPORT) {
            return;
        }
        let Some(runtime) = weak.upgrade() else {
            return;
        };
        if !runtime.is_editable() {
            return;
        }
        let Some(found) = runtime.read(find_shortcut).ok().flatten() else {
            return;
        };
        tracing::trace!(shortcut = ?found.3, "markdown shortcut");
        if let Err(err) = runtime.try_update(|state| apply_shortcut(state, found)) {
            tracing::debug!(error = %err, "markdown shortcut rejected");
        }
    });
    cleanup(vec![listener], || {})
}

fn slash_commands(core: &SessionCore, session: &SessionRef) -> Cleanup {
    let runtime = core.runtime();
    let detector = Rc::new(SlashDetector::new(
        Some(session.clone()),
        core.config().slash_trigger,
        core.slash_commands(),
    ));
    let key = |command: Command<()>, run: fn(&SlashDetector) -> KeyOutcome| {
        let detector = detector.clone();
        runtime.register_command_handler(command, CommandPriority::High, move |_| {
            run(&detector) == KeyOutcome::Handled
        })
    };
    let registrations = vec![
        key(command::KEY_ARROW_UP, |detector| detector.move_highlight(-1)),
        key(command::KEY_ARROW_DOWN, |detector| detector.move_highlight(1)),
        key(command::KEY_ENTER, SlashDetector::confirm),
        key(command::KEY_ESCAPE, SlashDetector::escape),
        {
            let detector = detector.clone();
            runtime.register_mutation_observer("text", move |_| detector.on_text_change())
        },
        {
            let detector = detector.clone();
            runtime.register_command_handler(
                command::SELECTION_CHANGE,
                CommandPriority::Editor,
                move |_| {
                    detector.on_selection_change();
                    false
                },
            )
        },
    ];
    core.set_slash(Some(detector.clone()));
    let session = session.clone();
    cleanup(registrations, move || {
        detector.teardown();
        if let Some(core) = session.core() {
            core.set_slash(None);
        }
    })
}

fn floating_toolbar(core: &SessionCore, session: &SessionRef) -> Cleanup {
    let runtime = core.runtime();
    let toolbar = Rc::new(FloatingToolbar::new(Some(session.clone())));
    let registrations = vec![
        {
            let toolbar = toolbar.clone();
            runtime.register_update_listener(move |_| toolbar.refresh())
        },
        {
            let toolbar = toolbar.clone();
            runtime.register_command_handler(
                command::SELECTION_CHANGE,
                CommandPriority::Editor,
                move |_| {
                    toolbar.refresh();
                    false
                },
            )
        },
        {
            let toolbar = toolbar.clone();
            runtime.register_command_handler(command::KEY_ESCAPE, CommandPriority::Low, move |_| {
                toolbar.escape()
            })
        },
    ];
    core.set_toolbar(Some(toolbar.clone()));
    let session = session.clone();
    cleanup(registrations, move || {
        toolbar.teardown();
        if let Some(core) = session.core() {
            core.set_toolbar(None);
        }
    })
}

fn block_handle(core: &SessionCore, session: &SessionRef) -> Cleanup {
    let runtime = core.runtime();
    let handle = Rc::new(BlockHandle::new(Some(session.clone())));
    let listener = {
        let handle = handle.clone();
        runtime.register_update_listener(move |_| handle.follow_cursor())
    };
    core.set_block_handle(Some(handle.clone()));
    let session = session.clone();
    cleanup(vec![listener], move || {
        handle.teardown();
        if let Some(core) = session.core() {
            core.set_block_handle(None);
        }
    })
}

fn table_actions(core: &SessionCore, session: &SessionRef) -> Cleanup {
    let runtime = core.runtime();
    let marker = Rc::new(TableMarker::new(Some(session.clone())));
    let listener = {
        let marker = marker.clone();
        runtime.register_update_listener(move |_| marker.refresh())
    };
    core.set_table_marker(Some(marker.clone()));
    let session = session.clone();
    cleanup(vec![listener], move || {
        marker.teardown();
        if let Some(core) = session.core() {
            core.set_table_marker(None);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::{Document, Selection};
    use crate::plugin::BUILTIN_ORDER;

    fn state_with(blocks: &[Shape]) -> EditorState {
        EditorState::from_document(Document::from_blocks(blocks))
    }

    #[test]
    fn test_descriptors_follow_declared_order() {
        let ids: Vec<String> = descriptors().iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, BUILTIN_ORDER);
    }

    #[test]
    fn test_each_builtin_has_one_installer() {
        let mut ids: Vec<&str> = INSTALLERS.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids.last(), Some(&TABLE_ACTIONS));
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), BUILTIN_ORDER.len());
    }

    #[test]
    fn test_parse_shortcut() {
        assert_eq!(parse_shortcut("## "), Some(Shortcut::Heading(2)));
        assert_eq!(parse_shortcut("> "), Some(Shortcut::Quote));
        assert_eq!(
            parse_shortcut("12. "),
            Some(Shortcut::List {
                ordered: true,
                start: 12
            })
        );
        assert_eq!(parse_shortcut("#### "), None);
        assert_eq!(parse_shortcut(". "), None);
        assert_eq!(parse_shortcut("a. "), None);
        assert_eq!(parse_shortcut("#"), None);
    }

    #[test]
    fn test_shortcut_only_at_paragraph_start() {
        let mut state = state_with(&[Shape::paragraph(vec![Shape::text("# title")])]);
        let text = state.document.text_nodes_in(state.document.blocks()[0])[0];
        state.set_cursor(text, 2);
        let found = find_shortcut(&state).unwrap();
        assert_eq!(found.3, Shortcut::Heading(1));
        apply_shortcut(&mut state, found).unwrap();
        assert_eq!(
            state.document.block_shapes(),
            vec![Shape::heading(1, vec![Shape::text("title")])]
        );

        state.set_cursor(text, 5);
        assert!(find_shortcut(&state).is_none());
    }

    #[test]
    fn test_list_shortcut_wraps_paragraph() {
        let mut state = state_with(&[Shape::paragraph(vec![Shape::text("- ")])]);
        let block = state.document.blocks()[0];
        let text = state.document.text_nodes_in(block)[0];
        state.set_cursor(text, 2);
        let found = find_shortcut(&state).unwrap();
        apply_shortcut(&mut state, found).unwrap();
        let list = state.document.blocks()[0];
        let item = state.document.children(list)[0];
        assert_eq!(
            state.document.kind(list),
            Some(&NodeKind::List {
                ordered: false,
                start: 1
            })
        );
        assert_eq!(state.selection, Some(Selection::collapsed(crate::doc::Point::new(item, 0))));
    }

    #[test]
    fn test_insert_and_remove_list() {
        let mut state = state_with(&[
            Shape::paragraph(vec![Shape::text("one")]),
            Shape::paragraph(vec![Shape::text("two")]),
        ]);
        let text = state.document.text_nodes_in(state.document.blocks()[0])[0];
        state.set_cursor(text, 1);
        assert_eq!(insert_list(&mut state, true), Ok(true));
        assert_eq!(
            state.document.block_shapes()[0],
            Shape::list(true, vec![Shape::list_item(vec![Shape::text("one")])])
        );
        assert_eq!(insert_list(&mut state, false), Ok(true));
        assert_eq!(
            state.document.block_shapes()[0],
            Shape::list(false, vec![Shape::list_item(vec![Shape::text("one")])])
        );
        assert_eq!(remove_list(&mut state), Ok(true));
        assert_eq!(
            state.document.block_shapes(),
            vec![
                Shape::paragraph(vec![Shape::text("one")]),
                Shape::paragraph(vec![Shape::text("two")]),
            ]
        );
    }

    #[test]
    fn test_rule_reuses_empty_paragraph() {
        let mut state = state_with(&[Shape::paragraph(vec![])]);
        let block = state.document.blocks()[0];
        state.set_cursor(block, 0);
        insert_horizontal_rule(&mut state).unwrap();
        assert_eq!(
            state.document.block_shapes(),
            vec![Shape::horizontal_rule(), Shape::paragraph(vec![])]
        );
        assert_eq!(state.cursor().map(|point| point.key), Some(block));
    }

    #[test]
    fn test_history_depth_is_bounded() {
        let history = History::new(2, EditorState::new());
        for _ in 0..5 {
            history.push_undo(EditorState::new());
        }
        assert_eq!(history.undo.borrow().len(), 2);
    }
}
