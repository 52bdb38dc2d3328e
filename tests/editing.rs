use md_surface::runtime::command;
use md_surface::session::Key;
use md_surface::slash::{KeyOutcome, SlashState};
use md_surface::{EditorConfig, NodeKind, Preset, Shape};
mod common;

use common::Harness;

fn full() -> Harness {
    Harness::mount(EditorConfig::default().with_preset(Preset::Full))
}

/// Starts from a single empty paragraph holding the caret.
fn blank() -> Harness {
    let h = full();
    h.session
        .runtime()
        .update(|state| {
            let keys = state.document.graft(&[Shape::paragraph(vec![])]);
            state.set_cursor(keys[0], 0);
        })
        .unwrap();
    h
}

fn type_chars(h: &Harness, text: &str) {
    for c in text.chars() {
        assert!(h.session.insert_text(&c.to_string()), "typing {c:?}");
    }
}

fn filter(h: &Harness) -> Option<String> {
    h.session.slash_state().filter_text().map(str::to_string)
}

#[test]
fn test_slash_filters_and_runs_table_once() {
    let h = blank();
    type_chars(&h, "/");
    assert_eq!(filter(&h).as_deref(), Some(""));
    type_chars(&h, "tab");
    assert_eq!(filter(&h).as_deref(), Some("tab"));
    let palette: Vec<String> = h.session.slash_palette().into_iter().map(|c| c.label).collect();
    assert_eq!(palette, vec!["Table"]);

    assert_eq!(h.session.key_down(Key::Enter), KeyOutcome::Handled);
    assert_eq!(h.session.slash_state(), SlashState::Inactive);
    let blocks = h
        .session
        .runtime()
        .read(|state| state.document.block_shapes())
        .unwrap();
    let tables = blocks
        .iter()
        .filter(|block| block.kind == NodeKind::Table)
        .count();
    assert_eq!(tables, 1);
    assert!(!h.markdown().contains("/tab"));
    assert!(h.session.runtime().is_focused());
}

#[test]
fn test_slash_needs_word_boundary() {
    let h = blank();
    type_chars(&h, "a/");
    assert!(!h.session.slash_state().is_active());
    type_chars(&h, " /");
    assert!(h.session.slash_state().is_active());
}

#[test]
fn test_slash_keys_pass_through_when_inactive() {
    let h = blank();
    type_chars(&h, "plain");
    assert_eq!(h.session.key_down(Key::ArrowDown), KeyOutcome::PassThrough);
    assert_eq!(h.session.key_down(Key::Enter), KeyOutcome::PassThrough);
}

#[test]
fn test_slash_highlight_and_escape() {
    let h = blank();
    type_chars(&h, "/list");
    let slash = h.session.slash().unwrap();
    assert_eq!(h.session.key_down(Key::ArrowDown), KeyOutcome::Handled);
    assert_eq!(slash.highlighted(), 1);
    assert_eq!(h.session.key_down(Key::ArrowDown), KeyOutcome::Handled);
    assert_eq!(slash.highlighted(), 1);
    assert_eq!(h.session.key_down(Key::ArrowUp), KeyOutcome::Handled);
    assert_eq!(slash.highlighted(), 0);

    assert_eq!(h.session.key_down(Key::Escape), KeyOutcome::Handled);
    assert!(!h.session.slash_state().is_active());
    assert_eq!(h.markdown(), "/list");
}

#[test]
fn test_moving_caret_away_dismisses_palette() {
    let h = blank();
    type_chars(&h, "ab /he");
    assert_eq!(filter(&h).as_deref(), Some("he"));
    let text = h.text_in(0);
    h.place_cursor(text, 1);
    assert!(!h.session.slash_state().is_active());
}

#[test]
fn test_slash_divider_replaces_trigger_line() {
    let h = blank();
    type_chars(&h, "/div");
    assert!(h.session.run_slash_command("divider"));
    let blocks = h
        .session
        .runtime()
        .read(|state| state.document.block_shapes())
        .unwrap();
    assert_eq!(blocks, vec![Shape::horizontal_rule(), Shape::paragraph(vec![])]);
}

#[test]
fn test_custom_slash_command_is_offered() {
    let surface = common::FakeSurface::new();
    let session = futures::executor::block_on(
        md_surface::Session::builder(EditorConfig::default().with_preset(Preset::Full))
            .surface(surface)
            .slash_command(md_surface::SlashCommand::new("today", "Insert date", |runtime: &md_surface::Runtime| {
                runtime.dispatch(command::INSERT_TEXT, "2024-01-01".to_string())
            }))
            .mount(),
    )
    .unwrap();
    session
        .runtime()
        .update(|state| {
            let keys = state.document.graft(&[Shape::paragraph(vec![])]);
            state.set_cursor(keys[0], 0);
        })
        .unwrap();
    assert!(session.insert_text("/"));
    assert!(session.insert_text("ins"));
    assert!(session.run_slash_command("today"));
    let content = futures::executor::block_on(session.get_content()).unwrap();
    assert_eq!(content.as_text(), Some("2024-01-01"));
}

#[test]
fn test_heading_shortcut() {
    let h = blank();
    type_chars(&h, "## Title");
    assert_eq!(h.markdown(), "## Title");
    assert_eq!(
        h.session
            .runtime()
            .read(|state| state.document.kind(state.document.blocks()[0]).cloned())
            .unwrap(),
        Some(NodeKind::Heading { level: 2 })
    );
}

#[test]
fn test_list_shortcuts() {
    let h = blank();
    type_chars(&h, "- milk");
    assert_eq!(h.markdown(), "- milk");

    let h = blank();
    type_chars(&h, "3. step");
    assert_eq!(h.markdown(), "3. step");

    let h = blank();
    type_chars(&h, "> said");
    assert_eq!(h.markdown(), "> said");
}

#[test]
fn test_shortcut_text_mid_line_is_literal() {
    let h = blank();
    type_chars(&h, "a # b");
    assert_eq!(
        h.session
            .runtime()
            .read(|state| state.document.kind(state.document.blocks()[0]).cloned())
            .unwrap(),
        Some(NodeKind::Paragraph)
    );
}

#[test]
fn test_undo_redo() {
    let h = Harness::mount(
        EditorConfig::default()
            .with_preset(Preset::Full)
            .with_initial_content("x"),
    );
    h.session.focus();
    assert!(h.session.insert_text("y"));
    assert!(h.session.insert_text("z"));
    assert_eq!(h.markdown(), "xyz");

    assert!(h.session.dispatch(command::UNDO, ()));
    assert_eq!(h.markdown(), "xy");
    assert!(h.session.dispatch(command::UNDO, ()));
    assert_eq!(h.markdown(), "x");
    assert!(!h.session.dispatch(command::UNDO, ()));

    assert!(h.session.dispatch(command::REDO, ()));
    assert_eq!(h.markdown(), "xy");
    assert!(h.session.insert_text("!"));
    assert!(!h.session.dispatch(command::REDO, ()));
    assert_eq!(h.markdown(), "xy!");
}

#[test]
fn test_list_commands() {
    let h = Harness::mount(
        EditorConfig::default()
            .with_preset(Preset::Full)
            .with_initial_content("item"),
    );
    h.session.focus();
    assert!(h.session.dispatch(command::INSERT_LIST, true));
    assert_eq!(h.markdown(), "1. item");
    assert!(h.session.dispatch(command::INSERT_LIST, false));
    assert_eq!(h.markdown(), "- item");
    assert!(h.session.dispatch(command::REMOVE_LIST, ()));
    assert_eq!(h.markdown(), "item");
    assert!(!h.session.dispatch(command::REMOVE_LIST, ()));
}

#[test]
fn test_read_only_rejects_edits() {
    let h = Harness::mount(
        EditorConfig::default()
            .with_preset(Preset::Full)
            .with_initial_content("fixed"),
    );
    h.session.focus();
    h.session.set_editable(false);
    assert!(!h.session.insert_text("x"));
    assert!(!h.session.dispatch(command::INSERT_PARAGRAPH, ()));
    assert_eq!(h.markdown(), "fixed");
}

#[test]
fn test_blur_reaches_callback_once() {
    use std::cell::Cell;
    use std::rc::Rc;

    let blurred = Rc::new(Cell::new(0));
    let session = futures::executor::block_on(
        md_surface::Session::builder(EditorConfig::default())
            .on_blur({
                let blurred = blurred.clone();
                move || blurred.set(blurred.get() + 1)
            })
            .mount(),
    )
    .unwrap();
    session.blur();
    assert_eq!(blurred.get(), 0);
    session.focus();
    session.blur();
    session.blur();
    assert_eq!(blurred.get(), 1);
}
