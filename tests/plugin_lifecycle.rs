use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::executor::block_on;
use md_surface::plugin::{self, Cleanup, PluginDescriptor, PluginError, Preset, Registration};
use md_surface::{EditorConfig, EditorError, MountError, Session, SessionStatus};

type Log = Rc<RefCell<Vec<String>>>;

fn logging(id: &'static str, log: &Log) -> PluginDescriptor {
    let log = log.clone();
    PluginDescriptor::new(id, |_| true, move |_session| -> Registration {
        let log = log.clone();
        Box::pin(async move {
            Ok(Box::new(move || {
                log.borrow_mut().push(id.to_string());
                Ok(())
            }) as Cleanup)
        })
    })
}

fn failing(id: &'static str) -> PluginDescriptor {
    PluginDescriptor::new(id, |_| true, move |_session| -> Registration {
        Box::pin(async move {
            Err(PluginError::Registration {
                id: id.to_string(),
                message: "backend unavailable".to_string(),
            })
        })
    })
}

fn minimal() -> EditorConfig {
    EditorConfig::default().with_preset(Preset::Minimal)
}

#[test]
fn test_cleanup_runs_in_reverse_registration_order() {
    let log: Log = Rc::default();
    let session = block_on(
        Session::builder(minimal())
            .plugin(logging("first", &log))
            .plugin(logging("second", &log))
            .plugin(logging("third", &log))
            .mount(),
    )
    .unwrap();
    assert_eq!(
        session.registered_plugins(),
        vec!["rich-text", "history", "first", "second", "third"]
    );
    session.unmount();
    assert_eq!(*log.borrow(), vec!["third", "second", "first"]);
    assert!(session.registered_plugins().is_empty());
}

#[test]
fn test_partial_failure_reports_once_and_degrades() {
    let log: Log = Rc::default();
    let errors = Rc::new(RefCell::new(Vec::new()));
    let ready = Rc::new(Cell::new(0));
    let session = block_on(
        Session::builder(minimal())
            .plugin(logging("before", &log))
            .plugin(failing("broken"))
            .plugin(logging("after", &log))
            .on_error({
                let errors = errors.clone();
                move |err: &EditorError| errors.borrow_mut().push(err.clone())
            })
            .on_ready({
                let ready = ready.clone();
                move || ready.set(ready.get() + 1)
            })
            .mount(),
    )
    .unwrap();

    assert_eq!(session.status(), SessionStatus::Degraded);
    assert_eq!(ready.get(), 1);
    let errors = errors.borrow();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        EditorError::Plugin { id, source: PluginError::Registration { .. } } if id == "broken"
    ));
    assert_eq!(
        session.registered_plugins(),
        vec!["rich-text", "history", "before", "after"]
    );

    // The survivors still work and still clean up.
    assert!(session.runtime().has_handler(md_surface::runtime::command::UNDO));
    session.unmount();
    assert_eq!(*log.borrow(), vec!["after", "before"]);
}

#[test]
fn test_double_unmount_cleans_up_once() {
    let log: Log = Rc::default();
    let session = block_on(
        Session::builder(minimal())
            .plugin(logging("only", &log))
            .mount(),
    )
    .unwrap();
    session.unmount();
    session.unmount();
    drop(session);
    assert_eq!(*log.borrow(), vec!["only"]);
}

#[test]
fn test_drop_unmounts() {
    let log: Log = Rc::default();
    let session = block_on(Session::builder(minimal()).plugin(logging("x", &log)).mount()).unwrap();
    let runtime = session.runtime().clone();
    drop(session);
    assert_eq!(*log.borrow(), vec!["x"]);
    assert!(runtime.is_disposed());
}

#[test]
fn test_late_registration_cleans_up_immediately() {
    let log: Log = Rc::default();
    let (release, gate) = oneshot::channel::<()>();
    let gate = Rc::new(RefCell::new(Some(gate)));
    let slow = {
        let log = log.clone();
        PluginDescriptor::new("slow", |_| true, move |_session| -> Registration {
            let gate = gate.borrow_mut().take();
            let log = log.clone();
            Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(Box::new(move || {
                    log.borrow_mut().push("slow".to_string());
                    Ok(())
                }) as Cleanup)
            })
        })
    };

    let session = Session::builder(minimal()).plugin(slow).build().unwrap();
    let mut start = Box::pin(session.start());
    assert!(start.as_mut().now_or_never().is_none());
    assert_eq!(session.registered_plugins(), vec!["rich-text", "history"]);

    session.unmount();
    assert!(log.borrow().is_empty());

    release.send(()).unwrap();
    assert!(start.as_mut().now_or_never().is_some());
    assert_eq!(*log.borrow(), vec!["slow"]);
    assert_eq!(session.status(), SessionStatus::Destroyed);
}

#[test]
fn test_preset_and_overrides_select_plugins() {
    let config = minimal().with_plugin(plugin::TABLE_ACTIONS, true);
    let session = block_on(Session::mount(config)).unwrap();
    assert_eq!(
        session.registered_plugins(),
        vec!["rich-text", "history", "table-actions"]
    );
    assert!(session.table_marker().is_some());
    assert!(session.toolbar().is_none());

    let config = EditorConfig::default()
        .with_preset(Preset::Full)
        .with_plugin(plugin::HISTORY, false);
    let session = block_on(Session::mount(config)).unwrap();
    assert!(!session.registered_plugins().iter().any(|id| id == "history"));
    assert_eq!(session.registered_plugins().len(), 8);
}

#[test]
fn test_duplicate_plugin_id_fails_mount() {
    let log: Log = Rc::default();
    let err = block_on(
        Session::builder(minimal())
            .plugin(logging("history", &log))
            .mount(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        MountError::Registry(PluginError::DuplicateId("history".to_string()))
    );
}

#[test]
fn test_unmount_removes_every_listener() {
    let session = block_on(Session::mount(EditorConfig::default().with_preset(Preset::Full))).unwrap();
    let runtime = session.runtime().clone();
    assert!(runtime.listener_count() > 0);
    session.unmount();
    assert_eq!(runtime.listener_count(), 0);
    assert!(session.toolbar().is_none());
    assert!(session.slash().is_none());
}
