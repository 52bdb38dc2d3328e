#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use futures::executor::block_on;
use md_surface::overlay::ManualClock;
use md_surface::runtime::{NativeSelection, Rect, ScrollContainer, Surface};
use md_surface::{EditorConfig, NodeKey, Session};

/// Scriptable stand-in for the platform's rendered editing root.
pub struct FakeSurface {
    pub viewport: Cell<Rect>,
    pub selection: Cell<Option<NativeSelection>>,
    pub blocks: RefCell<Vec<(NodeKey, Rect)>>,
    pub nodes: RefCell<BTreeMap<NodeKey, Rect>>,
    pub containers: RefCell<BTreeMap<NodeKey, ScrollContainer>>,
}

impl FakeSurface {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            viewport: Cell::new(Rect::new(0.0, 0.0, 800.0, 600.0)),
            selection: Cell::new(None),
            blocks: RefCell::new(Vec::new()),
            nodes: RefCell::new(BTreeMap::new()),
            containers: RefCell::new(BTreeMap::new()),
        })
    }

    /// A non-collapsed native selection inside the root.
    pub fn select(&self, rect: Rect) {
        self.selection.set(Some(NativeSelection {
            anchor_in_root: true,
            collapsed: false,
            rect,
        }));
    }

    pub fn clear_selection(&self) {
        self.selection.set(None);
    }

    /// Lays out `keys` as stacked 40px rows starting at y = 100.
    pub fn layout_blocks(&self, keys: &[NodeKey]) {
        let mut blocks = self.blocks.borrow_mut();
        let mut nodes = self.nodes.borrow_mut();
        blocks.clear();
        for (index, key) in keys.iter().enumerate() {
            let rect = Rect::new(100.0, 100.0 + 40.0 * index as f32, 600.0, 40.0);
            blocks.push((*key, rect));
            nodes.insert(*key, rect);
        }
    }

    pub fn set_node(&self, key: NodeKey, rect: Rect) {
        self.nodes.borrow_mut().insert(key, rect);
    }

    pub fn set_container(&self, key: NodeKey, container: ScrollContainer) {
        self.containers.borrow_mut().insert(key, container);
    }
}

impl Surface for FakeSurface {
    fn viewport(&self) -> Rect {
        self.viewport.get()
    }

    fn native_selection(&self) -> Option<NativeSelection> {
        self.selection.get()
    }

    fn block_rects(&self) -> Vec<(NodeKey, Rect)> {
        self.blocks.borrow().clone()
    }

    fn node_rect(&self, key: NodeKey) -> Option<Rect> {
        self.nodes.borrow().get(&key).copied()
    }

    fn scroll_container(&self, key: NodeKey) -> Option<ScrollContainer> {
        self.containers.borrow().get(&key).copied()
    }
}

pub struct Harness {
    pub session: Session,
    pub surface: Rc<FakeSurface>,
    pub clock: Rc<ManualClock>,
}

impl Harness {
    pub fn mount(config: EditorConfig) -> Self {
        let surface = FakeSurface::new();
        let clock = Rc::new(ManualClock::new());
        let session = block_on(
            Session::builder(config)
                .surface(surface.clone())
                .clock(clock.clone())
                .mount(),
        )
        .unwrap();
        Self {
            session,
            surface,
            clock,
        }
    }

    pub fn blocks(&self) -> Vec<NodeKey> {
        self.session
            .runtime()
            .read(|state| state.document.blocks().to_vec())
            .unwrap()
    }

    /// First text node of top-level block `index`.
    pub fn text_in(&self, index: usize) -> NodeKey {
        self.session
            .runtime()
            .read(|state| state.document.text_nodes_in(state.document.blocks()[index])[0])
            .unwrap()
    }

    pub fn place_cursor(&self, key: NodeKey, offset: usize) {
        self.session
            .runtime()
            .update(|state| state.set_cursor(key, offset))
            .unwrap();
    }

    pub fn markdown(&self) -> String {
        let value = block_on(self.session.get_content()).unwrap();
        value.as_text().unwrap_or_default().to_string()
    }

    pub fn wait(&self, millis: u64) {
        self.clock.advance(std::time::Duration::from_millis(millis));
        self.session.advance_timers(md_surface::overlay::Clock::now(&*self.clock));
    }
}
