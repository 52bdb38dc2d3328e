//! Geometry seam between the runtime and the platform that renders it.
//!
//! The embedding platform implements [`Surface`] for the element bound as the
//! editing root. Overlay state machines only ever read geometry through it.

use crate::doc::NodeKey;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Half-open on the far edges so adjacent rects never both match.
    pub fn contains(&self, point: Position) -> bool {
        point.x >= self.left()
            && point.x < self.right()
            && point.y >= self.top()
            && point.y < self.bottom()
    }
}

/// The platform's view of the current text selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeSelection {
    pub anchor_in_root: bool,
    pub collapsed: bool,
    pub rect: Rect,
}

/// Nearest scrolling ancestor of a node, in viewport coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollContainer {
    pub rect: Rect,
    pub scroll_left: f32,
    pub scroll_top: f32,
}

pub trait Surface {
    fn viewport(&self) -> Rect;

    fn native_selection(&self) -> Option<NativeSelection>;

    /// Rendered top-level blocks, in document order.
    fn block_rects(&self) -> Vec<(NodeKey, Rect)>;

    fn node_rect(&self, key: NodeKey) -> Option<Rect>;

    /// `None` means the node scrolls with the viewport.
    fn scroll_container(&self, key: NodeKey) -> Option<ScrollContainer>;
}
