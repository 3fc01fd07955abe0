//!
//! This module implements interactive moving and resizing.
//!
//! The loop is an explicit state machine fed with `DragEvent`s. The connection translates X11 events into those, so the same machine runs against scripted events in tests.
use x11rb::{errors::ReplyOrIdError, protocol::xproto::Window};

use crate::{
    connection::Res,
    geometry::{Rect, snap},
    hints::SizeConstraints,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DragMode {
    Move,
    Resize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
/// Keys with a meaning during a drag.
pub enum DragKey {
    Left,
    Right,
    Up,
    Down,
    Return,
    Escape,
    Other,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
/// An input event as seen by the drag loop.
pub enum DragEvent {
    /// The pointer moved to root coordinates `x`, `y`.
    Motion { x: i32, y: i32 },
    Key(DragKey),
    ButtonRelease,
    /// The dragged window was destroyed.
    Destroyed,
}

#[derive(Clone, Copy, PartialEq, Debug)]
/// The parameters and progress of a drag.
pub struct Drag {
    /// The geometry at the start, in content coordinates.
    start: Rect,
    /// The current candidate, in content coordinates.
    rect: Rect,
    /// The pointer position at the start.
    origin: (i32, i32),
    /// Set when a resize grabbed the left half of the window.
    left_edge: bool,
    border: i32,
    /// The working area of the screen the window is on.
    area: Rect,
    constraints: SizeConstraints,
    snap: i32,
    step: i32,
}

impl Drag {
    /// Creates a drag of a window with outer geometry `geom`.
    ///
    /// The candidate is kept in content coordinates, the origin of the window inside its border.
    #[must_use]
    pub fn new(
        geom: Rect,
        border: i32,
        pointer: (i32, i32),
        area: Rect,
        constraints: SizeConstraints,
        snap: i32,
        step: i32,
    ) -> Self {
        let start = Rect {
            x: geom.x + border,
            y: geom.y + border,
            ..geom
        };
        Self {
            start,
            rect: start,
            origin: pointer,
            left_edge: pointer.0 < start.x + start.width / 2,
            border,
            area,
            constraints,
            snap,
            step: step.max(1),
        }
    }

    fn motion_move(&mut self, x: i32, y: i32) {
        let moved = Rect {
            x: self.start.x + x - self.origin.0,
            y: self.start.y + y - self.origin.1,
            ..self.start
        };
        self.rect = snap(moved, self.border, &self.area, self.snap);
    }

    fn motion_resize(&mut self, x: i32, y: i32) {
        let dx = x - self.origin.0;
        let dy = y - self.origin.1;
        let width = if self.left_edge {
            self.start.width - dx
        } else {
            self.start.width + dx
        };
        self.set_size(width, self.start.height + dy, self.start);
    }

    /// Sets an aligned size. Left edge resizes keep the right edge of `anchor` in place.
    fn set_size(&mut self, width: i32, height: i32, anchor: Rect) {
        let width = self.constraints.align_width(width);
        let height = self.constraints.align_height(height);
        self.rect.width = width;
        self.rect.height = height;
        if self.left_edge {
            self.rect.x = anchor.x + anchor.width - width;
        }
    }

    fn nudge_move(&mut self, dx: i32, dy: i32) {
        let max_x = self.area.right() - self.rect.width - self.border;
        let max_y = self.area.bottom() - self.rect.height - self.border;
        self.rect.x = (self.rect.x + dx).clamp(self.area.x + self.border, max_x.max(self.area.x));
        self.rect.y = (self.rect.y + dy).clamp(self.area.y + self.border, max_y.max(self.area.y));
    }

    fn nudge_resize(&mut self, dx: i32, dy: i32) {
        let dx = dx.signum() * self.step.max(self.constraints.inc_width);
        let dy = dy.signum() * self.step.max(self.constraints.inc_height);
        let anchor = self.rect;
        self.set_size(anchor.width + dx, anchor.height + dy, anchor);
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
/// The state of the drag loop.
pub enum DragState {
    Idle,
    Dragging(Drag),
    Resizing(Drag),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
/// The outcome of feeding one event into the drag loop.
pub enum Step {
    /// The drag goes on. Carries the new candidate if it changed.
    Continue(Option<Rect>),
    /// The drag is over and the candidate should be applied.
    Commit(Rect),
    /// The drag is over and the window keeps its geometry.
    Cancel,
}

impl DragState {
    #[must_use]
    pub const fn new(mode: DragMode, drag: Drag) -> Self {
        match mode {
            DragMode::Move => Self::Dragging(drag),
            DragMode::Resize => Self::Resizing(drag),
        }
    }

    /// Feeds an event into the loop. A committed or cancelled drag returns to `Idle`.
    pub fn feed(&mut self, event: DragEvent) -> Step {
        let (drag, moving) = match self {
            Self::Idle => return Step::Cancel,
            Self::Dragging(drag) => (drag, true),
            Self::Resizing(drag) => (drag, false),
        };

        let step = match event {
            DragEvent::Motion { x, y } => {
                if !drag.area.contains_point(x, y) {
                    return Step::Continue(None);
                }
                let before = drag.rect;
                if moving {
                    drag.motion_move(x, y);
                } else {
                    drag.motion_resize(x, y);
                }
                Step::Continue((drag.rect != before).then_some(drag.rect))
            }
            DragEvent::Key(key) => {
                let (dx, dy) = match key {
                    DragKey::Left => (-drag.step, 0),
                    DragKey::Right => (drag.step, 0),
                    DragKey::Up => (0, -drag.step),
                    DragKey::Down => (0, drag.step),
                    DragKey::Return => {
                        let rect = drag.rect;
                        *self = Self::Idle;
                        return Step::Commit(rect);
                    }
                    DragKey::Escape => {
                        *self = Self::Idle;
                        return Step::Cancel;
                    }
                    DragKey::Other => return Step::Continue(None),
                };
                let before = drag.rect;
                if moving {
                    drag.nudge_move(dx, dy);
                } else {
                    drag.nudge_resize(dx, dy);
                }
                Step::Continue((drag.rect != before).then_some(drag.rect))
            }
            DragEvent::ButtonRelease => Step::Commit(drag.rect),
            DragEvent::Destroyed => Step::Cancel,
        };

        if !matches!(step, Step::Continue(_)) {
            *self = Self::Idle;
        }
        step
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
/// How a drag loop ended.
pub enum DragResult {
    /// The final candidate, in content coordinates.
    Committed(Rect),
    Cancelled,
    /// The window went away during the drag.
    Destroyed,
}

/// The input side of a drag, provided by the connection.
pub trait DragSource {
    /// Grabs the pointer and keyboard for a drag. Returns `false`, holding no grab, when either of them is taken by someone else.
    /// # Errors
    /// Returns an error if the connection failed.
    fn begin_drag(&self, mode: DragMode) -> Result<bool, ReplyOrIdError>;
    /// Releases the grabs.
    /// # Errors
    /// Returns an error if the connection failed.
    fn end_drag(&self) -> Res;
    /// Gets the pointer position in root coordinates.
    /// # Errors
    /// Returns an error if the pointer couldn't be queried.
    fn query_pointer(&self) -> Result<(i32, i32), ReplyOrIdError>;
    /// Blocks until the next event relevant to dragging `window`. Unrelated events are set aside for later.
    /// # Errors
    /// Returns an error if the connection failed.
    fn next_drag_event(&self, window: Window) -> Result<DragEvent, ReplyOrIdError>;
    /// Toggles the outline of a candidate. Drawing the same rectangle twice erases it.
    /// # Errors
    /// Returns an error if the outline couldn't be drawn.
    fn draw_outline(&self, rect: &Rect, border: i32) -> Res;
}

/// Runs a drag until it is committed or cancelled.
///
/// # Errors
/// Returns an error if the connection failed. The grabs are released in any case.
pub fn run_drag(
    source: &impl DragSource,
    window: Window,
    mode: DragMode,
    drag: Drag,
) -> Result<DragResult, ReplyOrIdError> {
    if !source.begin_drag(mode)? {
        log::debug!("couldn't grab input to drag {window}");
        return Ok(DragResult::Cancelled);
    }
    let result = drag_loop(source, window, DragState::new(mode, drag), drag.border);
    source.end_drag()?;
    result
}

fn drag_loop(
    source: &impl DragSource,
    window: Window,
    mut state: DragState,
    border: i32,
) -> Result<DragResult, ReplyOrIdError> {
    let mut outline: Option<Rect> = None;
    let result = loop {
        let event = source.next_drag_event(window)?;
        match state.feed(event) {
            Step::Continue(Some(rect)) => {
                if let Some(old) = outline.replace(rect) {
                    source.draw_outline(&old, border)?;
                }
                source.draw_outline(&rect, border)?;
            }
            Step::Continue(None) => (),
            Step::Commit(rect) => break DragResult::Committed(rect),
            Step::Cancel if event == DragEvent::Destroyed => break DragResult::Destroyed,
            Step::Cancel => break DragResult::Cancelled,
        }
    };
    if let Some(old) = outline {
        source.draw_outline(&old, border)?;
    }
    log::debug!("drag of {window} ended with {result:?}");
    Ok(result)
}
