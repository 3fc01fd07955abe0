//!
//! This module provides a connection that records every request instead of sending it, used to test the engine without an X11 server.
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use x11rb::{errors::ReplyOrIdError, protocol::xproto::Window};

use crate::{
    client::{Client, Prefs, WindowInfo},
    connection::{ConnectionActionExt, ConnectionAtomExt, ConnectionStateExt, Res},
    drag::{DragEvent, DragKey, DragMode, DragSource},
    geometry::{Rect, Strut},
    hints::NormalHints,
};

#[derive(Clone, PartialEq, Eq, Debug)]
/// A request made through the mock.
pub enum Call {
    Manage(Window),
    Withdraw(Window),
    Configure(Window, Rect, i32),
    Map(Window),
    Unmap(Window),
    Border(Window, bool),
    Restack(Vec<Window>),
    Focus(Window),
    FocusRoot,
    Close(Window),
    Kill(Window),
    PublishClient(Window, u32),
    ClientLists(Vec<Window>, Vec<Window>),
    ActiveWindow(Option<Window>),
    Views(usize, usize),
    Workarea(Vec<Rect>),
    Catalogs,
}

#[derive(Default)]
pub struct MockConnection {
    windows: RefCell<HashMap<Window, WindowInfo>>,
    calls: RefCell<Vec<Call>>,
    drag_events: RefCell<VecDeque<DragEvent>>,
    pointer: Cell<(i32, i32)>,
    grabbed: Cell<bool>,
    refuse_grabs: Cell<bool>,
    drags: Cell<usize>,
    outlines: Cell<usize>,
}

impl MockConnection {
    /// Makes a window known, so reading its properties returns `info`.
    pub fn add_window(&self, window: Window, info: WindowInfo) {
        self.windows.borrow_mut().insert(window, info);
    }

    /// Queues the events the next drags receive. An exhausted script cancels the drag.
    pub fn script_drag<const N: usize>(&self, events: [DragEvent; N]) {
        self.drag_events.borrow_mut().extend(events);
    }

    pub fn set_pointer(&self, x: i32, y: i32) {
        self.pointer.set((x, y));
    }

    /// The number of outlines drawn, erasing ones included.
    pub fn outlines(&self) -> usize {
        self.outlines.get()
    }

    /// Makes every following grab fail as if another client held the input.
    pub fn refuse_grabs(&self) {
        self.refuse_grabs.set(true);
    }

    pub fn grabbed(&self) -> bool {
        self.grabbed.get()
    }

    /// The number of drags started.
    pub fn drags(&self) -> usize {
        self.drags.get()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: Call) -> Res {
        self.calls.borrow_mut().push(call);
        Ok(())
    }

    fn info(&self, window: Window) -> WindowInfo {
        self.windows
            .borrow()
            .get(&window)
            .cloned()
            .unwrap_or_default()
    }
}

impl ConnectionStateExt for MockConnection {
    fn manage_window(&self, window: Window) -> Res {
        self.record(Call::Manage(window))
    }

    fn withdraw_window(&self, window: Window) -> Res {
        self.record(Call::Withdraw(window))
    }

    fn configure_client(&self, client: &Client) -> Res {
        self.record(Call::Configure(client.window, client.geom, client.border))
    }

    fn map_client(&self, window: Window) -> Res {
        self.record(Call::Map(window))
    }

    fn unmap_client(&self, window: Window) -> Res {
        self.record(Call::Unmap(window))
    }

    fn set_border_focus(&self, window: Window, focused: bool) -> Res {
        self.record(Call::Border(window, focused))
    }

    fn restack(&self, stacking: &[Window]) -> Res {
        self.record(Call::Restack(stacking.to_vec()))
    }
}

impl ConnectionActionExt for MockConnection {
    fn read_window(&self, window: Window) -> Result<WindowInfo, ReplyOrIdError> {
        Ok(self.info(window))
    }

    fn read_normal_hints(&self, window: Window) -> Result<Option<NormalHints>, ReplyOrIdError> {
        Ok(self.info(window).hints)
    }

    fn read_wm_hints(&self, window: Window) -> Result<(bool, bool), ReplyOrIdError> {
        let info = self.info(window);
        Ok((info.input, info.urgent))
    }

    fn read_strut(&self, window: Window) -> Result<Option<Strut>, ReplyOrIdError> {
        Ok(self.info(window).strut)
    }

    fn read_name(&self, window: Window) -> Result<String, ReplyOrIdError> {
        Ok(self.info(window).props.name)
    }

    fn focus_window(&self, window: Window, _prefs: Prefs) -> Res {
        self.record(Call::Focus(window))
    }

    fn focus_root(&self) -> Res {
        self.record(Call::FocusRoot)
    }

    fn close_window(&self, window: Window) -> Res {
        self.record(Call::Close(window))
    }

    fn kill_window(&self, window: Window) -> Res {
        self.record(Call::Kill(window))
    }
}

impl ConnectionAtomExt for MockConnection {
    fn publish_client(&self, client: &Client, desktop: u32) -> Res {
        self.record(Call::PublishClient(client.window, desktop))
    }

    fn publish_client_lists(&self, clients: &[Window], stacking: &[Window]) -> Res {
        self.record(Call::ClientLists(clients.to_vec(), stacking.to_vec()))
    }

    fn publish_active_window(&self, window: Option<Window>) -> Res {
        self.record(Call::ActiveWindow(window))
    }

    fn publish_views(&self, names: &[String], current: usize) -> Res {
        self.record(Call::Views(names.len(), current))
    }

    fn publish_workarea(&self, areas: &[Rect]) -> Res {
        self.record(Call::Workarea(areas.to_vec()))
    }

    fn publish_catalogs(&self, _gravities: &[String], _tags: &[String]) -> Res {
        self.record(Call::Catalogs)
    }
}

impl DragSource for MockConnection {
    fn begin_drag(&self, _mode: DragMode) -> Result<bool, ReplyOrIdError> {
        if self.refuse_grabs.get() {
            return Ok(false);
        }
        self.grabbed.set(true);
        self.drags.set(self.drags.get() + 1);
        Ok(true)
    }

    fn end_drag(&self) -> Res {
        self.grabbed.set(false);
        Ok(())
    }

    fn query_pointer(&self) -> Result<(i32, i32), ReplyOrIdError> {
        Ok(self.pointer.get())
    }

    fn next_drag_event(&self, _window: Window) -> Result<DragEvent, ReplyOrIdError> {
        Ok(self
            .drag_events
            .borrow_mut()
            .pop_front()
            .unwrap_or(DragEvent::Key(DragKey::Escape)))
    }

    fn draw_outline(&self, _rect: &Rect, _border: i32) -> Res {
        self.outlines.set(self.outlines.get() + 1);
        Ok(())
    }
}
