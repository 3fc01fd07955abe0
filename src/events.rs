//!
//! This module translates X11 events into operations on the `StateHandler`.
use x11rb::{
    connection::Connection,
    protocol::{
        Event,
        xproto::{
            AtomEnum, ButtonPressEvent, ClientMessageEvent, ConfigWindow, ConfigureRequestEvent,
            ConfigureWindowAux, ConnectionExt as _, EnterNotifyEvent, KeyPressEvent,
            MapRequestEvent, NotifyMode, PropertyNotifyEvent, UnmapNotifyEvent, Window,
        },
    },
};

use crate::{
    client::ModeFlags,
    connection::{ConnectionHandler, Res, spawn_command},
    drag::DragMode,
    geometry::Rect,
    keys::{HotkeyAction, KeyHandler},
    state::StateHandler,
};

/// `_NET_WM_STATE` actions.
const STATE_REMOVE: u32 = 0;
const STATE_ADD: u32 = 1;
const STATE_TOGGLE: u32 = 2;

/// Reads a signed value from client message data, where negative values mean "unchanged".
fn optional_index(value: u32) -> Option<usize> {
    let value = value as i32;
    (value >= 0).then_some(value as usize)
}

pub struct EventHandler<'a, C: Connection> {
    pub conn: &'a ConnectionHandler<'a, C>,
    pub state: StateHandler,
    pub key: KeyHandler,
}

impl<C: Connection> EventHandler<'_, C> {
    pub fn handle_event(&mut self, event: &Event) -> Res {
        match event {
            Event::MapRequest(e) => {
                self.handle_map_request(*e)?;
            }
            Event::UnmapNotify(e) => {
                self.handle_unmap_notify(*e)?;
            }
            Event::DestroyNotify(e) => {
                log::trace!("EVENT DESTROY window {}", e.window);
                self.state.unmanage(self.conn, e.window, true)?;
            }
            Event::KeyPress(e) => {
                self.handle_keypress(*e)?;
            }
            Event::ButtonPress(e) => {
                self.handle_button_press(*e)?;
            }
            Event::EnterNotify(e) => {
                self.handle_enter(*e)?;
            }
            Event::ConfigureRequest(e) => {
                self.handle_config(*e)?;
            }
            Event::ClientMessage(e) => {
                self.handle_client_message(*e)?;
            }
            Event::PropertyNotify(e) => {
                self.handle_property(*e)?;
            }
            _ => (),
        }
        Ok(())
    }

    fn handle_map_request(&mut self, event: MapRequestEvent) -> Res {
        log::trace!(
            "EVENT MAP window {} parent {} response {}",
            event.window,
            event.parent,
            event.response_type
        );
        self.state.manage(self.conn, event.window)
    }

    fn handle_unmap_notify(&mut self, event: UnmapNotifyEvent) -> Res {
        log::trace!(
            "EVENT UNMAP window {} event {} from config {} response {}",
            event.window,
            event.event,
            event.from_configure,
            event.response_type
        );
        self.state.unmap_notify(self.conn, event.window)
    }

    fn handle_keypress(&mut self, event: KeyPressEvent) -> Res {
        let Some(action) = self.key.get_action(event) else {
            return Ok(());
        };

        log::trace!(
            "EVENT KEYPRESS code {} sym {:?} action {:?}",
            event.detail,
            event.state,
            action
        );
        self.run_action(action, self.state.focus)
    }

    fn handle_button_press(&mut self, event: ButtonPressEvent) -> Res {
        let Some(action) = self.key.get_button_action(event) else {
            return Ok(());
        };

        log::trace!(
            "EVENT BUTTON button {} child {} action {:?}",
            event.detail,
            event.child,
            action
        );

        let window = [event.child, event.event]
            .into_iter()
            .find(|&w| self.state.client(w).is_some())
            .or(self.state.focus);
        if let Some(window) = window {
            self.state.focus(self.conn, Some(window))?;
        }
        self.run_action(action, window)
    }

    /// Runs a hotkey or button action on `window`.
    fn run_action(&mut self, action: HotkeyAction, window: Option<Window>) -> Res {
        match action {
            HotkeyAction::Spawn(command) => {
                spawn_command(&command);
                return Ok(());
            }
            HotkeyAction::ViewSwitch(n) => return self.state.switch_view(self.conn, n.saturating_sub(1)),
            HotkeyAction::ViewNext(change) => return self.state.view_next(self.conn, change),
            HotkeyAction::Select(direction) => return self.state.select(self.conn, direction),
            HotkeyAction::TileNew(axis) => return self.state.tile_new(self.conn, axis),
            HotkeyAction::TileDelete => return self.state.tile_delete(self.conn),
            _ => (),
        }

        let Some(window) = window else {
            log::debug!("no window for {action:?}");
            return Ok(());
        };
        match action {
            HotkeyAction::Kill => self.state.kill(self.conn, window, false),
            HotkeyAction::ForceKill => self.state.kill(self.conn, window, true),
            HotkeyAction::ToggleFloat => self.state.toggle(self.conn, window, ModeFlags::FLOAT),
            HotkeyAction::ToggleFull => self.state.toggle(self.conn, window, ModeFlags::FULL),
            HotkeyAction::ToggleStick => self.state.toggle(self.conn, window, ModeFlags::STICK),
            HotkeyAction::ToggleResize => {
                self.state.toggle(self.conn, window, ModeFlags::RESIZE_LOCK)
            }
            HotkeyAction::Gravity(names) => self.state.cycle_gravity(self.conn, window, &names),
            HotkeyAction::Raise => self.state.raise(self.conn, window),
            HotkeyAction::Lower => self.state.lower(self.conn, window),
            HotkeyAction::WindowMove => self.state.drag(self.conn, window, DragMode::Move),
            HotkeyAction::WindowResize => self.state.drag(self.conn, window, DragMode::Resize),
            HotkeyAction::TileShade => self.state.tile_shade(self.conn, window),
            _ => Ok(()),
        }
    }

    fn handle_enter(&mut self, event: EnterNotifyEvent) -> Res {
        log::trace!(
            "EVENT ENTER child {} detail {:?} event {}",
            event.child,
            event.detail,
            event.event
        );

        if event.mode != NotifyMode::NORMAL || self.state.client(event.event).is_none() {
            return Ok(());
        }
        self.state.focus(self.conn, Some(event.event))
    }

    fn handle_config(&mut self, event: ConfigureRequestEvent) -> Res {
        let Some(client) = self.state.client(event.window) else {
            log::trace!("passing configure request of {} through", event.window);
            let aux = ConfigureWindowAux::from_configure_request(&event);
            self.conn.conn.configure_window(event.window, &aux)?;
            return Ok(());
        };

        let mask = event.value_mask;
        let current = client.geom;
        let requested = Rect {
            x: if mask.contains(ConfigWindow::X) { i32::from(event.x) } else { current.x },
            y: if mask.contains(ConfigWindow::Y) { i32::from(event.y) } else { current.y },
            width: if mask.contains(ConfigWindow::WIDTH) {
                i32::from(event.width)
            } else {
                current.width
            },
            height: if mask.contains(ConfigWindow::HEIGHT) {
                i32::from(event.height)
            } else {
                current.height
            },
        };
        self.state.request_geometry(self.conn, event.window, requested)
    }

    fn handle_client_message(&mut self, event: ClientMessageEvent) -> Res {
        let data = event.data.as_data32();
        let conn = self.conn;
        let atoms = &conn.atoms;
        let window = event.window;

        log::trace!(
            "GOT CLIENT EVENT window {} atom {} data {:?}",
            window,
            event.type_,
            data
        );

        match event.type_ {
            t if t == atoms.net_wm_state => {
                let Some(current) = self.state.client(window).map(|c| c.modes) else {
                    return Ok(());
                };
                let modes = conn.modes_from_state_atoms(&[data[1], data[2]]);
                let requested = match data[0] {
                    STATE_REMOVE => modes & current,
                    STATE_ADD => modes - current,
                    STATE_TOGGLE => modes,
                    _ => ModeFlags::empty(),
                };
                self.state.toggle(self.conn, window, requested)?;
            }
            t if t == atoms.net_active_window => self.activate(window)?,
            t if t == atoms.net_close_window => self.state.kill(self.conn, window, false)?,
            t if t == atoms.net_current_desktop => {
                self.state.switch_view(self.conn, data[0] as usize)?;
            }
            t if t == atoms.net_number_of_desktops => {
                self.state.set_view_count(self.conn, data[0] as usize)?;
            }
            t if t == atoms.tessera_window_gravity => {
                self.state.set_gravity(
                    self.conn,
                    window,
                    optional_index(data[0]),
                    optional_index(data[1]),
                )?;
            }
            t if t == atoms.tessera_window_flags => {
                self.state.toggle(self.conn, window, ModeFlags::from_bits_truncate(data[0]))?;
            }
            t if t == atoms.tessera_window_tag => {
                self.state.set_tag(self.conn, window, data[0] as usize, true)?;
            }
            t if t == atoms.tessera_window_untag => {
                self.state.set_tag(self.conn, window, data[0] as usize, false)?;
            }
            _ => (),
        }
        Ok(())
    }

    fn handle_property(&mut self, event: PropertyNotifyEvent) -> Res {
        if self.state.client(event.window).is_none() {
            return Ok(());
        }
        let conn = self.conn;
        let atoms = &conn.atoms;
        log::trace!("EVENT PROPERTY window {} atom {}", event.window, event.atom);

        match event.atom {
            a if a == u32::from(AtomEnum::WM_NORMAL_HINTS) => {
                self.state.update_normal_hints(self.conn, event.window)
            }
            a if a == u32::from(AtomEnum::WM_HINTS) => {
                self.state.update_wm_hints(self.conn, event.window)
            }
            a if a == u32::from(AtomEnum::WM_NAME) || a == atoms.net_wm_name => {
                self.state.update_name(self.conn, event.window)
            }
            a if a == atoms.net_wm_strut || a == atoms.net_wm_strut_partial => {
                self.state.update_strut(self.conn, event.window)
            }
            _ => Ok(()),
        }
    }

    /// Focuses and raises a client, switching to a view it is on if it is hidden.
    fn activate(&mut self, window: Window) -> Res {
        let Some(client) = self.state.client(window) else {
            return Ok(());
        };
        let active = self.state.views[self.state.active_view].tags;
        if !client.is_visible_on(active) {
            let tags = client.tags;
            if let Some(view) = self.state.views.iter().position(|v| tags.intersects(v.tags)) {
                self.state.switch_view(self.conn, view)?;
            }
        }
        self.state.focus(self.conn, Some(window))?;
        self.state.raise(self.conn, window)
    }
}
