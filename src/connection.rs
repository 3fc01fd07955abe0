//!
//! This module extends `x11rb`'s `Connection` trait to carry out the decisions of the manager: configuring clients, reading their properties and publishing state.
//!
//! The engine only talks to the server through the traits defined here, so everything it does can be replayed against a recording connection in tests.
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::process::{Command, exit};

use x11rb::{
    CURRENT_TIME, NONE,
    connection::Connection,
    cursor,
    errors::{ReplyError, ReplyOrIdError},
    properties::{WmClass, WmHints, WmSizeHints},
    protocol::{
        ErrorKind, Event,
        render::Color,
        xproto::{
            Atom, AtomEnum, ButtonIndex, ChangeWindowAttributesAux, ClientMessageEvent,
            ConfigureNotifyEvent, ConfigureWindowAux, ConnectionExt as _, CreateGCAux,
            CreateWindowAux, Cursor, EventMask, GX, Gcontext, GrabMode, GrabStatus, InputFocus,
            Rectangle, Screen, SetMode, StackMode, SubwindowMode, Window, WindowClass,
            CONFIGURE_NOTIFY_EVENT,
        },
    },
    resource_manager,
};

use crate::{
    atoms::Atoms,
    client::{Client, ClientType, ModeFlags, Prefs, WindowInfo},
    config::Config,
    drag::{DragEvent, DragKey, DragMode, DragSource},
    geometry::{Rect, Strut},
    hints::NormalHints,
    keys::KeyHandler,
    tags::WindowProps,
};

/// A shorthand for `Result<(),ReplyOrIdError`.
///
/// The `ReplyOrIdError` is the main error that is used when handling the X11 connection, so many functions return this type to be able to use the `?` syntax and bubble the error.
pub type Res = Result<(), ReplyOrIdError>;
/// An integer handle to an X11 resource.
pub type Id = u32;

/// The pixel values of the border colors.
pub struct Colors {
    /// The border of the focused client.
    pub focus: Id,
    /// The border of every other client.
    pub normal: Id,
}

/// The cursors used on the root window and while dragging.
struct Cursors {
    normal: Cursor,
    moving: Cursor,
    sizing: Cursor,
}

/// Defines how the manager changes the windows of its clients.
pub trait ConnectionStateExt {
    /// Starts managing a window: selects its events, adds it to the save set and sets its `WM_STATE`.
    /// # Errors
    /// Returns an error if the window does not exist.
    fn manage_window(&self, window: Window) -> Res;
    /// Stops managing a window that is still alive, leaving it withdrawn.
    /// # Errors
    /// Returns an error if the connection failed.
    fn withdraw_window(&self, window: Window) -> Res;
    /// Moves and resizes a client to its geometry and border, and tells it about it with a synthetic `ConfigureNotify`.
    /// # Errors
    /// Returns an error if the window does not exist.
    fn configure_client(&self, client: &Client) -> Res;
    /// Maps a client.
    /// # Errors
    /// Returns an error if the window does not exist.
    fn map_client(&self, window: Window) -> Res;
    /// Unmaps a client.
    /// # Errors
    /// Returns an error if the window does not exist.
    fn unmap_client(&self, window: Window) -> Res;
    /// Paints the border of a client in the focus or normal color.
    /// # Errors
    /// Returns an error if the window does not exist.
    fn set_border_focus(&self, window: Window, focused: bool) -> Res;
    /// Restacks clients. The list goes from bottom to top.
    /// # Errors
    /// Returns an error if a window does not exist.
    fn restack(&self, stacking: &[Window]) -> Res;
}

/// Defines the more abstract directions you can give to the X11 server, like reading window properties or killing a window.
pub trait ConnectionActionExt {
    /// Reads everything the manager needs to know about a new window.
    /// # Errors
    /// Returns an error if the window does not exist.
    fn read_window(&self, window: Window) -> Result<WindowInfo, ReplyOrIdError>;
    /// Reads the `WM_NORMAL_HINTS` of a window.
    /// # Errors
    /// Returns an error if the window does not exist.
    fn read_normal_hints(&self, window: Window) -> Result<Option<NormalHints>, ReplyOrIdError>;
    /// Reads the input and urgency fields of `WM_HINTS`.
    /// # Errors
    /// Returns an error if the window does not exist.
    fn read_wm_hints(&self, window: Window) -> Result<(bool, bool), ReplyOrIdError>;
    /// Reads the strut of a window.
    /// # Errors
    /// Returns an error if the window does not exist.
    fn read_strut(&self, window: Window) -> Result<Option<Strut>, ReplyOrIdError>;
    /// Gets the UTF-8 name of the window (if it exists).
    /// # Errors
    /// Returns an error if the window doesn't exist.
    fn read_name(&self, window: Window) -> Result<String, ReplyOrIdError>;
    /// Gives the input focus to a client, the way it asks for.
    /// # Errors
    /// Returns an error if the window does not exist.
    fn focus_window(&self, window: Window, prefs: Prefs) -> Res;
    /// Gives the input focus to the root window.
    /// # Errors
    /// Returns an error if the root window does not exist.
    fn focus_root(&self) -> Res;
    /// Asks a client to close with `WM_DELETE_WINDOW`.
    /// # Errors
    /// Returns an error if the window does not exist.
    fn close_window(&self, window: Window) -> Res;
    /// Kills the connection of a client.
    /// # Errors
    /// Returns an error if the window does not exist.
    fn kill_window(&self, window: Window) -> Res;
}

/// Defines the methods used to publish state through properties.
pub trait ConnectionAtomExt {
    /// Publishes the per window state of a client.
    /// # Errors
    /// Returns an error if the window doesn't exist.
    fn publish_client(&self, client: &Client, desktop: u32) -> Res;
    /// Publishes the managed windows in creation and in stacking order.
    /// # Errors
    /// Returns an error if properties can't be changed.
    fn publish_client_lists(&self, clients: &[Window], stacking: &[Window]) -> Res;
    /// Publishes the active window.
    /// # Errors
    /// Returns an error if properties can't be changed.
    fn publish_active_window(&self, window: Option<Window>) -> Res;
    /// Publishes the views as desktops and which one is current.
    /// # Errors
    /// Returns an error if properties can't be changed.
    fn publish_views(&self, names: &[String], current: usize) -> Res;
    /// Publishes the working area of every desktop.
    /// # Errors
    /// Returns an error if properties can't be changed.
    fn publish_workarea(&self, areas: &[Rect]) -> Res;
    /// Publishes the gravity and tag catalogs.
    /// # Errors
    /// Returns an error if properties can't be changed.
    fn publish_catalogs(&self, gravities: &[String], tags: &[String]) -> Res;
}

/// Everything the engine needs from a connection.
pub trait ManagerConnection:
    ConnectionStateExt + ConnectionActionExt + ConnectionAtomExt + DragSource
{
}

impl<T> ManagerConnection for T where
    T: ConnectionStateExt + ConnectionActionExt + ConnectionAtomExt + DragSource
{
}

/// An implementation of the Connection traits, with additional information like the screen, atoms and colors.
pub struct ConnectionHandler<'a, C: Connection> {
    /// A connection to the X11 server.
    pub conn: &'a C,
    /// The current display.
    pub screen: &'a Screen,
    /// A helper to manage atoms.
    pub atoms: Atoms<'a, C>,
    /// All the ids of the managed colors.
    pub colors: Colors,
    cursors: Cursors,
    /// The graphics context drawing drag outlines.
    outline_gc: Gcontext,
    border_size: u32,
    /// Keycodes of the keys with a meaning during a drag.
    drag_keys: HashMap<u8, DragKey>,
    /// Events that arrived during a drag, to be handled afterwards.
    deferred: RefCell<VecDeque<Event>>,
}

impl<'a, C: Connection> ConnectionHandler<'a, C> {
    /// Creates a new handler.
    ///
    /// Becomes the window manager, allocates the border colors, grabs the configured keys and buttons, sets the default cursor and adds a heartbeat window.
    /// # Errors
    /// May return an error if the connection is faulty.
    pub fn new(
        conn: &'a C,
        screen_num: usize,
        config: &Config,
        keys: &KeyHandler,
    ) -> Result<Self, ReplyOrIdError> {
        let screen = &conn.setup().roots[screen_num];
        become_window_manager(conn, screen.root)?;

        log::trace!("screen num {screen_num} root {}", screen.root);

        let atoms = Atoms::new(conn, screen)?;
        let colors = Colors {
            focus: get_color_id(conn, screen, config.focus_color)?,
            normal: get_color_id(conn, screen, config.normal_color)?,
        };
        let cursors = load_cursors(conn, screen_num)?;

        let outline_gc = conn.generate_id()?;
        conn.create_gc(
            outline_gc,
            screen.root,
            &CreateGCAux::new()
                .function(GX::XOR)
                .subwindow_mode(SubwindowMode::INCLUDE_INFERIORS)
                .foreground(screen.white_pixel ^ screen.black_pixel)
                .line_width(config.border_size.max(1)),
        )?;

        let handler = ConnectionHandler {
            conn,
            screen,
            atoms,
            colors,
            cursors,
            outline_gc,
            border_size: config.border_size,
            drag_keys: keys.drag_keys(),
            deferred: RefCell::new(VecDeque::new()),
        };

        handler.grab_keys(keys)?;
        handler.set_cursor()?;
        handler.add_heartbeat_window()?;
        Ok(handler)
    }

    /// Takes the oldest event that was set aside during a drag.
    pub fn take_deferred(&self) -> Option<Event> {
        self.deferred.borrow_mut().pop_front()
    }

    /// Gets the rectangles of the physical screens from RandR, falling back to the size of the root window.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn screen_rects(&self) -> Result<Vec<Rect>, ReplyOrIdError> {
        use x11rb::protocol::randr::ConnectionExt as _;

        let monitors = match self.conn.randr_get_monitors(self.screen.root, true) {
            Ok(cookie) => cookie.reply().map(|r| r.monitors).unwrap_or_default(),
            Err(e) => {
                log::debug!("randr unavailable {e:?}");
                Vec::new()
            }
        };
        let rects: Vec<Rect> = monitors
            .iter()
            .map(|m| {
                Rect::new(
                    i32::from(m.x),
                    i32::from(m.y),
                    i32::from(m.width),
                    i32::from(m.height),
                )
            })
            .collect();

        if rects.is_empty() {
            Ok(vec![self.root_rect()])
        } else {
            log::info!("found {} screens", rects.len());
            Ok(rects)
        }
    }

    /// Gets the rectangle of the root window.
    #[must_use]
    pub fn root_rect(&self) -> Rect {
        Rect::new(
            0,
            0,
            i32::from(self.screen.width_in_pixels),
            i32::from(self.screen.height_in_pixels),
        )
    }

    /// Gets the windows that already exist, so they can be managed on startup.
    /// # Errors
    /// Returns an error if the tree couldn't be queried.
    pub fn existing_windows(&self) -> Result<Vec<Window>, ReplyOrIdError> {
        let tree = self.conn.query_tree(self.screen.root)?.reply()?;
        let mut windows = Vec::new();
        for window in tree.children {
            let attrs = self.conn.get_window_attributes(window)?.reply()?;
            if !attrs.override_redirect && attrs.map_state == x11rb::protocol::xproto::MapState::VIEWABLE {
                windows.push(window);
            }
        }
        Ok(windows)
    }

    /// Grabs keys and buttons defined in configuration so that the event handler can later detect when they are pressed.
    fn grab_keys(&self, handler: &KeyHandler) -> Res {
        handler.hotkeys.iter().try_for_each(|h| {
            self.conn
                .grab_key(
                    true,
                    self.screen.root,
                    h.modifier,
                    h.code,
                    GrabMode::ASYNC,
                    GrabMode::ASYNC,
                )?
                .check()
        })?;
        handler.buttons.iter().try_for_each(|b| {
            self.conn
                .grab_button(
                    false,
                    self.screen.root,
                    EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
                    GrabMode::ASYNC,
                    GrabMode::ASYNC,
                    NONE,
                    NONE,
                    ButtonIndex::from(b.button),
                    b.modifier,
                )?
                .check()
        })?;
        Ok(())
    }

    /// Sets the cursor to be the default left pointer.
    ///
    /// Without this the root window would display an X cursor.
    fn set_cursor(&self) -> Res {
        self.conn.change_window_attributes(
            self.screen.root,
            &ChangeWindowAttributesAux::new().cursor(self.cursors.normal),
        )?;
        Ok(())
    }

    /// Adds a "heartbeat" window.
    ///
    /// Heartbeat windows act as a check that an EWMH compliant window manager is running. They do not have to be mapped and only exist to verify EWMH compliance.
    fn add_heartbeat_window(&self) -> Res {
        let proof_window_id = self.conn.generate_id()?;

        self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            proof_window_id,
            self.screen.root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            0,
            &CreateWindowAux::new(),
        )?;

        self.atoms.change_window_prop(
            self.screen.root,
            self.atoms.net_supporting_wm_check,
            &[proof_window_id],
        )?;
        self.atoms.change_window_prop(
            proof_window_id,
            self.atoms.net_supporting_wm_check,
            &[proof_window_id],
        )?;
        self.atoms
            .change_utf8_prop(proof_window_id, self.atoms.net_wm_name, &["tessera"])?;
        Ok(())
    }

    fn read_string(&self, window: Window, property: impl Into<Atom>, type_: impl Into<Atom>) -> Result<String, ReplyOrIdError> {
        let value = self
            .conn
            .get_property(false, window, property, type_, 0, 256)?
            .reply()?
            .value;
        Ok(String::from_utf8_lossy(&value)
            .trim_end_matches('\0')
            .to_owned())
    }

    fn read_window_type(&self, window: Window) -> Result<ClientType, ReplyOrIdError> {
        let atoms = &self.atoms;
        let types = atoms.get_property32(window, atoms.net_wm_window_type, AtomEnum::ATOM)?;
        Ok(types
            .iter()
            .find_map(|&t| match t {
                t if t == atoms.net_wm_window_type_dialog => Some(ClientType::Dialog),
                t if t == atoms.net_wm_window_type_dock => Some(ClientType::Dock),
                t if t == atoms.net_wm_window_type_desktop => Some(ClientType::Desktop),
                t if t == atoms.net_wm_window_type_toolbar => Some(ClientType::Toolbar),
                t if t == atoms.net_wm_window_type_splash => Some(ClientType::Splash),
                t if t == atoms.net_wm_window_type_normal => Some(ClientType::Normal),
                _ => None,
            })
            .unwrap_or_default())
    }

    fn state_atoms(&self, modes: ModeFlags) -> Vec<Atom> {
        [
            (ModeFlags::FULL, self.atoms.net_wm_state_fullscreen),
            (ModeFlags::FLOAT, self.atoms.net_wm_state_above),
            (ModeFlags::STICK, self.atoms.net_wm_state_sticky),
            (ModeFlags::URGENT, self.atoms.net_wm_state_demands_attention),
        ]
        .into_iter()
        .filter(|(flag, _)| modes.contains(*flag))
        .map(|(_, atom)| atom)
        .collect()
    }

    /// Translates `_NET_WM_STATE` atoms into mode flags.
    #[must_use]
    pub fn modes_from_state_atoms(&self, atoms: &[Atom]) -> ModeFlags {
        atoms.iter().fold(ModeFlags::empty(), |acc, &atom| {
            acc | match atom {
                a if a == self.atoms.net_wm_state_fullscreen => ModeFlags::FULL,
                a if a == self.atoms.net_wm_state_above => ModeFlags::FLOAT,
                a if a == self.atoms.net_wm_state_sticky => ModeFlags::STICK,
                a if a == self.atoms.net_wm_state_demands_attention => ModeFlags::URGENT,
                _ => ModeFlags::empty(),
            }
        })
    }
}

impl<C: Connection> ConnectionStateExt for ConnectionHandler<'_, C> {
    fn manage_window(&self, window: Window) -> Res {
        log::trace!("managing window {window}");
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(
                EventMask::PROPERTY_CHANGE | EventMask::ENTER_WINDOW | EventMask::FOCUS_CHANGE,
            ),
        )?;
        self.conn.change_save_set(SetMode::INSERT, window)?;
        self.atoms
            .change_property32(window, self.atoms.wm_state, self.atoms.wm_state, &[1, 0])?;
        self.atoms.change_atom_prop(
            window,
            self.atoms.net_wm_allowed_actions,
            &[
                self.atoms.net_wm_action_fullscreen,
                self.atoms.net_wm_action_move,
                self.atoms.net_wm_action_resize,
                self.atoms.net_wm_action_close,
            ],
        )?;
        self.atoms.change_cardinal_prop(
            window,
            self.atoms.net_frame_extents,
            &[self.border_size; 4],
        )?;
        Ok(())
    }

    fn withdraw_window(&self, window: Window) -> Res {
        log::trace!("withdrawing window {window}");
        self.atoms
            .change_property32(window, self.atoms.wm_state, self.atoms.wm_state, &[0, 0])?;
        self.conn.change_save_set(SetMode::DELETE, window)?;
        Ok(())
    }

    fn configure_client(&self, client: &Client) -> Res {
        let geom = client.geom;
        log::trace!("configuring window {} to {geom} border {}", client.window, client.border);
        self.conn.configure_window(
            client.window,
            &ConfigureWindowAux::new()
                .x(geom.x)
                .y(geom.y)
                .width(geom.width.max(1) as u32)
                .height(geom.height.max(1) as u32)
                .border_width(client.border.max(0) as u32),
        )?;

        // ICCCM 4.1.5, a synthetic notify in root coordinates
        let event = ConfigureNotifyEvent {
            response_type: CONFIGURE_NOTIFY_EVENT,
            sequence: 0,
            event: client.window,
            window: client.window,
            above_sibling: NONE,
            x: geom.x as i16,
            y: geom.y as i16,
            width: geom.width.max(1) as u16,
            height: geom.height.max(1) as u16,
            border_width: client.border.max(0) as u16,
            override_redirect: false,
        };
        self.conn
            .send_event(false, client.window, EventMask::STRUCTURE_NOTIFY, event)?;
        Ok(())
    }

    fn map_client(&self, window: Window) -> Res {
        log::trace!("handling map of {window}");
        self.conn.map_window(window)?;
        Ok(())
    }

    fn unmap_client(&self, window: Window) -> Res {
        log::trace!("handling unmap of {window}");
        self.conn.unmap_window(window)?;
        Ok(())
    }

    fn set_border_focus(&self, window: Window, focused: bool) -> Res {
        let pixel = if focused {
            self.colors.focus
        } else {
            self.colors.normal
        };
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().border_pixel(pixel),
        )?;
        Ok(())
    }

    fn restack(&self, stacking: &[Window]) -> Res {
        stacking.iter().try_for_each(|&window| {
            self.conn.configure_window(
                window,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )?;
            Ok::<(), ReplyOrIdError>(())
        })
    }
}

impl<C: Connection> ConnectionActionExt for ConnectionHandler<'_, C> {
    fn read_window(&self, window: Window) -> Result<WindowInfo, ReplyOrIdError> {
        let attrs = self.conn.get_window_attributes(window)?.reply()?;
        let geometry = self.conn.get_geometry(window)?.reply()?;

        let (class, instance) = WmClass::get(self.conn, window)?
            .reply()?
            .map(|c| {
                (
                    String::from_utf8_lossy(c.class()).into_owned(),
                    String::from_utf8_lossy(c.instance()).into_owned(),
                )
            })
            .unwrap_or_default();
        let role = self.read_string(window, self.atoms.wm_window_role, AtomEnum::STRING)?;

        let protocols =
            self.atoms
                .get_property32(window, self.atoms.wm_protocols, AtomEnum::ATOM)?;
        let transient_for = self
            .atoms
            .get_property32(window, AtomEnum::WM_TRANSIENT_FOR.into(), AtomEnum::WINDOW)?
            .first()
            .copied()
            .filter(|&w| w != NONE && w != self.screen.root);
        let wm_hints = WmHints::get(self.conn, window)?.reply()?;
        let states = self
            .atoms
            .get_property32(window, self.atoms.net_wm_state, AtomEnum::ATOM)?;

        Ok(WindowInfo {
            geometry: Rect::new(
                i32::from(geometry.x),
                i32::from(geometry.y),
                i32::from(geometry.width),
                i32::from(geometry.height),
            ),
            override_redirect: attrs.override_redirect,
            props: WindowProps {
                class,
                instance,
                name: self.read_name(window)?,
                role: (!role.is_empty()).then_some(role),
            },
            hints: self.read_normal_hints(window)?,
            input: wm_hints.as_ref().and_then(|h| h.input).unwrap_or(true),
            urgent: wm_hints.as_ref().is_some_and(|h| h.urgent),
            group: wm_hints.as_ref().and_then(|h| h.window_group),
            take_focus: protocols.contains(&self.atoms.wm_take_focus),
            delete_window: protocols.contains(&self.atoms.wm_delete_window),
            transient_for,
            window_type: self.read_window_type(window)?,
            strut: self.read_strut(window)?,
            fullscreen: states.contains(&self.atoms.net_wm_state_fullscreen),
        })
    }

    fn read_normal_hints(&self, window: Window) -> Result<Option<NormalHints>, ReplyOrIdError> {
        let Some(hints) = WmSizeHints::get_normal_hints(self.conn, window)?.reply()? else {
            return Ok(None);
        };
        Ok(Some(NormalHints {
            position: hints.position.map(|(_, x, y)| (x, y)),
            size: hints.size.map(|(_, w, h)| (w, h)),
            min_size: hints.min_size,
            max_size: hints.max_size,
            base_size: hints.base_size,
            increment: hints.size_increment,
            aspect: hints.aspect.map(|(min, max)| {
                (
                    (min.numerator, min.denominator),
                    (max.numerator, max.denominator),
                )
            }),
        }))
    }

    fn read_wm_hints(&self, window: Window) -> Result<(bool, bool), ReplyOrIdError> {
        let hints = WmHints::get(self.conn, window)?.reply()?;
        Ok((
            hints.as_ref().and_then(|h| h.input).unwrap_or(true),
            hints.as_ref().is_some_and(|h| h.urgent),
        ))
    }

    fn read_strut(&self, window: Window) -> Result<Option<Strut>, ReplyOrIdError> {
        let mut values = self.atoms.get_property32(
            window,
            self.atoms.net_wm_strut_partial,
            AtomEnum::CARDINAL,
        )?;
        if values.len() < 4 {
            values =
                self.atoms
                    .get_property32(window, self.atoms.net_wm_strut, AtomEnum::CARDINAL)?;
        }
        Ok(match values.as_slice() {
            [left, right, top, bottom, ..] => Some(Strut {
                left: *left as i32,
                right: *right as i32,
                top: *top as i32,
                bottom: *bottom as i32,
            }),
            _ => None,
        })
    }

    fn read_name(&self, window: Window) -> Result<String, ReplyOrIdError> {
        log::trace!("getting window name of {window}");

        let result = self.read_string(window, self.atoms.net_wm_name, self.atoms.utf8_string)?;
        if result.is_empty() {
            self.read_string(window, AtomEnum::WM_NAME, AtomEnum::STRING)
        } else {
            Ok(result)
        }
    }

    fn focus_window(&self, window: Window, prefs: Prefs) -> Res {
        log::trace!("setting focus to: {window}");
        if prefs.contains(Prefs::INPUT) {
            self.conn
                .set_input_focus(InputFocus::POINTER_ROOT, window, CURRENT_TIME)?;
        }
        if prefs.contains(Prefs::TAKE_FOCUS) {
            self.conn.send_event(
                false,
                window,
                EventMask::NO_EVENT,
                ClientMessageEvent::new(
                    32,
                    window,
                    self.atoms.wm_protocols,
                    [self.atoms.wm_take_focus, CURRENT_TIME, 0, 0, 0],
                ),
            )?;
        }
        self.publish_active_window(Some(window))
    }

    fn focus_root(&self) -> Res {
        log::trace!("setting focus to root");
        self.conn
            .set_input_focus(InputFocus::POINTER_ROOT, self.screen.root, CURRENT_TIME)?;
        self.publish_active_window(None)
    }

    fn close_window(&self, window: Window) -> Res {
        log::trace!("closing window {window}");
        self.conn.send_event(
            false,
            window,
            EventMask::NO_EVENT,
            ClientMessageEvent::new(
                32,
                window,
                self.atoms.wm_protocols,
                [self.atoms.wm_delete_window, 0, 0, 0, 0],
            ),
        )?;
        Ok(())
    }

    fn kill_window(&self, window: Window) -> Res {
        log::trace!("killing window {window}");
        self.conn.kill_client(window)?;
        Ok(())
    }
}

impl<C: Connection> ConnectionAtomExt for ConnectionHandler<'_, C> {
    fn publish_client(&self, client: &Client, desktop: u32) -> Res {
        let (atoms, window) = (&self.atoms, client.window);
        log::trace!("publishing {client}");
        atoms.change_cardinal_prop(window, atoms.tessera_window_tags, &[client.tags.0])?;
        atoms.change_cardinal_prop(window, atoms.tessera_window_gravity, &[client.gravity as u32])?;
        atoms.change_cardinal_prop(window, atoms.tessera_window_screen, &[client.screen as u32])?;
        atoms.change_cardinal_prop(window, atoms.tessera_window_flags, &[client.modes.bits()])?;
        atoms.change_cardinal_prop(window, atoms.net_wm_desktop, &[desktop])?;
        atoms.change_atom_prop(window, atoms.net_wm_state, &self.state_atoms(client.modes))?;
        Ok(())
    }

    fn publish_client_lists(&self, clients: &[Window], stacking: &[Window]) -> Res {
        let root = self.screen.root;
        self.atoms
            .change_window_prop(root, self.atoms.net_client_list, clients)?;
        self.atoms
            .change_window_prop(root, self.atoms.net_client_list_stacking, stacking)?;
        Ok(())
    }

    fn publish_active_window(&self, window: Option<Window>) -> Res {
        self.atoms.change_window_prop(
            self.screen.root,
            self.atoms.net_active_window,
            &[window.unwrap_or(NONE)],
        )
    }

    fn publish_views(&self, names: &[String], current: usize) -> Res {
        let root = self.screen.root;
        self.atoms
            .change_cardinal_prop(root, self.atoms.net_number_of_desktops, &[names.len() as u32])?;
        self.atoms
            .change_utf8_prop(root, self.atoms.net_desktop_names, names)?;
        self.atoms
            .change_cardinal_prop(root, self.atoms.net_current_desktop, &[current as u32])?;
        Ok(())
    }

    fn publish_workarea(&self, areas: &[Rect]) -> Res {
        let data: Vec<u32> = areas
            .iter()
            .flat_map(|r| [r.x as u32, r.y as u32, r.width as u32, r.height as u32])
            .collect();
        self.atoms
            .change_cardinal_prop(self.screen.root, self.atoms.net_workarea, &data)
    }

    fn publish_catalogs(&self, gravities: &[String], tags: &[String]) -> Res {
        let root = self.screen.root;
        self.atoms
            .change_utf8_prop(root, self.atoms.tessera_gravity_list, gravities)?;
        self.atoms
            .change_utf8_prop(root, self.atoms.tessera_tag_list, tags)?;
        Ok(())
    }
}

impl<C: Connection> DragSource for ConnectionHandler<'_, C> {
    fn begin_drag(&self, mode: DragMode) -> Result<bool, ReplyOrIdError> {
        let cursor = match mode {
            DragMode::Move => self.cursors.moving,
            DragMode::Resize => self.cursors.sizing,
        };
        let pointer = self
            .conn
            .grab_pointer(
                false,
                self.screen.root,
                EventMask::POINTER_MOTION | EventMask::BUTTON_RELEASE,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                NONE,
                cursor,
                CURRENT_TIME,
            )?
            .reply()?;
        if pointer.status != GrabStatus::SUCCESS {
            log::warn!("pointer grab failed with {:?}", pointer.status);
            return Ok(false);
        }

        let keyboard = self
            .conn
            .grab_keyboard(false, self.screen.root, CURRENT_TIME, GrabMode::ASYNC, GrabMode::ASYNC)
            .map_err(ReplyOrIdError::from)
            .and_then(|cookie| cookie.reply().map_err(ReplyOrIdError::from));
        match keyboard {
            Ok(reply) if reply.status == GrabStatus::SUCCESS => (),
            Ok(reply) => {
                log::warn!("keyboard grab failed with {:?}", reply.status);
                self.conn.ungrab_pointer(CURRENT_TIME)?;
                return Ok(false);
            }
            Err(e) => {
                self.conn.ungrab_pointer(CURRENT_TIME)?;
                return Err(e);
            }
        }
        self.conn.grab_server()?;
        Ok(true)
    }

    fn end_drag(&self) -> Res {
        self.conn.ungrab_server()?;
        self.conn.ungrab_keyboard(CURRENT_TIME)?;
        self.conn.ungrab_pointer(CURRENT_TIME)?;
        Ok(())
    }

    fn query_pointer(&self) -> Result<(i32, i32), ReplyOrIdError> {
        let reply = self.conn.query_pointer(self.screen.root)?.reply()?;
        Ok((i32::from(reply.root_x), i32::from(reply.root_y)))
    }

    fn next_drag_event(&self, window: Window) -> Result<DragEvent, ReplyOrIdError> {
        loop {
            self.conn.flush()?;
            let event = self.conn.wait_for_event()?;
            match event {
                Event::MotionNotify(e) => {
                    return Ok(DragEvent::Motion {
                        x: i32::from(e.root_x),
                        y: i32::from(e.root_y),
                    });
                }
                Event::ButtonRelease(_) => return Ok(DragEvent::ButtonRelease),
                Event::KeyPress(e) => {
                    return Ok(DragEvent::Key(
                        self.drag_keys.get(&e.detail).copied().unwrap_or(DragKey::Other),
                    ));
                }
                Event::DestroyNotify(e) if e.window == window => {
                    self.deferred.borrow_mut().push_back(event);
                    return Ok(DragEvent::Destroyed);
                }
                _ => {
                    log::trace!("deferring event during drag");
                    self.deferred.borrow_mut().push_back(event);
                }
            }
        }
    }

    fn draw_outline(&self, rect: &Rect, border: i32) -> Res {
        let outline = Rectangle {
            x: (rect.x - border) as i16,
            y: (rect.y - border) as i16,
            width: (rect.width + 2 * border).max(1) as u16,
            height: (rect.height + 2 * border).max(1) as u16,
        };
        self.conn
            .poly_rectangle(self.screen.root, self.outline_gc, &[outline])?;
        Ok(())
    }
}

/// Spawns a shell command with the specified arguments.
///
/// May log an error if there was an issue with spawning a command.
pub fn spawn_command(command: &str) {
    match Command::new("sh").arg("-c").arg(command).spawn() {
        Ok(_) => (),
        Err(e) => log::error!("error when spawning command {e:?}"),
    }
}

/// Sets the event mask of the root window, and exits if another window manager is running.
fn become_window_manager<C: Connection>(conn: &C, root: u32) -> Res {
    let change = ChangeWindowAttributesAux::default().event_mask(
        EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::PROPERTY_CHANGE
            | EventMask::ENTER_WINDOW,
    );
    let result = conn.change_window_attributes(root, &change)?.check();

    if let Err(ReplyError::X11Error(ref error)) = result {
        if error.error_kind == ErrorKind::Access {
            log::error!("another wm is running");
            exit(1);
        }
    } else {
        log::info!("became window manager successfully");
    }
    Ok(())
}

/// Loads the normal, move and resize cursors from the cursor theme.
fn load_cursors<C: Connection>(conn: &C, screen_num: usize) -> Result<Cursors, ReplyOrIdError> {
    let handle = cursor::Handle::new(conn, screen_num, &resource_manager::new_from_default(conn)?)?
        .reply()?;
    Ok(Cursors {
        normal: handle.load_cursor(conn, "left_ptr")?,
        moving: handle.load_cursor(conn, "fleur")?,
        sizing: handle.load_cursor(conn, "sizing")?,
    })
}

/// Gets a pixel id from the specified RGB color.
fn get_color_id<C: Connection>(
    conn: &C,
    screen: &Screen,
    color: Color,
) -> Result<Id, ReplyOrIdError> {
    Ok(conn
        .alloc_color(screen.default_colormap, color.red, color.green, color.blue)?
        .reply()?
        .pixel)
}
