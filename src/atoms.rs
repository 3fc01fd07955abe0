//!
//! This module interns the atoms of the manager and wraps the property requests used with them.
use std::collections::HashMap;

use x11rb::{
    connection::Connection,
    errors::ReplyOrIdError,
    protocol::xproto::{Atom, AtomEnum, ConnectionExt, PropMode, Screen, Window},
    wrapper::ConnectionExt as _,
};

use crate::connection::Res;

/// The atoms the manager reads or writes.
pub struct Atoms<'a, C> {
    conn: &'a C,
    pub net_supported: Atom,
    pub net_client_list: Atom,
    pub net_client_list_stacking: Atom,
    pub net_number_of_desktops: Atom,
    pub net_desktop_geometry: Atom,
    pub net_desktop_viewport: Atom,
    pub net_desktop_names: Atom,
    pub net_current_desktop: Atom,
    pub net_active_window: Atom,
    pub net_workarea: Atom,
    pub net_supporting_wm_check: Atom,
    pub net_close_window: Atom,
    pub net_frame_extents: Atom,
    pub net_wm_name: Atom,
    pub net_wm_desktop: Atom,
    pub net_wm_strut: Atom,
    pub net_wm_strut_partial: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_fullscreen: Atom,
    pub net_wm_state_above: Atom,
    pub net_wm_state_sticky: Atom,
    pub net_wm_state_demands_attention: Atom,
    pub net_wm_window_type: Atom,
    pub net_wm_window_type_normal: Atom,
    pub net_wm_window_type_dialog: Atom,
    pub net_wm_window_type_dock: Atom,
    pub net_wm_window_type_desktop: Atom,
    pub net_wm_window_type_toolbar: Atom,
    pub net_wm_window_type_splash: Atom,
    pub net_wm_allowed_actions: Atom,
    pub net_wm_action_fullscreen: Atom,
    pub net_wm_action_move: Atom,
    pub net_wm_action_resize: Atom,
    pub net_wm_action_close: Atom,
    pub utf8_string: Atom,
    pub wm_protocols: Atom,
    pub wm_state: Atom,
    pub wm_delete_window: Atom,
    pub wm_take_focus: Atom,
    pub wm_window_role: Atom,
    pub tessera_window_tags: Atom,
    pub tessera_window_gravity: Atom,
    pub tessera_window_screen: Atom,
    pub tessera_window_flags: Atom,
    pub tessera_window_tag: Atom,
    pub tessera_window_untag: Atom,
    pub tessera_gravity_list: Atom,
    pub tessera_tag_list: Atom,
}

/// Atoms advertised in `_NET_SUPPORTED`. Everything after them is only used internally.
const SUPPORTED: &[&str] = &[
    "_NET_SUPPORTED",
    "_NET_CLIENT_LIST",
    "_NET_CLIENT_LIST_STACKING",
    "_NET_NUMBER_OF_DESKTOPS",
    "_NET_DESKTOP_GEOMETRY",
    "_NET_DESKTOP_VIEWPORT",
    "_NET_DESKTOP_NAMES",
    "_NET_CURRENT_DESKTOP",
    "_NET_ACTIVE_WINDOW",
    "_NET_WORKAREA",
    "_NET_SUPPORTING_WM_CHECK",
    "_NET_CLOSE_WINDOW",
    "_NET_FRAME_EXTENTS",
    "_NET_WM_NAME",
    "_NET_WM_DESKTOP",
    "_NET_WM_STRUT",
    "_NET_WM_STRUT_PARTIAL",
    "_NET_WM_STATE",
    "_NET_WM_STATE_FULLSCREEN",
    "_NET_WM_STATE_ABOVE",
    "_NET_WM_STATE_STICKY",
    "_NET_WM_STATE_DEMANDS_ATTENTION",
    "_NET_WM_WINDOW_TYPE",
    "_NET_WM_WINDOW_TYPE_NORMAL",
    "_NET_WM_WINDOW_TYPE_DIALOG",
    "_NET_WM_WINDOW_TYPE_DOCK",
    "_NET_WM_WINDOW_TYPE_DESKTOP",
    "_NET_WM_WINDOW_TYPE_TOOLBAR",
    "_NET_WM_WINDOW_TYPE_SPLASH",
    "_NET_WM_ALLOWED_ACTIONS",
    "_NET_WM_ACTION_FULLSCREEN",
    "_NET_WM_ACTION_MOVE",
    "_NET_WM_ACTION_RESIZE",
    "_NET_WM_ACTION_CLOSE",
];

const INTERNAL: &[&str] = &[
    "UTF8_STRING",
    "WM_PROTOCOLS",
    "WM_STATE",
    "WM_DELETE_WINDOW",
    "WM_TAKE_FOCUS",
    "WM_WINDOW_ROLE",
    "_TESSERA_WINDOW_TAGS",
    "_TESSERA_WINDOW_GRAVITY",
    "_TESSERA_WINDOW_SCREEN",
    "_TESSERA_WINDOW_FLAGS",
    "_TESSERA_WINDOW_TAG",
    "_TESSERA_WINDOW_UNTAG",
    "_TESSERA_GRAVITY_LIST",
    "_TESSERA_TAG_LIST",
];

impl<'a, C: Connection> Atoms<'a, C> {
    /// Interns all atoms and advertises the supported ones on the root window.
    ///
    /// # Errors
    /// Returns an error if an atom couldn't be interned.
    pub fn new(conn: &'a C, screen: &Screen) -> Result<Self, ReplyOrIdError> {
        let atom_strings: Vec<&str> = SUPPORTED.iter().chain(INTERNAL).copied().collect();
        let atom_nums = get_atom_nums(conn, &atom_strings)?;
        let atoms = get_atom_mapping(&atom_strings, &atom_nums);
        let atom = |name: &str| atoms.get(name).copied().unwrap_or_default();

        let new_self = Self {
            conn,
            net_supported: atom("_NET_SUPPORTED"),
            net_client_list: atom("_NET_CLIENT_LIST"),
            net_client_list_stacking: atom("_NET_CLIENT_LIST_STACKING"),
            net_number_of_desktops: atom("_NET_NUMBER_OF_DESKTOPS"),
            net_desktop_geometry: atom("_NET_DESKTOP_GEOMETRY"),
            net_desktop_viewport: atom("_NET_DESKTOP_VIEWPORT"),
            net_desktop_names: atom("_NET_DESKTOP_NAMES"),
            net_current_desktop: atom("_NET_CURRENT_DESKTOP"),
            net_active_window: atom("_NET_ACTIVE_WINDOW"),
            net_workarea: atom("_NET_WORKAREA"),
            net_supporting_wm_check: atom("_NET_SUPPORTING_WM_CHECK"),
            net_close_window: atom("_NET_CLOSE_WINDOW"),
            net_frame_extents: atom("_NET_FRAME_EXTENTS"),
            net_wm_name: atom("_NET_WM_NAME"),
            net_wm_desktop: atom("_NET_WM_DESKTOP"),
            net_wm_strut: atom("_NET_WM_STRUT"),
            net_wm_strut_partial: atom("_NET_WM_STRUT_PARTIAL"),
            net_wm_state: atom("_NET_WM_STATE"),
            net_wm_state_fullscreen: atom("_NET_WM_STATE_FULLSCREEN"),
            net_wm_state_above: atom("_NET_WM_STATE_ABOVE"),
            net_wm_state_sticky: atom("_NET_WM_STATE_STICKY"),
            net_wm_state_demands_attention: atom("_NET_WM_STATE_DEMANDS_ATTENTION"),
            net_wm_window_type: atom("_NET_WM_WINDOW_TYPE"),
            net_wm_window_type_normal: atom("_NET_WM_WINDOW_TYPE_NORMAL"),
            net_wm_window_type_dialog: atom("_NET_WM_WINDOW_TYPE_DIALOG"),
            net_wm_window_type_dock: atom("_NET_WM_WINDOW_TYPE_DOCK"),
            net_wm_window_type_desktop: atom("_NET_WM_WINDOW_TYPE_DESKTOP"),
            net_wm_window_type_toolbar: atom("_NET_WM_WINDOW_TYPE_TOOLBAR"),
            net_wm_window_type_splash: atom("_NET_WM_WINDOW_TYPE_SPLASH"),
            net_wm_allowed_actions: atom("_NET_WM_ALLOWED_ACTIONS"),
            net_wm_action_fullscreen: atom("_NET_WM_ACTION_FULLSCREEN"),
            net_wm_action_move: atom("_NET_WM_ACTION_MOVE"),
            net_wm_action_resize: atom("_NET_WM_ACTION_RESIZE"),
            net_wm_action_close: atom("_NET_WM_ACTION_CLOSE"),
            utf8_string: atom("UTF8_STRING"),
            wm_protocols: atom("WM_PROTOCOLS"),
            wm_state: atom("WM_STATE"),
            wm_delete_window: atom("WM_DELETE_WINDOW"),
            wm_take_focus: atom("WM_TAKE_FOCUS"),
            wm_window_role: atom("WM_WINDOW_ROLE"),
            tessera_window_tags: atom("_TESSERA_WINDOW_TAGS"),
            tessera_window_gravity: atom("_TESSERA_WINDOW_GRAVITY"),
            tessera_window_screen: atom("_TESSERA_WINDOW_SCREEN"),
            tessera_window_flags: atom("_TESSERA_WINDOW_FLAGS"),
            tessera_window_tag: atom("_TESSERA_WINDOW_TAG"),
            tessera_window_untag: atom("_TESSERA_WINDOW_UNTAG"),
            tessera_gravity_list: atom("_TESSERA_GRAVITY_LIST"),
            tessera_tag_list: atom("_TESSERA_TAG_LIST"),
        };
        new_self.setup_atoms(screen, &atom_nums[..SUPPORTED.len()])?;
        Ok(new_self)
    }

    fn setup_atoms(&self, screen: &Screen, supported: &[Atom]) -> Res {
        self.change_atom_prop(screen.root, self.net_supported, supported)?;
        self.change_cardinal_prop(
            screen.root,
            self.net_desktop_geometry,
            &[
                u32::from(screen.width_in_pixels),
                u32::from(screen.height_in_pixels),
            ],
        )?;
        self.change_cardinal_prop(screen.root, self.net_desktop_viewport, &[0, 0])?;
        Ok(())
    }

    /// Reads a property in 32 bit format. A missing property reads as empty.
    ///
    /// # Errors
    /// Returns an error if the window doesn't exist.
    pub fn get_property32(
        &self,
        window: Window,
        property: Atom,
        type_: impl Into<Atom>,
    ) -> Result<Vec<u32>, ReplyOrIdError> {
        Ok(self
            .conn
            .get_property(false, window, property, type_, 0, 1024)?
            .reply()?
            .value32()
            .map(Iterator::collect)
            .unwrap_or_default())
    }

    pub fn change_property32(
        &self,
        window: Window,
        property: Atom,
        type_: impl Into<Atom>,
        data: &[u32],
    ) -> Res {
        self.conn
            .change_property32(PropMode::REPLACE, window, property, type_, data)?;
        Ok(())
    }

    pub fn change_atom_prop(&self, window: Window, property: Atom, data: &[u32]) -> Res {
        self.change_property32(window, property, AtomEnum::ATOM, data)
    }

    pub fn change_window_prop(&self, window: Window, property: Atom, data: &[u32]) -> Res {
        self.change_property32(window, property, AtomEnum::WINDOW, data)
    }

    pub fn change_cardinal_prop(&self, window: Window, property: Atom, data: &[u32]) -> Res {
        self.change_property32(window, property, AtomEnum::CARDINAL, data)
    }

    /// Writes a list of strings as a null separated `UTF8_STRING` property.
    pub fn change_utf8_prop<S: AsRef<str>>(&self, window: Window, property: Atom, items: &[S]) -> Res {
        let data: Vec<u8> = items
            .iter()
            .flat_map(|s| s.as_ref().bytes().chain([0]))
            .collect();
        self.conn.change_property8(
            PropMode::REPLACE,
            window,
            property,
            self.utf8_string,
            &data,
        )?;
        Ok(())
    }
}

fn get_atom_mapping(atom_strings: &[&str], atom_nums: &[u32]) -> HashMap<String, u32> {
    atom_strings
        .iter()
        .map(std::string::ToString::to_string)
        .zip(atom_nums.iter().copied())
        .collect()
}

/// Interns all atoms, sending every request before waiting for the first reply.
fn get_atom_nums<C: Connection>(
    conn: &C,
    atom_strings: &[&str],
) -> Result<Vec<u32>, ReplyOrIdError> {
    let cookies = atom_strings
        .iter()
        .map(|s| conn.intern_atom(false, s.as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;
    cookies
        .into_iter()
        .map(|c| -> Result<u32, ReplyOrIdError> { Ok(c.reply()?.atom) })
        .collect()
}
