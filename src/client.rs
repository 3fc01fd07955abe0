//!
//! This module holds the record of a managed window: its geometry, its constraints, its mode flags and where it lives on every view.
use core::fmt;

use serde::{Deserialize, Serialize};
use x11rb::protocol::xproto::Window;

use crate::{
    geometry::{Rect, Strut},
    hints::{NormalHints, SizeConstraints},
    tags::{Tags, WindowProps},
};

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    /// The independently togglable visual modes of a client.
    pub struct ModeFlags: u32 {
        const FLOAT = 1 << 0;
        const FULL = 1 << 1;
        const STICK = 1 << 2;
        const URGENT = 1 << 3;
        /// Size constraints are not applied to the client.
        const RESIZE_LOCK = 1 << 4;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    /// Modes a client is never allowed to enter.
    pub struct PolicyFlags: u32 {
        const NO_FLOAT = 1 << 0;
        const NO_FULL = 1 << 1;
        const NO_STICK = 1 << 2;
        const NO_URGENT = 1 << 3;
    }
}

impl PolicyFlags {
    /// Gets the modes forbidden by the policy.
    #[must_use]
    pub fn forbidden(self) -> ModeFlags {
        let mut modes = ModeFlags::empty();
        modes.set(ModeFlags::FLOAT, self.contains(Self::NO_FLOAT));
        modes.set(ModeFlags::FULL, self.contains(Self::NO_FULL));
        modes.set(ModeFlags::STICK, self.contains(Self::NO_STICK));
        modes.set(ModeFlags::URGENT, self.contains(Self::NO_URGENT));
        modes
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    /// How a client wants to be focused and closed.
    pub struct Prefs: u32 {
        /// The input hint is set, the client accepts `SetInputFocus`.
        const INPUT = 1 << 0;
        /// The client supports `WM_TAKE_FOCUS`.
        const TAKE_FOCUS = 1 << 1;
        /// The client supports `WM_DELETE_WINDOW`.
        const DELETE_WINDOW = 1 << 2;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// The type of a client, set once when it is managed.
pub enum ClientType {
    #[default]
    Normal,
    Dialog,
    Dock,
    Desktop,
    Toolbar,
    Splash,
}

impl ClientType {
    /// Docks and desktops are never placed by gravity.
    #[must_use]
    pub const fn is_placed(self) -> bool {
        !matches!(self, Self::Dock | Self::Desktop)
    }

    /// Types that start out floating.
    #[must_use]
    pub const fn floats(self) -> bool {
        matches!(self, Self::Dialog | Self::Toolbar | Self::Splash)
    }
}

#[derive(Clone, Debug, Default)]
/// Everything read from a window's properties before it is managed.
pub struct WindowInfo {
    pub geometry: Rect,
    pub override_redirect: bool,
    pub props: WindowProps,
    pub hints: Option<NormalHints>,
    /// The `WM_HINTS` input field. Missing hints count as accepting input.
    pub input: bool,
    pub urgent: bool,
    pub group: Option<Window>,
    pub take_focus: bool,
    pub delete_window: bool,
    pub transient_for: Option<Window>,
    pub window_type: ClientType,
    pub strut: Option<Strut>,
    /// The window asked to start in fullscreen through `_NET_WM_STATE`.
    pub fullscreen: bool,
}

#[derive(Clone, Debug)]
/// A managed top level window.
pub struct Client {
    pub window: Window,
    pub geom: Rect,
    /// The floating geometry to return to when leaving fullscreen.
    pub saved_geom: Rect,
    pub border: i32,
    pub hints: Option<NormalHints>,
    pub constraints: SizeConstraints,
    pub modes: ModeFlags,
    pub policy: PolicyFlags,
    pub prefs: Prefs,
    pub client_type: ClientType,
    /// Set while the client is being destroyed.
    pub dead: bool,
    pub tags: Tags,
    /// The gravity of the active view.
    pub gravity: usize,
    /// The screen of the active view.
    pub screen: usize,
    /// The gravity of the client on every view.
    pub gravities: Vec<usize>,
    /// The screen of the client on every view.
    pub screens: Vec<usize>,
    pub props: WindowProps,
    pub transient_for: Option<Window>,
    pub group: Option<Window>,
    pub strut: Option<Strut>,
    pub mapped: bool,
    /// Unmaps issued by the manager that haven't been reported back yet.
    pub ignore_unmaps: u32,
}

impl Client {
    /// Creates a client from the properties of its window. Tags and views are filled in by the caller.
    #[must_use]
    pub fn new(window: Window, info: &WindowInfo, border: i32) -> Self {
        let mut prefs = Prefs::empty();
        prefs.set(Prefs::INPUT, info.input);
        prefs.set(Prefs::TAKE_FOCUS, info.take_focus);
        prefs.set(Prefs::DELETE_WINDOW, info.delete_window);

        Self {
            window,
            geom: info.geometry,
            saved_geom: info.geometry,
            border,
            hints: info.hints,
            constraints: SizeConstraints::default(),
            modes: ModeFlags::empty(),
            policy: PolicyFlags::empty(),
            prefs,
            client_type: info.window_type,
            dead: false,
            tags: Tags::DEFAULT,
            gravity: 0,
            screen: 0,
            gravities: Vec::new(),
            screens: Vec::new(),
            props: info.props.clone(),
            transient_for: info.transient_for,
            group: info.group,
            strut: info.strut,
            mapped: false,
            ignore_unmaps: 0,
        }
    }

    /// Resizes the per view slots to `count`, keeping existing entries and filling new ones with the given slot.
    pub fn resize_views(&mut self, count: usize, gravity: usize, screen: usize) {
        self.gravities.resize(count, gravity);
        self.screens.resize(count, screen);
    }

    /// Stores a slot for one view, or for every view when the client is sticky.
    pub fn set_slot(&mut self, view: usize, gravity: usize, screen: usize) {
        if self.modes.contains(ModeFlags::STICK) {
            self.gravities.fill(gravity);
            self.screens.fill(screen);
        } else if view < self.gravities.len() {
            self.gravities[view] = gravity;
            self.screens[view] = screen;
        }
    }

    /// Makes the slot of `view` the current one.
    pub fn select_view(&mut self, view: usize) {
        if let (Some(&gravity), Some(&screen)) = (self.gravities.get(view), self.screens.get(view)) {
            self.gravity = gravity;
            self.screen = screen;
        }
    }

    /// Splits a requested toggle into the modes to clear and the modes to set, dropping the ones the policy forbids.
    #[must_use]
    pub fn split_toggle(&self, requested: ModeFlags) -> (ModeFlags, ModeFlags) {
        let allowed = requested - self.policy.forbidden();
        (allowed & self.modes, allowed - self.modes)
    }

    /// Returns whether the client shows on a view. Sticky clients, docks and desktops show on all of them.
    #[must_use]
    pub fn is_visible_on(&self, view_tags: Tags) -> bool {
        !self.dead
            && (self.modes.contains(ModeFlags::STICK)
                || !self.client_type.is_placed()
                || self.tags.intersects(view_tags))
    }

    /// Returns whether the client is placed by gravity or tiles.
    #[must_use]
    pub fn is_arranged(&self) -> bool {
        self.client_type.is_placed() && !self.modes.intersects(ModeFlags::FLOAT | ModeFlags::FULL)
    }

    /// The stacking layer of the client. Higher layers stack above lower ones.
    #[must_use]
    pub fn layer(&self) -> u8 {
        if self.client_type == ClientType::Desktop {
            0
        } else if self.modes.contains(ModeFlags::FULL) {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id {} geom {} modes {:?} type {:?} tags {:?} gravity {} screen {}",
            self.window, self.geom, self.modes, self.client_type, self.tags, self.gravity, self.screen
        )
    }
}
