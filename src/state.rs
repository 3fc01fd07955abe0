//!
//! This module manages the state using the `StateHandler` struct. It routes new windows, places clients, keeps their modes consistent and decides what is visible on the active view.
//!
//! Every operation that changes the server takes the connection as a `ManagerConnection`, so the whole engine can run against a recording connection.
use std::collections::HashMap;

use x11rb::protocol::xproto::Window;

use crate::{
    client::{Client, ClientType, ModeFlags, PolicyFlags, Prefs},
    config::{Config, Layout},
    connection::{ManagerConnection, Res},
    drag::{Drag, DragMode, DragResult, run_drag},
    geometry::{
        Direction, GRAVITY_UNKNOWN, GravityCatalog, Rect, Screen, Strut, fit, gravity_rect,
        nearest,
    },
    hints::{SizeConstraints, initial_float_geometry},
    registry::Registry,
    tags::{MAX_TAGS, MatchFields, TagRule, Tags, View, route, slots},
    tile::{Axis, TileTree},
};

/// Parameters that help with placing windows. Values are obtained from configuration.
pub struct PlacementInfo {
    /// The border of every client that isn't fullscreen, a dock or a desktop.
    pub border: i32,
    /// The gap between a window and the edges of its gravity or tile.
    pub gap: i32,
    pub snap: i32,
    pub step: i32,
    pub collapsed_size: i32,
    /// The gravity of new clients, `0` to inherit the gravity of the focused client.
    pub default_gravity: usize,
    pub layout: Layout,
    pub urgent_transients: bool,
}

/// Computes the geometry and border a client should have on `screen`. `cell` is the tile of the client when the view is tiled.
fn target(
    client: &Client,
    screen: &Screen,
    gravities: &GravityCatalog,
    placement: &PlacementInfo,
    cell: Option<Rect>,
) -> (Rect, i32) {
    if client.modes.contains(ModeFlags::FULL) || client.client_type == ClientType::Desktop {
        return (screen.base, 0);
    }
    if client.client_type == ClientType::Dock {
        return (client.geom, 0);
    }

    let border = placement.border;
    let rect = if client.modes.contains(ModeFlags::FLOAT) {
        client.geom
    } else if let Some(cell) = cell {
        gravity_rect(gravities.get(GRAVITY_UNKNOWN), &cell, border, placement.gap)
    } else {
        gravity_rect(
            gravities.get(client.gravity),
            &screen.work,
            border,
            placement.gap,
        )
    };

    let rect = if client.modes.contains(ModeFlags::RESIZE_LOCK) {
        rect
    } else {
        let (width, height) = client.constraints.apply(rect.width, rect.height);
        Rect {
            width,
            height,
            ..rect
        }
    };
    (fit(rect, border, &screen.work), border)
}

/// A manager for client, view and screen states. Places windows and provides methods to manipulate the state.
pub struct StateHandler {
    pub registry: Registry,
    /// The physical screens, never empty.
    pub screens: Vec<Screen>,
    root: Rect,
    pub views: Vec<View>,
    pub active_view: usize,
    gravities: GravityCatalog,
    rules: Vec<TagRule>,
    pub placement: PlacementInfo,
    /// The focused client.
    pub focus: Option<Window>,
    /// One tile tree per view, only used with the tiling layout.
    tiles: Vec<TileTree>,
}

impl StateHandler {
    /// Creates a new state from the configuration and the rectangles of the screens.
    #[must_use]
    pub fn new(config: &Config, screens: Vec<Rect>, root: Rect) -> Self {
        let screens = if screens.is_empty() {
            vec![Screen::new(root)]
        } else {
            screens.into_iter().map(Screen::new).collect()
        };
        Self {
            registry: Registry::default(),
            screens,
            root,
            tiles: config
                .views
                .iter()
                .map(|_| TileTree::new(Axis::Horizontal))
                .collect(),
            views: config.views.clone(),
            active_view: 0,
            gravities: config.gravities.clone(),
            rules: config.rules.clone(),
            placement: PlacementInfo {
                border: config.border_size as i32,
                gap: config.gap,
                snap: config.snap,
                step: config.step,
                collapsed_size: config.collapsed_size,
                default_gravity: config.default_gravity,
                layout: config.layout,
                urgent_transients: config.urgent_transients,
            },
            focus: None,
        }
    }

    /// Gets a live client.
    #[must_use]
    pub fn client(&self, window: Window) -> Option<&Client> {
        self.registry.get(window).filter(|c| !c.dead)
    }

    fn client_mut(&mut self, window: Window) -> Option<&mut Client> {
        self.registry.get_mut(window).filter(|c| !c.dead)
    }

    fn view_tags(&self) -> Tags {
        self.views
            .get(self.active_view)
            .map_or(Tags::NONE, |v| v.tags)
    }

    fn clamp_screen(&self, index: usize) -> usize {
        index.min(self.screens.len() - 1)
    }

    fn screen(&self, index: usize) -> Screen {
        self.screens[self.clamp_screen(index)]
    }

    /// Gets the screen the center of `rect` lies on.
    fn screen_at(&self, rect: &Rect) -> usize {
        let (x, y) = rect.center();
        self.screens
            .iter()
            .position(|s| s.base.contains_point(x, y))
            .unwrap_or(0)
    }

    /// The view a client is published on. Sticky clients, docks and desktops are on all of them.
    fn desktop_of(&self, client: &Client) -> u32 {
        if client.modes.contains(ModeFlags::STICK) || !client.client_type.is_placed() {
            return u32::MAX;
        }
        self.views
            .iter()
            .position(|v| client.tags.intersects(v.tags))
            .unwrap_or(self.active_view) as u32
    }

    /// The gravity and screen of a new client on views no rule decided for.
    fn default_slot(&self, geometry: &Rect) -> (usize, usize) {
        let focused = self.focus.and_then(|w| self.client(w));
        let gravity = match self.placement.default_gravity {
            0 => focused.map_or(GRAVITY_UNKNOWN, |c| c.gravity),
            g => g,
        };
        let screen = focused.map_or_else(|| self.screen_at(geometry), |c| c.screen);
        (gravity, screen)
    }

    /// Starts managing a window.
    ///
    /// The window is routed through the tag rules, unless it is transient for or in the group of a managed client, in which case it copies the tags, stickiness and slots of that client.
    /// # Errors
    /// Returns an error if the properties of the window can't be read or the connection failed.
    pub fn manage(&mut self, conn: &impl ManagerConnection, window: Window) -> Res {
        if self.registry.contains(window) {
            log::debug!("window {window} is already managed");
            return Ok(());
        }
        let info = conn.read_window(window)?;
        if info.override_redirect {
            return Ok(());
        }

        let border = self.placement.border;
        let mut client = Client::new(window, &info, border);
        let routing = route(&info.props, &self.rules, &self.views);
        let (default_gravity, default_screen) = self.default_slot(&info.geometry);

        client.policy = routing.policy;
        client.client_type = routing.client_type.unwrap_or(info.window_type);
        let mut modes = routing.modes;

        let parent = [info.transient_for, info.group.filter(|&g| g != window)]
            .into_iter()
            .flatten()
            .find_map(|w| self.client(w));
        if let Some(parent) = parent {
            log::debug!("window {window} follows {}", parent.window);
            client.tags = parent.tags;
            client.gravities.clone_from(&parent.gravities);
            client.screens.clone_from(&parent.screens);
            modes |= parent.modes & ModeFlags::STICK;
        } else {
            client.tags = routing.tags;
            client.gravities = routing
                .slots
                .iter()
                .map(|s| s.gravity.unwrap_or(default_gravity))
                .collect();
            client.screens = routing
                .slots
                .iter()
                .map(|s| s.screen.map_or(default_screen, |i| self.clamp_screen(i)))
                .collect();
        }
        client.resize_views(self.views.len(), default_gravity, default_screen);

        if client.client_type.floats() || info.transient_for.is_some() {
            modes |= ModeFlags::FLOAT;
        }
        if info.fullscreen {
            modes |= ModeFlags::FULL;
        }
        if info.urgent || (info.transient_for.is_some() && self.placement.urgent_transients) {
            modes |= ModeFlags::URGENT;
        }
        client.modes = modes;
        client.select_view(self.active_view);
        if client.modes.contains(ModeFlags::STICK) {
            let (gravity, screen) = (client.gravity, client.screen);
            client.set_slot(self.active_view, gravity, screen);
        }

        let work = self.screen(client.screen).work;
        client.constraints = SizeConstraints::resolve(info.hints.as_ref(), &work, border);
        if client.constraints.fixed {
            client.modes |= ModeFlags::FLOAT;
            client.client_type = ClientType::Dialog;
        }
        client.modes -= client.policy.forbidden();

        if let Some(geometry) = routing.geometry {
            client.geom = geometry;
        } else if client.modes.contains(ModeFlags::FLOAT) {
            client.geom = initial_float_geometry(
                info.hints.as_ref(),
                &client.constraints,
                info.geometry,
                border,
                &work,
            );
        }
        client.saved_geom = client.geom;

        log::info!("managing {client}");
        let has_strut = client.strut.is_some();
        conn.manage_window(window)?;
        conn.set_border_focus(window, false)?;
        self.registry.insert(client);
        self.retile(window);

        if has_strut {
            self.update_struts(conn)?;
        }
        self.arrange(conn)?;
        self.focus(conn, Some(window))
    }

    /// Stops managing a window. Windows that weren't destroyed are withdrawn.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn unmanage(&mut self, conn: &impl ManagerConnection, window: Window, destroyed: bool) -> Res {
        let Some(client) = self.registry.get_mut(window) else {
            return Ok(());
        };
        client.dead = true;
        for tree in &mut self.tiles {
            tree.remove_window(window);
        }
        let Some(client) = self.registry.remove(window) else {
            return Ok(());
        };
        log::info!("unmanaging {client}");

        if !destroyed {
            conn.withdraw_window(window)?;
        }
        let lost_focus = self.focus == Some(window);
        if lost_focus {
            self.focus = None;
        }
        if client.strut.is_some() {
            self.update_struts(conn)?;
        }
        self.arrange(conn)?;
        if lost_focus && self.focus.is_none() {
            conn.focus_root()?;
        }
        Ok(())
    }

    /// Handles an unmap, which unmanages the client unless the manager caused it.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn unmap_notify(&mut self, conn: &impl ManagerConnection, window: Window) -> Res {
        let Some(client) = self.registry.get_mut(window) else {
            return Ok(());
        };
        if client.ignore_unmaps > 0 {
            client.ignore_unmaps -= 1;
            return Ok(());
        }
        self.unmanage(conn, window, false)
    }

    /// Keeps the tile trees in line with a client, adding it to the tree of every view it is arranged on.
    fn retile(&mut self, window: Window) {
        if self.placement.layout != Layout::Tiling {
            return;
        }
        let Some(client) = self.registry.get(window) else {
            return;
        };
        for (tree, view) in self.tiles.iter_mut().zip(&self.views) {
            if !client.dead && client.is_arranged() && client.is_visible_on(view.tags) {
                tree.add_window(window);
            } else {
                tree.remove_window(window);
            }
        }
    }

    /// Resolves the constraints and geometry of a client and pushes them to the server.
    fn place(&mut self, conn: &impl ManagerConnection, window: Window, cell: Option<Rect>) -> Res {
        let Some(index) = self.client(window).map(|c| c.screen) else {
            return Ok(());
        };
        let screen = self.screen(index);
        let border = self.placement.border;
        let Some(client) = self.registry.get_mut(window) else {
            return Ok(());
        };

        client.constraints = SizeConstraints::resolve(client.hints.as_ref(), &screen.work, border);
        let (geom, border) = target(client, &screen, &self.gravities, &self.placement, cell);
        if client.client_type.is_placed()
            && !client.modes.contains(ModeFlags::RESIZE_LOCK)
            && !client.constraints.accepts(geom.width, geom.height)
        {
            log::debug!("size hints of {window} don't fit into {}", screen.work);
        }
        client.geom = geom;
        client.border = border;
        conn.configure_client(client)
    }

    /// Places every client visible on the active view and hides the others.
    ///
    /// Afterwards the focus is moved to a visible client if needed, the stacking order is pushed and the state is published.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn arrange(&mut self, conn: &impl ManagerConnection) -> Res {
        let view = self.active_view;
        let view_tags = self.view_tags();
        let cells: Vec<HashMap<Window, Rect>> = match (self.placement.layout, self.tiles.get(view)) {
            (Layout::Tiling, Some(tree)) => self
                .screens
                .iter()
                .map(|s| {
                    tree.layout(s.work, self.placement.collapsed_size)
                        .into_iter()
                        .collect()
                })
                .collect(),
            _ => Vec::new(),
        };

        for window in self.registry.windows() {
            let (visible, screen) = match self.registry.get_mut(window) {
                Some(client) => {
                    client.select_view(view);
                    (client.is_visible_on(view_tags), client.screen)
                }
                None => continue,
            };

            if visible {
                let cell = cells
                    .get(self.clamp_screen(screen))
                    .and_then(|c| c.get(&window))
                    .copied();
                self.place(conn, window, cell)?;
                if let Some(client) = self.registry.get_mut(window) {
                    if !client.mapped {
                        client.mapped = true;
                        conn.map_client(window)?;
                    }
                }
            } else if let Some(client) = self.registry.get_mut(window) {
                if client.mapped {
                    client.mapped = false;
                    client.ignore_unmaps += 1;
                    conn.unmap_client(window)?;
                }
            }
        }

        self.fix_focus(conn)?;
        conn.restack(&self.registry.stacking())?;
        self.publish(conn)?;
        self.log_state();
        Ok(())
    }

    /// Moves the focus to the topmost visible client when the focused one went away.
    fn fix_focus(&mut self, conn: &impl ManagerConnection) -> Res {
        let view_tags = self.view_tags();
        if self
            .focus
            .and_then(|w| self.client(w))
            .is_some_and(|c| c.is_visible_on(view_tags))
        {
            return Ok(());
        }
        let next = self.registry.stacking().into_iter().rev().find(|&w| {
            self.client(w)
                .is_some_and(|c| c.is_visible_on(view_tags) && c.client_type.is_placed())
        });
        match next {
            Some(_) => self.focus(conn, next),
            None => Ok(()),
        }
    }

    /// Focuses a visible client, or the root window for `None`. Docks and desktops never get the focus.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn focus(&mut self, conn: &impl ManagerConnection, window: Option<Window>) -> Res {
        let view_tags = self.view_tags();
        let target = window.filter(|&w| {
            self.client(w)
                .is_some_and(|c| c.is_visible_on(view_tags) && c.client_type.is_placed())
        });
        if window.is_some() && target.is_none() {
            return Ok(());
        }
        if target.is_some() && target == self.focus {
            return Ok(());
        }

        if let Some(old) = self.focus.filter(|&w| self.client(w).is_some()) {
            conn.set_border_focus(old, false)?;
        }
        self.focus = target;
        log::debug!("focus moves to {target:?}");

        match target {
            Some(w) => {
                let prefs = self.client(w).map_or(Prefs::INPUT, |c| c.prefs);
                conn.set_border_focus(w, true)?;
                conn.focus_window(w, prefs)
            }
            None => conn.focus_root(),
        }
    }

    /// Toggles modes of a client.
    ///
    /// Modes forbidden by the policy are dropped. Set modes are cleared and unset modes are set, each with its side effects, and the client is placed again.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn toggle(&mut self, conn: &impl ManagerConnection, window: Window, requested: ModeFlags) -> Res {
        let Some(index) = self.client(window).map(|c| c.screen) else {
            return Ok(());
        };
        let work = self.screen(index).work;
        let (view, border) = (self.active_view, self.placement.border);
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };

        let (clear, set) = client.split_toggle(requested);
        if clear.is_empty() && set.is_empty() {
            return Ok(());
        }
        log::debug!("toggling {window}: clearing {clear:?} setting {set:?}");

        client.modes -= clear;
        if clear.contains(ModeFlags::FULL) && client.modes.contains(ModeFlags::FLOAT) {
            client.geom = client.saved_geom;
        }

        if set.contains(ModeFlags::FLOAT) {
            client.geom = initial_float_geometry(
                client.hints.as_ref(),
                &client.constraints,
                client.geom,
                border,
                &work,
            );
        }
        if set.contains(ModeFlags::FULL) {
            client.saved_geom = client.geom;
        } else if set.contains(ModeFlags::FLOAT) {
            client.saved_geom = client.geom;
        }
        client.modes |= set;

        if set.contains(ModeFlags::STICK) {
            let (gravity, screen) = (client.gravity, client.screen);
            client.set_slot(view, gravity, screen);
        }

        self.retile(window);
        if (clear | set).contains(ModeFlags::FULL) {
            self.registry.sort_stacking();
        }
        self.arrange(conn)
    }

    /// Sets the gravity and screen of a client on the active view.
    ///
    /// A `None` gravity keeps the geometry and only moves the client to `screen`. Setting a gravity ends floating. Out of range indices are clamped.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn set_gravity(
        &mut self,
        conn: &impl ManagerConnection,
        window: Window,
        gravity: Option<usize>,
        screen: Option<usize>,
    ) -> Res {
        let gravity = gravity.map(|g| self.gravities.clamp_index(g as i64));
        let screen = screen.map(|s| self.clamp_screen(s));
        let Some(old) = self.client(window).map(|c| c.screen) else {
            return Ok(());
        };
        let (from, to) = (self.screen(old).work, self.screen(screen.unwrap_or(old)).work);
        let view = self.active_view;
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };

        let screen = screen.unwrap_or(client.screen);
        match gravity {
            Some(gravity) => {
                client.modes.remove(ModeFlags::FLOAT);
                client.set_slot(view, gravity, screen);
            }
            None => {
                if client.modes.contains(ModeFlags::FLOAT) {
                    client.geom.x += to.x - from.x;
                    client.geom.y += to.y - from.y;
                    client.saved_geom = client.geom;
                }
                let gravity = client.gravity;
                client.set_slot(view, gravity, screen);
            }
        }
        client.select_view(view);
        log::debug!("gravity of {window} is now {} on screen {}", client.gravity, client.screen);

        self.retile(window);
        self.arrange(conn)
    }

    /// Cycles a client through a list of gravity names. A client outside the list gets the first one.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn cycle_gravity(&mut self, conn: &impl ManagerConnection, window: Window, names: &[String]) -> Res {
        let cycle: Vec<usize> = names
            .iter()
            .filter_map(|name| {
                let index = self.gravities.find(name);
                if index.is_none() {
                    log::warn!("unknown gravity {name}");
                }
                index
            })
            .collect();
        let (Some(&first), Some(client)) = (cycle.first(), self.client(window)) else {
            return Ok(());
        };

        let next = if client.modes.contains(ModeFlags::FLOAT) {
            first
        } else {
            cycle
                .iter()
                .position(|&g| g == client.gravity)
                .map_or(first, |i| cycle[(i + 1) % cycle.len()])
        };
        self.set_gravity(conn, window, Some(next), None)
    }

    /// Applies the slot overrides of the rules matching `tags` to a client.
    fn apply_overrides(&mut self, window: Window) {
        let screens = self.screens.len();
        let Some(client) = self.registry.get_mut(window) else {
            return;
        };
        let overrides = slots(client.tags, client.modes, &self.rules, &self.views);
        for (i, slot) in overrides.iter().enumerate() {
            if let (Some(gravity), Some(current)) = (slot.gravity, client.gravities.get_mut(i)) {
                *current = gravity;
            }
            if let (Some(screen), Some(current)) = (slot.screen, client.screens.get_mut(i)) {
                *current = screen.min(screens - 1);
            }
        }
    }

    /// Adds or removes a tag. A client left without tags gets the default tag.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn set_tag(&mut self, conn: &impl ManagerConnection, window: Window, tag: usize, add: bool) -> Res {
        if tag >= self.rules.len() {
            log::warn!("no tag with index {tag}");
            return Ok(());
        }
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };
        client.tags = if add {
            client.tags.with(tag)
        } else {
            client.tags.without(tag)
        };
        if client.tags.is_empty() {
            client.tags = Tags::DEFAULT;
        }
        log::debug!("tags of {window} are now {:?}", client.tags);

        self.apply_overrides(window);
        self.retile(window);
        self.arrange(conn)
    }

    /// Matches a client against the rules again, adding the tags and modes of the rules it matches now.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn retag(&mut self, conn: &impl ManagerConnection, window: Window) -> Res {
        let Some(client) = self.client(window) else {
            return Ok(());
        };
        let routing = route(&client.props, &self.rules, &self.views);
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };

        let matched = if routing.tags == Tags::DEFAULT {
            Tags::NONE
        } else {
            routing.tags
        };
        client.tags = if client.tags == Tags::DEFAULT && !matched.is_empty() {
            matched
        } else {
            Tags(client.tags.0 | matched.0)
        };
        client.modes |= routing.modes - client.policy.forbidden();
        log::debug!("retagged {client}");

        self.apply_overrides(window);
        self.retile(window);
        self.arrange(conn)
    }

    /// Closes a client. Clients that support it are asked to close, unless `force` is set.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn kill(&self, conn: &impl ManagerConnection, window: Window, force: bool) -> Res {
        let Some(client) = self.client(window) else {
            return Ok(());
        };
        if !force && client.prefs.contains(Prefs::DELETE_WINDOW) {
            conn.close_window(window)
        } else {
            conn.kill_window(window)
        }
    }

    /// Moves or resizes a client interactively. Clients that may float are made floating first.
    ///
    /// A committed candidate becomes the new geometry, a cancelled drag leaves the client where it was.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn drag(&mut self, conn: &impl ManagerConnection, window: Window, mode: DragMode) -> Res {
        let Some(index) = self.client(window).map(|c| c.screen) else {
            return Ok(());
        };
        let work = self.screen(index).work;
        let (snap, step) = (self.placement.snap, self.placement.step);
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };
        if client.policy.contains(PolicyFlags::NO_FLOAT)
            || client.modes.contains(ModeFlags::FULL)
            || !client.client_type.is_placed()
        {
            log::debug!("{window} can't be dragged");
            return Ok(());
        }

        if !client.modes.contains(ModeFlags::FLOAT) {
            client.modes |= ModeFlags::FLOAT;
            client.saved_geom = client.geom;
        }
        let constraints = if client.modes.contains(ModeFlags::RESIZE_LOCK) {
            SizeConstraints::resolve(None, &work, client.border)
        } else {
            client.constraints
        };
        let drag = Drag::new(
            client.geom,
            client.border,
            conn.query_pointer()?,
            work,
            constraints,
            snap,
            step,
        );
        self.retile(window);

        match run_drag(conn, window, mode, drag)? {
            DragResult::Committed(rect) => {
                let (view, screen) = (self.active_view, self.screen_at(&rect));
                if let Some(client) = self
                    .client_mut(window)
                    .filter(|c| c.modes.contains(ModeFlags::FLOAT))
                {
                    client.geom = Rect {
                        x: rect.x - client.border,
                        y: rect.y - client.border,
                        ..rect
                    };
                    client.saved_geom = client.geom;
                    let gravity = client.gravity;
                    client.set_slot(view, gravity, screen);
                    client.select_view(view);
                }
            }
            DragResult::Cancelled => (),
            DragResult::Destroyed => {
                if let Some(client) = self.registry.get_mut(window) {
                    client.dead = true;
                }
            }
        }
        self.arrange(conn)
    }

    /// Focuses the nearest client in a direction from the focused one. Clients sharing the gravity of the focused one are skipped.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn select(&mut self, conn: &impl ManagerConnection, direction: Direction) -> Res {
        let view_tags = self.view_tags();
        let Some(origin) = self.focus.and_then(|w| self.client(w)) else {
            return Ok(());
        };
        let candidates = self
            .registry
            .iter()
            .filter(|c| {
                c.window != origin.window
                    && c.is_visible_on(view_tags)
                    && c.client_type.is_placed()
                    && !(c.is_arranged()
                        && origin.is_arranged()
                        && c.gravity == origin.gravity
                        && c.screen == origin.screen)
            })
            .map(|c| (c.window, c.geom));
        let next = nearest(&origin.geom, direction, candidates);

        match next {
            Some(_) => self.focus(conn, next),
            None => Ok(()),
        }
    }

    /// Moves a client to the top of its stacking layer.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn raise(&mut self, conn: &impl ManagerConnection, window: Window) -> Res {
        self.registry.raise(window);
        conn.restack(&self.registry.stacking())?;
        self.publish(conn)
    }

    /// Moves a client to the bottom of its stacking layer.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn lower(&mut self, conn: &impl ManagerConnection, window: Window) -> Res {
        self.registry.lower(window);
        conn.restack(&self.registry.stacking())?;
        self.publish(conn)
    }

    /// Switches to another view.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn switch_view(&mut self, conn: &impl ManagerConnection, view: usize) -> Res {
        if view >= self.views.len() || view == self.active_view {
            log::debug!("tried switching to view {view}");
            return Ok(());
        }
        log::debug!("switching to view {}", self.views[view].name);
        self.active_view = view;
        self.arrange(conn)?;
        self.publish_views(conn)
    }

    /// Switches the view by the specified change, wrapping around.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn view_next(&mut self, conn: &impl ManagerConnection, change: i32) -> Res {
        let count = self.views.len() as i32;
        self.switch_view(conn, (self.active_view as i32 + change).rem_euclid(count) as usize)
    }

    /// Replaces the views. The slots of every client are resized, keeping the ones of views that remain.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn set_views(&mut self, conn: &impl ManagerConnection, views: Vec<View>) -> Res {
        if views.is_empty() {
            return Ok(());
        }
        let count = views.len();
        let default_gravity = self.placement.default_gravity;
        for window in self.registry.windows() {
            if let Some(client) = self.registry.get_mut(window) {
                let gravity = match default_gravity {
                    0 => client.gravity,
                    g => g,
                };
                let screen = client.screen;
                client.resize_views(count, gravity, screen);
            }
        }
        self.tiles
            .resize_with(count, || TileTree::new(Axis::Horizontal));
        self.views = views;
        self.active_view = self.active_view.min(count - 1);
        log::info!("now running {count} views");

        for window in self.registry.windows() {
            self.retile(window);
        }
        self.arrange(conn)?;
        self.publish_views(conn)
    }

    /// Grows or shrinks the views to `count`, at most one view per tag. New views carry no tags. A count of zero is ignored.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn set_view_count(&mut self, conn: &impl ManagerConnection, count: usize) -> Res {
        if count == 0 {
            log::debug!("ignoring a view count of zero");
            return Ok(());
        }
        if count > MAX_TAGS {
            log::warn!("view count {count} exceeds the limit of {MAX_TAGS}");
        }
        let count = count.min(MAX_TAGS);
        let mut views = self.views.clone();
        views.truncate(count);
        while views.len() < count {
            views.push(View {
                name: (views.len() + 1).to_string(),
                tags: Tags::NONE,
            });
        }
        self.set_views(conn, views)
    }

    /// Recomputes the working areas from the struts of all clients and publishes them.
    fn update_struts(&mut self, conn: &impl ManagerConnection) -> Res {
        let struts: Vec<Strut> = self.registry.iter().filter_map(|c| c.strut).collect();
        let root = self.root;
        for screen in &mut self.screens {
            screen.apply_struts(&root, &struts);
        }
        let areas: Vec<Rect> = self.screens.iter().map(|s| s.work).collect();
        log::debug!("working areas {areas:?}");
        conn.publish_workarea(&areas)
    }

    /// Rereads the strut of a client.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn update_strut(&mut self, conn: &impl ManagerConnection, window: Window) -> Res {
        let strut = conn.read_strut(window)?;
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };
        client.strut = strut;
        self.update_struts(conn)?;
        self.arrange(conn)
    }

    /// Marks a client urgent or not, unless its policy forbids urgency.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn set_urgent(&mut self, conn: &impl ManagerConnection, window: Window, urgent: bool) -> Res {
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };
        if client.policy.contains(PolicyFlags::NO_URGENT)
            || client.modes.contains(ModeFlags::URGENT) == urgent
        {
            return Ok(());
        }
        client.modes.set(ModeFlags::URGENT, urgent);
        log::debug!("urgency of {window} is now {urgent}");
        self.publish_client(conn, window)
    }

    /// Rereads `WM_HINTS` of a client.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn update_wm_hints(&mut self, conn: &impl ManagerConnection, window: Window) -> Res {
        let (input, urgent) = conn.read_wm_hints(window)?;
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };
        client.prefs.set(Prefs::INPUT, input);
        self.set_urgent(conn, window, urgent)
    }

    /// Rereads `WM_NORMAL_HINTS` of a client and places it again.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn update_normal_hints(&mut self, conn: &impl ManagerConnection, window: Window) -> Res {
        let hints = conn.read_normal_hints(window)?;
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };
        client.hints = hints;
        self.arrange(conn)
    }

    /// Rereads the name of a client, retagging it when rules match on names.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn update_name(&mut self, conn: &impl ManagerConnection, window: Window) -> Res {
        let name = conn.read_name(window)?;
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };
        client.props.name = name;
        if self
            .rules
            .iter()
            .any(|r| r.fields.contains(MatchFields::NAME))
        {
            self.retag(conn, window)?;
        }
        Ok(())
    }

    /// Handles a geometry request of a client.
    ///
    /// Floating clients and docks get what they asked for within their constraints, every other client is told its current geometry again.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn request_geometry(&mut self, conn: &impl ManagerConnection, window: Window, requested: Rect) -> Res {
        let Some(index) = self.client(window).map(|c| c.screen) else {
            return Ok(());
        };
        let work = self.screen(index).work;
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };

        if client.client_type == ClientType::Dock {
            client.geom = requested;
        } else if client.modes.contains(ModeFlags::FLOAT)
            && !client.modes.contains(ModeFlags::FULL)
            && client.client_type.is_placed()
        {
            let (width, height) = if client.modes.contains(ModeFlags::RESIZE_LOCK) {
                (requested.width, requested.height)
            } else {
                client.constraints.apply(requested.width, requested.height)
            };
            client.geom = fit(
                Rect {
                    width,
                    height,
                    ..requested
                },
                client.border,
                &work,
            );
            client.saved_geom = client.geom;
        }
        log::trace!("request of {window} resolved to {}", client.geom);
        conn.configure_client(client)
    }

    /// Creates a container in the active tile of the active view.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn tile_new(&mut self, conn: &impl ManagerConnection, axis: Axis) -> Res {
        if self.placement.layout != Layout::Tiling {
            return Ok(());
        }
        let Some(tree) = self.tiles.get_mut(self.active_view) else {
            return Ok(());
        };
        let created = tree.add_container(tree.active(), axis);
        log::debug!("created tile {created:?} along {axis:?}");
        self.arrange(conn)
    }

    /// Deletes the active tile of the active view and closes the clients inside it.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn tile_delete(&mut self, conn: &impl ManagerConnection) -> Res {
        if self.placement.layout != Layout::Tiling {
            return Ok(());
        }
        let Some(tree) = self.tiles.get_mut(self.active_view) else {
            return Ok(());
        };
        if tree.active() == tree.root() {
            log::debug!("the root tile can't be deleted");
            return Ok(());
        }
        let windows = tree.remove(tree.active());
        for &window in &windows {
            for tree in &mut self.tiles {
                tree.remove_window(window);
            }
        }
        log::debug!("deleted tile holding {windows:?}");

        for &window in &windows {
            self.kill(conn, window, false)?;
        }
        self.arrange(conn)
    }

    /// Collapses or expands the tile of a client on the active view.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn tile_shade(&mut self, conn: &impl ManagerConnection, window: Window) -> Res {
        if self.placement.layout != Layout::Tiling {
            return Ok(());
        }
        let Some(tree) = self.tiles.get_mut(self.active_view) else {
            return Ok(());
        };
        tree.toggle_shaded(window);
        self.arrange(conn)
    }

    fn publish_client(&self, conn: &impl ManagerConnection, window: Window) -> Res {
        match self.client(window) {
            Some(client) => conn.publish_client(client, self.desktop_of(client)),
            None => Ok(()),
        }
    }

    fn publish_views(&self, conn: &impl ManagerConnection) -> Res {
        let names: Vec<String> = self.views.iter().map(|v| v.name.clone()).collect();
        conn.publish_views(&names, self.active_view)
    }

    /// Publishes the client lists and the properties of every client.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn publish(&self, conn: &impl ManagerConnection) -> Res {
        conn.publish_client_lists(&self.registry.windows(), &self.registry.stacking())?;
        for client in self.registry.iter() {
            conn.publish_client(client, self.desktop_of(client))?;
        }
        Ok(())
    }

    /// Publishes the views, the working areas and the gravity and tag catalogs.
    /// # Errors
    /// Returns an error if the connection failed.
    pub fn publish_globals(&self, conn: &impl ManagerConnection) -> Res {
        self.publish_views(conn)?;
        conn.publish_workarea(&self.screens.iter().map(|s| s.work).collect::<Vec<_>>())?;
        let tags: Vec<String> = self.rules.iter().map(|r| r.name.clone()).collect();
        conn.publish_catalogs(&self.gravities.publish_strings(), &tags)
    }

    /// Logs every client.
    pub fn log_state(&self) {
        if self.registry.is_empty() {
            log::trace!("view {} has no clients", self.active_view);
            return;
        }
        log::trace!(
            "view {} focus {:?} clients {}",
            self.active_view,
            self.focus,
            self.registry.len()
        );
        for client in self.registry.iter() {
            log::trace!("{client}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::WindowInfo,
        config::ConfigDeserialized,
        drag::{DragEvent, DragKey},
        geometry::Gravity,
        hints::NormalHints,
        tags::WindowProps,
        testing::{Call, MockConnection},
    };

    const SCREEN: Rect = Rect::new(0, 0, 1000, 800);
    const CENTER: Rect = Rect::new(4, 4, 988, 788);

    const BASE: &str = r#"
        [sizing]
        border_size = 2
        gap = 4
        snap = 0
        step = 5

        [[gravities]]
        name = "top_left"
        geometry = [0, 0, 50, 50]

        [[gravities]]
        name = "top"
        geometry = [0, 0, 100, 50]

        [[gravities]]
        name = "top_right"
        geometry = [100, 0, 50, 50]

        [[gravities]]
        name = "left"
        geometry = [0, 0, 50, 100]

        [[gravities]]
        name = "center"
        geometry = [0, 0, 100, 100]

        [[tags]]
        name = "default"

        [[tags]]
        name = "term"
        match = "Terminal"
        gravity = "center"

        [[tags]]
        name = "web"
        match = "firefox"

        [[tags]]
        name = "locked"
        match = "Locked"
        no_float = true

        [[views]]
        name = "one"
        tags = "default|term|locked"

        [[views]]
        name = "two"
        tags = "web"
    "#;

    const SIDE: Rect = Rect::new(1000, 0, 800, 600);

    fn load_config(file: &str) -> Config {
        Config::from(toml::from_str::<ConfigDeserialized>(file).unwrap())
    }

    fn state_with(extra: &str) -> StateHandler {
        StateHandler::new(&load_config(&format!("{BASE}\n{extra}")), vec![SCREEN], SCREEN)
    }

    fn dual_state_with(extra: &str) -> StateHandler {
        StateHandler::new(
            &load_config(&format!("{BASE}\n{extra}")),
            vec![SCREEN, SIDE],
            Rect::new(0, 0, 1800, 800),
        )
    }

    fn state() -> StateHandler {
        state_with("")
    }

    fn info(class: &str) -> WindowInfo {
        WindowInfo {
            geometry: Rect::new(0, 0, 300, 200),
            input: true,
            props: WindowProps {
                class: class.to_owned(),
                instance: class.to_lowercase(),
                name: String::new(),
                role: None,
            },
            ..WindowInfo::default()
        }
    }

    fn manage(state: &mut StateHandler, conn: &MockConnection, window: Window, info: WindowInfo) {
        conn.add_window(window, info);
        state.manage(conn, window).unwrap();
    }

    fn fixed_size() -> WindowInfo {
        WindowInfo {
            hints: Some(NormalHints {
                min_size: Some((200, 100)),
                max_size: Some((200, 100)),
                ..NormalHints::default()
            }),
            ..info("Fixed")
        }
    }

    #[test]
    fn terminal_rule_places_on_the_center_gravity() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));

        let client = state.client(1).unwrap();
        assert_eq!(client.tags, Tags::single(1));
        assert_eq!(client.gravity, 5);
        assert_eq!(
            client.geom,
            gravity_rect(&Gravity::new("center", [0, 0, 100, 100]), &SCREEN, 2, 4)
        );
        assert_eq!(client.geom, CENTER);

        let calls = conn.calls();
        assert!(calls.contains(&Call::Manage(1)));
        assert!(calls.contains(&Call::Configure(1, CENTER, 2)));
        assert!(calls.contains(&Call::Map(1)));
        assert!(calls.contains(&Call::Focus(1)));
        assert_eq!(state.focus, Some(1));
    }

    #[test]
    fn new_clients_inherit_the_focused_gravity() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));
        manage(&mut state, &conn, 2, info("firefox"));

        let client = state.client(2).unwrap();
        assert_eq!(client.tags, Tags::single(2));
        assert_eq!(client.gravities, vec![5, 5]);
        assert!(!client.mapped);
        assert!(!conn.calls().contains(&Call::Map(2)));
    }

    #[test]
    fn fullscreen_drops_the_border_and_restores_it() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));

        state.toggle(&conn, 1, ModeFlags::FULL).unwrap();
        let client = state.client(1).unwrap();
        assert_eq!((client.geom, client.border), (SCREEN, 0));
        assert!(conn.calls().contains(&Call::Configure(1, SCREEN, 0)));

        state.toggle(&conn, 1, ModeFlags::FULL).unwrap();
        let client = state.client(1).unwrap();
        assert_eq!((client.geom, client.border), (CENTER, 2));
    }

    #[test]
    fn fullscreen_restores_the_floating_geometry() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, fixed_size());
        let before = state.client(1).unwrap().geom;

        state.toggle(&conn, 1, ModeFlags::FULL).unwrap();
        state.toggle(&conn, 1, ModeFlags::FULL).unwrap();
        assert_eq!(state.client(1).unwrap().geom, before);
    }

    #[test]
    fn sticky_toggles_in_pairs() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));
        let client = state.client(1).unwrap();
        let before = (client.modes, client.geom);

        state.toggle(&conn, 1, ModeFlags::STICK).unwrap();
        let client = state.client(1).unwrap();
        assert!(client.modes.contains(ModeFlags::STICK));
        assert_eq!(client.gravities, vec![5, 5]);

        state.toggle(&conn, 1, ModeFlags::STICK).unwrap();
        let client = state.client(1).unwrap();
        assert_eq!((client.modes, client.geom), before);
    }

    #[test]
    fn fixed_size_windows_become_floating_dialogs() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, fixed_size());

        let client = state.client(1).unwrap();
        assert!(client.modes.contains(ModeFlags::FLOAT));
        assert_eq!(client.client_type, ClientType::Dialog);
        assert_eq!(client.geom, Rect::new(398, 348, 200, 100));
    }

    #[test]
    fn stacking_orders_desktop_normal_fullscreen() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));
        manage(
            &mut state,
            &conn,
            2,
            WindowInfo {
                window_type: ClientType::Desktop,
                ..info("Desktop")
            },
        );
        manage(&mut state, &conn, 3, info("Terminal"));
        state.toggle(&conn, 1, ModeFlags::FULL).unwrap();

        assert_eq!(state.registry.stacking(), vec![2, 3, 1]);
        let last = conn
            .calls()
            .into_iter()
            .rev()
            .find(|c| matches!(c, Call::Restack(_)));
        assert_eq!(last, Some(Call::Restack(vec![2, 3, 1])));

        let desktop = state.client(2).unwrap();
        assert_eq!((desktop.geom, desktop.border), (SCREEN, 0));
        assert_ne!(state.focus, Some(2));
    }

    #[test]
    fn tags_are_never_empty() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Xterm"));
        assert_eq!(state.client(1).unwrap().tags, Tags::DEFAULT);

        state.set_tag(&conn, 1, 0, false).unwrap();
        assert_eq!(state.client(1).unwrap().tags, Tags::DEFAULT);

        state.set_tag(&conn, 1, 1, true).unwrap();
        let client = state.client(1).unwrap();
        assert_eq!(client.tags, Tags::DEFAULT.with(1));
        assert_eq!(client.gravity, 5);

        state.set_tag(&conn, 1, 40, true).unwrap();
        assert_eq!(state.client(1).unwrap().tags, Tags::DEFAULT.with(1));
    }

    #[test]
    fn placed_clients_stay_inside_the_working_area() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));
        manage(&mut state, &conn, 2, fixed_size());
        manage(
            &mut state,
            &conn,
            3,
            WindowInfo {
                hints: Some(NormalHints {
                    min_size: Some((5000, 5000)),
                    ..NormalHints::default()
                }),
                ..info("Huge")
            },
        );
        for gravity in 1..=5 {
            state.set_gravity(&conn, 1, Some(gravity), None).unwrap();
            for client in state.registry.iter() {
                assert!(client.geom.fits_in(client.border, &SCREEN), "{client}");
            }
        }
    }

    #[test]
    fn dead_clients_ignore_toggles() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));
        state.registry.get_mut(1).unwrap().dead = true;
        conn.clear_calls();

        state.toggle(&conn, 1, ModeFlags::FLOAT).unwrap();
        assert!(conn.calls().is_empty());
        assert!(!state.registry.get(1).unwrap().modes.contains(ModeFlags::FLOAT));
    }

    #[test]
    fn policy_blocks_toggles() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Locked"));
        state.toggle(&conn, 1, ModeFlags::FLOAT).unwrap();
        assert!(!state.client(1).unwrap().modes.contains(ModeFlags::FLOAT));
    }

    #[test]
    fn gravities_are_clamped_and_cycled() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));

        state.set_gravity(&conn, 1, Some(99), None).unwrap();
        assert_eq!(state.client(1).unwrap().gravity, 5);

        let names = [String::from("left"), String::from("center")];
        state.cycle_gravity(&conn, 1, &names).unwrap();
        assert_eq!(state.client(1).unwrap().gravity, 4);
        state.cycle_gravity(&conn, 1, &names).unwrap();
        assert_eq!(state.client(1).unwrap().gravity, 5);

        state.set_gravity(&conn, 1, Some(2), None).unwrap();
        assert_eq!(state.client(1).unwrap().geom, Rect::new(4, 4, 988, 388));
    }

    #[test]
    fn drags_commit_without_the_border() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, fixed_size());
        conn.set_pointer(450, 400);
        conn.script_drag([DragEvent::Motion { x: 470, y: 420 }, DragEvent::ButtonRelease]);

        state.drag(&conn, 1, DragMode::Move).unwrap();
        let client = state.client(1).unwrap();
        assert_eq!(client.geom, Rect::new(418, 368, 200, 100));
        assert_eq!(client.saved_geom, client.geom);
        assert!(!conn.grabbed());
    }

    #[test]
    fn escape_discards_the_drag() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, fixed_size());
        conn.set_pointer(450, 400);
        conn.script_drag([
            DragEvent::Motion { x: 470, y: 420 },
            DragEvent::Key(DragKey::Escape),
        ]);

        state.drag(&conn, 1, DragMode::Move).unwrap();
        assert_eq!(state.client(1).unwrap().geom, Rect::new(398, 348, 200, 100));
    }

    #[test]
    fn dragging_promotes_to_float() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));
        conn.set_pointer(500, 400);
        conn.script_drag([DragEvent::ButtonRelease]);

        state.drag(&conn, 1, DragMode::Resize).unwrap();
        let client = state.client(1).unwrap();
        assert!(client.modes.contains(ModeFlags::FLOAT));
        assert_eq!(client.geom, CENTER);
    }

    #[test]
    fn no_float_blocks_dragging() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Locked"));
        conn.script_drag([DragEvent::ButtonRelease]);

        state.drag(&conn, 1, DragMode::Move).unwrap();
        assert_eq!(conn.drags(), 0);
        assert!(!state.client(1).unwrap().modes.contains(ModeFlags::FLOAT));
    }

    #[test]
    fn destroyed_windows_die_during_a_drag() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, fixed_size());
        conn.script_drag([DragEvent::Destroyed]);

        state.drag(&conn, 1, DragMode::Move).unwrap();
        assert!(state.client(1).is_none());
        assert!(state.registry.get(1).is_some_and(|c| c.dead));

        state.unmanage(&conn, 1, true).unwrap();
        assert!(!state.registry.contains(1));
        assert!(!conn.calls().contains(&Call::Withdraw(1)));
    }

    #[test]
    fn switching_views_hides_and_shows_clients() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));
        manage(&mut state, &conn, 2, info("firefox"));

        state.switch_view(&conn, 1).unwrap();
        let calls = conn.calls();
        assert!(calls.contains(&Call::Unmap(1)));
        assert!(calls.contains(&Call::Map(2)));
        assert!(calls.contains(&Call::Views(2, 1)));
        assert_eq!(state.focus, Some(2));

        state.unmap_notify(&conn, 1).unwrap();
        assert!(state.registry.contains(1));
        state.unmap_notify(&conn, 1).unwrap();
        assert!(!state.registry.contains(1));
        assert!(conn.calls().contains(&Call::Withdraw(1)));

        state.view_next(&conn, 1).unwrap();
        assert_eq!(state.active_view, 0);
    }

    #[test]
    fn view_count_changes_resize_slots() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));

        state.set_view_count(&conn, 3).unwrap();
        assert_eq!(state.views.len(), 3);
        assert_eq!(state.client(1).unwrap().gravities, vec![5, 0, 5]);

        state.switch_view(&conn, 2).unwrap();
        state.set_view_count(&conn, 1).unwrap();
        assert_eq!(state.active_view, 0);
        assert_eq!(state.client(1).unwrap().gravities, vec![5]);
    }

    #[test]
    fn struts_shrink_the_placement_area() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(
            &mut state,
            &conn,
            1,
            WindowInfo {
                geometry: Rect::new(0, 0, 1000, 30),
                window_type: ClientType::Dock,
                strut: Some(Strut {
                    top: 30,
                    ..Strut::default()
                }),
                ..info("Panel")
            },
        );
        manage(&mut state, &conn, 2, info("Terminal"));

        assert_eq!(state.screens[0].work, Rect::new(0, 30, 1000, 770));
        assert!(conn.calls().contains(&Call::Workarea(vec![Rect::new(0, 30, 1000, 770)])));
        assert_eq!(state.client(2).unwrap().geom, Rect::new(4, 34, 988, 758));
        assert_eq!(state.client(1).unwrap().geom, Rect::new(0, 0, 1000, 30));

        state.unmanage(&conn, 1, true).unwrap();
        assert_eq!(state.screens[0].work, SCREEN);
    }

    #[test]
    fn select_moves_focus_to_the_neighbour() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));
        manage(&mut state, &conn, 2, info("Xterm"));
        state.set_gravity(&conn, 1, Some(4), None).unwrap();
        state.set_gravity(&conn, 2, Some(3), None).unwrap();

        state.focus(&conn, Some(1)).unwrap();
        state.select(&conn, Direction::Right).unwrap();
        assert_eq!(state.focus, Some(2));
        state.select(&conn, Direction::Right).unwrap();
        assert_eq!(state.focus, Some(2));
    }

    #[test]
    fn urgency_follows_hints_and_policy() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(
            &mut state,
            &conn,
            1,
            WindowInfo {
                urgent: true,
                ..info("Terminal")
            },
        );
        assert!(state.client(1).unwrap().modes.contains(ModeFlags::URGENT));

        conn.add_window(1, info("Terminal"));
        state.update_wm_hints(&conn, 1).unwrap();
        assert!(!state.client(1).unwrap().modes.contains(ModeFlags::URGENT));
    }

    #[test]
    fn transients_follow_their_parent() {
        let (mut state, conn) = (state_with("[policy]\nurgent_transients = true"), MockConnection::default());
        manage(&mut state, &conn, 1, info("firefox"));
        manage(
            &mut state,
            &conn,
            2,
            WindowInfo {
                transient_for: Some(1),
                ..info("Terminal")
            },
        );

        let client = state.client(2).unwrap();
        assert_eq!(client.tags, Tags::single(2));
        assert!(client.modes.contains(ModeFlags::FLOAT | ModeFlags::URGENT));
    }

    #[test]
    fn requests_are_granted_to_floating_clients_only() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));
        manage(&mut state, &conn, 2, fixed_size());

        state.request_geometry(&conn, 1, Rect::new(10, 10, 100, 100)).unwrap();
        assert_eq!(state.client(1).unwrap().geom, CENTER);

        state.request_geometry(&conn, 2, Rect::new(10, 10, 500, 500)).unwrap();
        assert_eq!(state.client(2).unwrap().geom, Rect::new(10, 10, 200, 100));
    }

    #[test]
    fn kill_prefers_asking_the_client() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(
            &mut state,
            &conn,
            1,
            WindowInfo {
                delete_window: true,
                ..info("Terminal")
            },
        );
        state.kill(&conn, 1, false).unwrap();
        state.kill(&conn, 1, true).unwrap();
        let calls = conn.calls();
        assert!(calls.contains(&Call::Close(1)));
        assert!(calls.contains(&Call::Kill(1)));
    }

    #[test]
    fn tiling_splits_the_view_and_deletes_tiles() {
        let (mut state, conn) = (state_with("[policy]\nlayout = \"tiling\""), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));
        manage(&mut state, &conn, 2, info("Xterm"));

        assert_eq!(state.client(1).unwrap().geom, Rect::new(4, 4, 488, 788));
        assert_eq!(state.client(2).unwrap().geom, Rect::new(504, 4, 488, 788));

        state.toggle(&conn, 2, ModeFlags::FLOAT).unwrap();
        assert_eq!(state.client(1).unwrap().geom, CENTER);
        state.toggle(&conn, 2, ModeFlags::FLOAT).unwrap();

        state.tile_new(&conn, Axis::Vertical).unwrap();
        manage(&mut state, &conn, 3, info("Xterm"));
        assert_eq!(state.client(3).unwrap().geom, Rect::new(670, 4, 322, 788));

        state.tile_shade(&conn, 2).unwrap();
        assert_eq!(state.client(2).unwrap().geom, Rect::new(494, 4, 10, 788));

        state.tile_delete(&conn).unwrap();
        assert!(conn.calls().contains(&Call::Kill(3)));
        assert!(!conn.calls().contains(&Call::Kill(1)));
    }

    #[test]
    fn globals_are_published() {
        let (state, conn) = (state(), MockConnection::default());
        state.publish_globals(&conn).unwrap();
        let calls = conn.calls();
        assert!(calls.contains(&Call::Views(2, 0)));
        assert!(calls.contains(&Call::Workarea(vec![SCREEN])));
        assert!(calls.contains(&Call::Catalogs));
    }

    #[test]
    fn retagging_keeps_existing_tags() {
        let extra = "[[tags]]\nname = \"named\"\nmatch = \"vim\"\nfields = [\"name\"]";
        let (mut state, conn) = (state_with(extra), MockConnection::default());
        manage(&mut state, &conn, 1, info("Xterm"));
        manage(&mut state, &conn, 2, info("Xterm"));
        state.set_tag(&conn, 1, 2, true).unwrap();

        let mut renamed = info("Xterm");
        renamed.props.name = String::from("vim");
        conn.add_window(1, renamed.clone());
        conn.add_window(2, renamed);
        state.update_name(&conn, 1).unwrap();
        state.update_name(&conn, 2).unwrap();

        assert_eq!(state.client(1).unwrap().tags, Tags::DEFAULT.with(2).with(4));
        assert_eq!(state.client(2).unwrap().tags, Tags::single(4));
    }

    #[test]
    fn docks_and_desktops_survive_view_switches() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(
            &mut state,
            &conn,
            1,
            WindowInfo {
                geometry: Rect::new(0, 0, 1000, 30),
                window_type: ClientType::Dock,
                ..info("Panel")
            },
        );
        manage(
            &mut state,
            &conn,
            2,
            WindowInfo {
                window_type: ClientType::Desktop,
                ..info("Desktop")
            },
        );
        conn.clear_calls();

        state.switch_view(&conn, 1).unwrap();
        let calls = conn.calls();
        assert!(!calls.contains(&Call::Unmap(1)));
        assert!(!calls.contains(&Call::Unmap(2)));
        assert!(calls.contains(&Call::PublishClient(1, u32::MAX)));
        assert!(state.client(1).unwrap().mapped);
        assert!(state.client(2).unwrap().mapped);
    }

    #[test]
    fn unmatched_windows_land_on_the_default_tag() {
        let file = r#"
            [[gravities]]
            name = "center"
            geometry = [0, 0, 100, 100]

            [[tags]]
            name = "term"
            match = "Terminal"

            [[tags]]
            name = "web"
            match = "firefox"

            [[views]]
            name = "one"
            tags = "term"

            [[views]]
            name = "two"
            tags = "default"
        "#;
        let (mut state, conn) = (
            StateHandler::new(&load_config(file), vec![SCREEN], SCREEN),
            MockConnection::default(),
        );
        manage(&mut state, &conn, 1, info("Xclock"));

        assert_eq!(state.client(1).unwrap().tags, Tags::DEFAULT);
        assert!(!conn.calls().contains(&Call::Map(1)));
        state.switch_view(&conn, 1).unwrap();
        assert!(conn.calls().contains(&Call::Map(1)));
    }

    #[test]
    fn view_counts_are_bounded() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("Terminal"));

        state.set_view_count(&conn, 0).unwrap();
        assert_eq!(state.views.len(), 2);

        state.set_view_count(&conn, 200_000).unwrap();
        assert_eq!(state.views.len(), MAX_TAGS);
        assert_eq!(state.client(1).unwrap().gravities.len(), MAX_TAGS);
    }

    #[test]
    fn screen_indices_are_clamped() {
        let extra = "[[tags]]\nname = \"far\"\nmatch = \"Far\"\nscreen = 5\n\n[[views]]\nname = \"three\"\ntags = \"far\"";
        let (mut state, conn) = (dual_state_with(extra), MockConnection::default());
        manage(&mut state, &conn, 1, info("Far"));
        manage(&mut state, &conn, 2, info("Xterm"));
        assert_eq!(state.client(1).unwrap().screens, vec![0, 0, 1]);

        state.set_tag(&conn, 2, 4, true).unwrap();
        assert_eq!(state.client(2).unwrap().screens, vec![0, 0, 1]);

        state.set_gravity(&conn, 2, Some(5), Some(9)).unwrap();
        let client = state.client(2).unwrap();
        assert_eq!(client.screen, 1);
        assert_eq!(client.geom, Rect::new(1004, 4, 788, 588));
    }

    #[test]
    fn tiles_are_laid_out_on_the_screen_of_the_client() {
        let (mut state, conn) = (
            dual_state_with("[policy]\nlayout = \"tiling\""),
            MockConnection::default(),
        );
        manage(&mut state, &conn, 1, info("Terminal"));
        assert_eq!(state.client(1).unwrap().geom, CENTER);

        state.set_gravity(&conn, 1, None, Some(1)).unwrap();
        assert_eq!(state.client(1).unwrap().geom, Rect::new(1004, 4, 788, 588));
    }

    #[test]
    fn transients_of_unknown_windows_follow_their_group() {
        let (mut state, conn) = (state(), MockConnection::default());
        manage(&mut state, &conn, 1, info("firefox"));
        manage(
            &mut state,
            &conn,
            2,
            WindowInfo {
                transient_for: Some(99),
                group: Some(1),
                ..info("Terminal")
            },
        );

        let client = state.client(2).unwrap();
        assert_eq!(client.tags, Tags::single(2));
        assert!(client.modes.contains(ModeFlags::FLOAT));
    }
}
