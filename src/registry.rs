//!
//! This module keeps the managed clients, their creation order and their stacking order.
use std::collections::HashMap;

use x11rb::protocol::xproto::Window;

use crate::client::Client;

#[derive(Default)]
/// The collection of managed clients, looked up by window.
pub struct Registry {
    clients: HashMap<Window, Client>,
    /// Windows in the order they were managed.
    order: Vec<Window>,
    /// Windows from bottom to top.
    stacking: Vec<Window>,
}

impl Registry {
    #[must_use]
    pub fn contains(&self, window: Window) -> bool {
        self.clients.contains_key(&window)
    }

    /// Adds a client on top of its stacking layer.
    pub fn insert(&mut self, client: Client) {
        let window = client.window;
        if self.clients.insert(window, client).is_none() {
            self.order.push(window);
            self.stacking.push(window);
        }
        self.sort_stacking();
    }

    pub fn remove(&mut self, window: Window) -> Option<Client> {
        let client = self.clients.remove(&window)?;
        self.order.retain(|&w| w != window);
        self.stacking.retain(|&w| w != window);
        Some(client)
    }

    /// Gets a client, including one that is being destroyed.
    #[must_use]
    pub fn get(&self, window: Window) -> Option<&Client> {
        self.clients.get(&window)
    }

    pub fn get_mut(&mut self, window: Window) -> Option<&mut Client> {
        self.clients.get_mut(&window)
    }

    /// Iterates over the live clients in the order they were managed.
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.order
            .iter()
            .filter_map(|w| self.clients.get(w))
            .filter(|c| !c.dead)
    }

    /// The live windows in the order they were managed.
    #[must_use]
    pub fn windows(&self) -> Vec<Window> {
        self.iter().map(|c| c.window).collect()
    }

    /// The live windows from bottom to top.
    #[must_use]
    pub fn stacking(&self) -> Vec<Window> {
        self.stacking
            .iter()
            .filter(|w| self.clients.get(*w).is_some_and(|c| !c.dead))
            .copied()
            .collect()
    }

    /// Sorts the stacking order by layer, keeping the order inside each layer.
    pub fn sort_stacking(&mut self) {
        let clients = &self.clients;
        self.stacking
            .sort_by_key(|w| clients.get(w).map_or(0, Client::layer));
    }

    /// Moves a window to the top of its layer.
    pub fn raise(&mut self, window: Window) {
        if self.contains(window) {
            self.stacking.retain(|&w| w != window);
            self.stacking.push(window);
            self.sort_stacking();
        }
    }

    /// Moves a window to the bottom of its layer.
    pub fn lower(&mut self, window: Window) {
        if self.contains(window) {
            self.stacking.retain(|&w| w != window);
            self.stacking.insert(0, window);
            self.sort_stacking();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
