//!
//! This module provides a helper for managing keypresses and button presses, allowing easy conversion between keycodes and keysyms.
//! `HotkeyAction`s force hotkeys to only implement the provided functions.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use x11rb::{
    connection::Connection,
    errors::ReplyOrIdError,
    protocol::xproto::{ButtonPressEvent, ConnectionExt as _, KeyButMask, KeyPressEvent, ModMask},
};
use xkeysym::Keysym;

use crate::{
    config::Config,
    drag::DragKey,
    geometry::Direction,
    tile::Axis,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// The possible actions a hotkey or button could activate.
pub enum HotkeyAction {
    /// Spawns the specified command.
    Spawn(String),
    /// Asks the focused client to close.
    Kill,
    /// Kills the connection of the focused client.
    ForceKill,
    ToggleFloat,
    ToggleFull,
    ToggleStick,
    ToggleResize,
    /// Cycles the focused client through the named gravities.
    Gravity(Vec<String>),
    /// Switches to the view with the given number, starting at 1.
    ViewSwitch(usize),
    /// Switches the view by the specified change.
    ViewNext(i32),
    Raise,
    Lower,
    /// Focuses the nearest client in a direction.
    Select(Direction),
    /// Moves the client interactively.
    WindowMove,
    /// Resizes the client interactively.
    WindowResize,
    /// Creates a nested tiling container.
    TileNew(Axis),
    /// Deletes the active tiling container and closes its clients.
    TileDelete,
    /// Collapses or expands the tile of the client.
    TileShade,
}

#[derive(Debug)]
/// Represents a hotkey.
pub struct Hotkey {
    /// The action a hotkey should activate
    action: HotkeyAction,
    /// This represents the codes of the pressed modifier buttons (e.g. CONTROL or SHIFT)
    mask: KeyButMask,
    /// The number associated with the key
    pub code: u8,
    /// Contains the various pressed modifier buttons
    pub modifier: ModMask,
}

#[derive(Debug)]
/// Represents a pointer binding.
pub struct Button {
    action: HotkeyAction,
    mask: KeyButMask,
    /// The pointer button, 1 being the left one.
    pub button: u8,
    pub modifier: ModMask,
}

/// A helper for managing keypresses.
pub struct KeyHandler {
    /// A list of monitored hotkeys.
    pub hotkeys: Vec<Hotkey>,
    /// A list of monitored pointer bindings.
    pub buttons: Vec<Button>,
    /// A map of keysyms and their respective keycodes.
    sym_code: HashMap<Keysym, u8>,
}

/// Parses modifiers in the `CONTROL|MOD|SHIFT` form.
fn parse_modifiers(modifiers: &str) -> KeyButMask {
    modifiers
        .split('|')
        .map(|m| match m.trim() {
            "CONTROL" => KeyButMask::CONTROL,
            "SHIFT" => KeyButMask::SHIFT,
            "ALT" => KeyButMask::MOD1,
            "MOD" => KeyButMask::MOD4,
            "" => KeyButMask::default(),
            other => {
                log::warn!("unknown modifier {other}");
                KeyButMask::default()
            }
        })
        .fold(KeyButMask::default(), |acc, m| acc | m)
}

/// Parses a key name like `XK_Return`, `F5` or `q` into a keysym.
fn parse_keysym(key: &str) -> Option<Keysym> {
    let name = key.strip_prefix("XK_").unwrap_or(key);
    let sym = match name {
        "Return" => Keysym::Return,
        "Escape" => Keysym::Escape,
        "Tab" => Keysym::Tab,
        "space" => Keysym::space,
        "BackSpace" => Keysym::BackSpace,
        "Delete" => Keysym::Delete,
        "Home" => Keysym::Home,
        "End" => Keysym::End,
        "Prior" => Keysym::Prior,
        "Next" => Keysym::Next,
        "Left" => Keysym::Left,
        "Right" => Keysym::Right,
        "Up" => Keysym::Up,
        "Down" => Keysym::Down,
        "XF86_MonBrightnessUp" => Keysym::XF86_MonBrightnessUp,
        "XF86_MonBrightnessDown" => Keysym::XF86_MonBrightnessDown,
        "XF86_AudioRaiseVolume" => Keysym::XF86_AudioRaiseVolume,
        "XF86_AudioLowerVolume" => Keysym::XF86_AudioLowerVolume,
        "XF86_AudioMute" => Keysym::XF86_AudioMute,
        "KP_Add" => Keysym::KP_Add,
        "KP_Subtract" => Keysym::KP_Subtract,
        "KP_Enter" => Keysym::KP_Enter,
        k if k.starts_with("KP_") => {
            let n: u32 = k[3..].parse().ok().filter(|n| *n <= 9)?;
            Keysym::new(Keysym::KP_0.raw() + n)
        }
        f if f.len() > 1 && f.starts_with('F') => {
            let n: u32 = f[1..].parse().ok().filter(|n| (1..=35).contains(n))?;
            Keysym::new(Keysym::F1.raw() + n - 1)
        }
        c => {
            let mut chars = c.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => Keysym::from_char(ch),
                _ => return None,
            }
        }
    };
    Some(sym)
}

impl KeyHandler {
    /// Creates a new handler.
    ///
    /// A keyboard map is created based on the minimum and maximum keycodes, with keysyms being created with the xkeysym crate.
    ///
    /// The hotkeys and buttons defined in the config file are parsed and stored. Keys that can't be resolved are dropped with a warning.
    ///
    /// # Errors
    /// May return an error if the keyboard mapping can't be read.
    pub fn new(conn: &impl Connection, config: &Config) -> Result<Self, ReplyOrIdError> {
        //get min-max code
        let min = conn.setup().min_keycode;
        let max = conn.setup().max_keycode;

        //get mapping
        let mapping = conn.get_keyboard_mapping(min, max - min + 1)?.reply()?;

        //get sym-code pairings, keeping the lowest code for every sym
        let mut sym_code: HashMap<Keysym, u8> = HashMap::new();
        for code in (min..=max).rev() {
            if let Some(sym) = xkeysym::keysym(
                code.into(),
                0,
                min.into(),
                mapping.keysyms_per_keycode,
                mapping.keysyms.as_slice(),
            ) {
                sym_code.insert(sym, code);
            }
        }

        Ok(Self::from_map(sym_code, config))
    }

    /// Creates a handler from an existing keyboard map.
    fn from_map(sym_code: HashMap<Keysym, u8>, config: &Config) -> Self {
        let hotkeys = config
            .hotkeys
            .iter()
            .filter_map(|c| {
                let Some(code) = parse_keysym(&c.key).and_then(|sym| sym_code.get(&sym)) else {
                    log::warn!("BAD KEYSYM {}, dropping hotkey", c.key);
                    return None;
                };
                let mask = parse_modifiers(&c.modifiers);
                Some(Hotkey {
                    code: *code,
                    mask,
                    modifier: ModMask::from(mask.bits()),
                    action: c.action.clone(),
                })
            })
            .collect();

        let buttons = config
            .buttons
            .iter()
            .map(|c| {
                let mask = parse_modifiers(&c.modifiers);
                Button {
                    button: c.button,
                    mask,
                    modifier: ModMask::from(mask.bits()),
                    action: c.action.clone(),
                }
            })
            .collect();

        Self {
            hotkeys,
            buttons,
            sym_code,
        }
    }

    /// Gets a hotkey based on its mask and code.
    fn get_registered_hotkey(&self, mask: KeyButMask, code: u8) -> Option<&Hotkey> {
        self.hotkeys
            .iter()
            .find(|h| mask == h.mask && code == h.code)
    }

    /// Gets the hotkey and its associated action based on a `KeyPressEvent`.
    #[must_use]
    pub fn get_action(&self, event: KeyPressEvent) -> Option<HotkeyAction> {
        self.get_registered_hotkey(event.state, event.detail)
            .map(|h| h.action.clone())
    }

    /// Gets the action of a pointer binding based on a `ButtonPressEvent`.
    #[must_use]
    pub fn get_button_action(&self, event: ButtonPressEvent) -> Option<HotkeyAction> {
        self.buttons
            .iter()
            .find(|b| b.button == event.detail && b.mask == event.state)
            .map(|b| b.action.clone())
    }

    /// Maps the keycodes of the keys used during a drag to their meaning.
    #[must_use]
    pub fn drag_keys(&self) -> HashMap<u8, DragKey> {
        [
            (Keysym::Left, DragKey::Left),
            (Keysym::Right, DragKey::Right),
            (Keysym::Up, DragKey::Up),
            (Keysym::Down, DragKey::Down),
            (Keysym::Return, DragKey::Return),
            (Keysym::KP_Enter, DragKey::Return),
            (Keysym::Escape, DragKey::Escape),
        ]
        .into_iter()
        .filter_map(|(sym, key)| self.sym_code.get(&sym).map(|&code| (code, key)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ButtonConfig, ConfigDeserialized, HotkeyConfig};

    fn keymap() -> HashMap<Keysym, u8> {
        HashMap::from([
            (Keysym::Return, 36),
            (Keysym::Escape, 9),
            (Keysym::Left, 113),
            (Keysym::from_char('q'), 24),
            (Keysym::F1, 67),
        ])
    }

    #[test]
    fn key_names_parse() {
        assert_eq!(parse_keysym("XK_Return"), Some(Keysym::Return));
        assert_eq!(parse_keysym("q"), Some(Keysym::from_char('q')));
        assert_eq!(parse_keysym("F3"), Some(Keysym::F3));
        assert_eq!(parse_keysym("KP_7"), Some(Keysym::KP_7));
        assert_eq!(parse_keysym("F99"), None);
        assert_eq!(parse_keysym("Nonsense"), None);
    }

    #[test]
    fn modifiers_parse() {
        assert_eq!(
            parse_modifiers("CONTROL|MOD"),
            KeyButMask::CONTROL | KeyButMask::MOD4
        );
        assert_eq!(parse_modifiers(""), KeyButMask::default());
    }

    #[test]
    fn unresolved_hotkeys_are_dropped() {
        let mut config = crate::config::Config::from(ConfigDeserialized::default());
        config.hotkeys = vec![
            HotkeyConfig {
                modifiers: String::from("MOD"),
                key: String::from("q"),
                action: HotkeyAction::Kill,
            },
            HotkeyConfig {
                modifiers: String::from("MOD"),
                key: String::from("XK_Nowhere"),
                action: HotkeyAction::Raise,
            },
        ];
        config.buttons = vec![ButtonConfig {
            modifiers: String::from("MOD"),
            button: 1,
            action: HotkeyAction::WindowMove,
        }];

        let keys = KeyHandler::from_map(keymap(), &config);
        assert_eq!(keys.hotkeys.len(), 1);
        assert_eq!(keys.hotkeys[0].code, 24);
        assert_eq!(keys.buttons[0].mask, KeyButMask::MOD4);
        assert_eq!(
            keys.get_registered_hotkey(KeyButMask::MOD4, 24).map(|h| h.action.clone()),
            Some(HotkeyAction::Kill)
        );
    }

    #[test]
    fn drag_keys_map_codes() {
        let config = crate::config::Config::from(ConfigDeserialized::default());
        let keys = KeyHandler::from_map(keymap(), &config);
        let drag = keys.drag_keys();
        assert_eq!(drag.get(&36), Some(&DragKey::Return));
        assert_eq!(drag.get(&9), Some(&DragKey::Escape));
        assert_eq!(drag.get(&113), Some(&DragKey::Left));
        assert_eq!(drag.get(&24), None);
    }
}
