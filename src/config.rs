//!
//! This module uses the `serde` crate to serialize and deserialize a config file.
//!
//! The config is used to change the appearance of the manager, the gravity catalog, the tag rules and views, and the functions of hotkeys and buttons.
use crate::{
    client::ClientType,
    geometry::{Direction, Gravity, GravityCatalog},
    keys::HotkeyAction,
    tags::{TagRule, View, compile_rules, compile_views},
    tile::Axis,
};
use serde::{Deserialize, Serialize};
use x11rb::protocol::render::Color;

/// The default size of the window border.
pub const BORDER_SIZE: u32 = 2;
/// The default gap between a window's edge and the edge of its gravity.
pub const GAP: i32 = 4;
/// The default distance at which dragged windows snap to screen edges.
pub const SNAP: i32 = 10;
/// The default distance keys move a window during a drag.
pub const STEP: i32 = 5;
/// The default size of a collapsed tile.
pub const COLLAPSED_SIZE: i32 = 20;
/// The default border color of the focused client.
pub const FOCUS_COLOR: Color = Color {
    red: 29812,
    green: 51143,
    blue: 60652,
    alpha: 65535,
}; // #74c7ec
/// The default border color of every other client.
pub const NORMAL_COLOR: Color = Color {
    red: 4369,
    green: 4369,
    blue: 6939,
    alpha: 65535,
}; // #11111b

/// A map between a regular RGB color and X11's color format
fn hex_color_to_argb(hex: &str) -> Option<Color> {
    let channel = |range| {
        hex.get(range)
            .and_then(|c| u16::from_str_radix(c, 16).ok())
            .map(|c| c * 257)
    };
    if hex.len() != 7 || !hex.starts_with('#') {
        return None;
    }
    Some(Color {
        red: channel(1..3)?,
        green: channel(3..5)?,
        blue: channel(5..7)?,
        alpha: 65535,
    })
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// How arranged clients are placed.
pub enum Layout {
    /// Every client is placed in the cell of its gravity.
    #[default]
    Gravity,
    /// Every view is cut into a tree of tiles.
    Tiling,
}

#[derive(Clone)]
/// All the things a user might want to change about the application.
pub struct Config {
    /// The size of the window border.
    pub border_size: u32,
    /// The gap between the window's edge and the edge of its gravity.
    pub gap: i32,
    /// The distance at which dragged windows snap to screen edges.
    pub snap: i32,
    /// The distance keys move or resize a window during a drag.
    pub step: i32,
    /// The size of a collapsed tile.
    pub collapsed_size: i32,
    /// The gravity of new clients. `0` makes them inherit the gravity of the focused client.
    pub default_gravity: usize,
    pub layout: Layout,
    /// Transient windows are marked urgent when they appear.
    pub urgent_transients: bool,
    /// The border color of the focused client.
    pub focus_color: Color,
    /// The border color of every other client.
    pub normal_color: Color,
    pub gravities: GravityCatalog,
    /// The compiled tag rules, the first one carrying the default tag.
    pub rules: Vec<TagRule>,
    pub views: Vec<View>,
    /// The hotkeys to track.
    pub hotkeys: Vec<HotkeyConfig>,
    /// The pointer bindings to track.
    pub buttons: Vec<ButtonConfig>,
}

impl From<ConfigDeserialized> for Config {
    fn from(config: ConfigDeserialized) -> Self {
        let focus_color = hex_color_to_argb(&config.colors.focus).unwrap_or_else(|| {
            log::debug!("BAD COLOR VALUE");
            FOCUS_COLOR
        });
        let normal_color = hex_color_to_argb(&config.colors.normal).unwrap_or_else(|| {
            log::debug!("BAD COLOR VALUE");
            NORMAL_COLOR
        });

        let gravities = GravityCatalog::new(
            config
                .gravities
                .iter()
                .map(|g| Gravity::new(&g.name, g.geometry))
                .collect(),
        );

        if gravities.is_empty() {
            log::warn!("no gravities configured, every client fills the screen");
        }

        let default_gravity = match config.policy.default_gravity.as_str() {
            "" => 0,
            name => gravities.find(name).unwrap_or_else(|| {
                log::warn!("unknown default gravity {name}, inheriting from focus");
                0
            }),
        };

        let rules = compile_rules(&config.tags, &gravities);
        let views = compile_views(&config.views, &rules);
        log::info!(
            "loaded {} gravities, {} tags, {} views",
            gravities.len() - 1,
            rules.len(),
            views.len()
        );

        Self {
            focus_color,
            normal_color,
            border_size: config.sizing.border_size.clamp(0, 100),
            gap: config.sizing.gap.clamp(0, 1000),
            snap: config.sizing.snap.clamp(0, 1000),
            step: config.sizing.step.clamp(1, 1000),
            collapsed_size: config.sizing.collapsed_size.clamp(1, 1000),
            default_gravity,
            layout: config.policy.layout,
            urgent_transients: config.policy.urgent_transients,
            gravities,
            rules,
            views,
            hotkeys: config.hotkeys,
            buttons: config.buttons,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
/// The base config derived from the config file.
///
/// This struct is then parsed into the `Config` struct.
pub struct ConfigDeserialized {
    /// Sizing parameters.
    sizing: Sizing,
    /// Placement policy.
    policy: Policy,
    /// Color parameters.
    colors: Colors,
    /// The gravity catalog, in order.
    gravities: Vec<GravityConfig>,
    /// The tag rules, in order.
    tags: Vec<TagConfig>,
    views: Vec<ViewConfig>,
    /// The specified hotkeys.
    hotkeys: Vec<HotkeyConfig>,
    /// The specified pointer bindings.
    buttons: Vec<ButtonConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct Sizing {
    /// The size of the window border.
    border_size: u32,
    /// The gap between the window's edge and the edge of its gravity.
    gap: i32,
    snap: i32,
    step: i32,
    collapsed_size: i32,
}

impl Default for Sizing {
    fn default() -> Self {
        Self {
            border_size: BORDER_SIZE,
            gap: GAP,
            snap: SNAP,
            step: STEP,
            collapsed_size: COLLAPSED_SIZE,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Policy {
    /// The name of the gravity new clients get. Empty to inherit the gravity of the focused client.
    default_gravity: String,
    layout: Layout,
    urgent_transients: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct Colors {
    /// The border color of the focused client (in hex format).
    focus: String,
    /// The border color of every other client (in hex format).
    normal: String,
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            focus: String::from("#74c7ec"),
            normal: String::from("#11111b"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A gravity as written in the config file.
pub struct GravityConfig {
    pub name: String,
    /// `[x, y, width, height]` in percent of the working area.
    pub geometry: [u32; 4],
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
/// A tag rule as written in the config file.
pub struct TagConfig {
    pub name: String,
    /// A regular expression matched against the window properties. Rules without one never match on their own.
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// The properties the pattern is matched against: `class`, `instance`, `name` and `role`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    pub float: bool,
    pub full: bool,
    pub stick: bool,
    pub urgent: bool,
    /// Disables size constraints for matching windows.
    pub resize: bool,
    pub no_float: bool,
    pub no_full: bool,
    pub no_stick: bool,
    pub no_urgent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_type: Option<ClientType>,
    /// A fixed `[x, y, width, height]`, which also makes the window float.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<[i32; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// A view as written in the config file.
pub struct ViewConfig {
    pub name: String,
    /// A regular expression selecting tags by name.
    pub tags: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A helper struct for getting the required hotkey information.
pub struct HotkeyConfig {
    /// The modifiers (e.g. CONTROL or SHIFT) of the hotkey.
    pub modifiers: String,
    /// The non modifier key to be pressed.
    pub key: String,
    /// The resulting action of the hotkey.
    pub action: HotkeyAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A helper struct for getting the required pointer binding information.
pub struct ButtonConfig {
    pub modifiers: String,
    /// The pointer button, 1 being the left one.
    pub button: u8,
    pub action: HotkeyAction,
}

impl ConfigDeserialized {
    /// Creates a new config from a file.
    #[must_use]
    pub fn new() -> Self {
        let path =
            match xdg::BaseDirectories::with_prefix("tessera").place_config_file("config.toml") {
                Ok(p) => p,
                Err(e) => {
                    log::error!("cant create config file with error {e:?}, using default");
                    return Self::default();
                }
            };

        log::info!("loading config from {}", path.display());

        let config_str = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) => {
                log::info!("config not found {e:?}, serializing default");

                let Ok(serialized) = toml::to_string(&Self::default()) else {
                    log::error!("couldn't serialize config into file, using default");
                    return Self::default();
                };

                match std::fs::write(&path, serialized) {
                    Ok(()) => log::info!("created default config at {}", path.display()),
                    Err(_) => {
                        log::error!("couldn't write to file, using default");
                    }
                }

                return Self::default();
            }
        };

        match toml::from_str(&config_str) {
            Ok(d) => d,
            Err(e) => {
                log::error!("error parsing config {e:?}, using default");
                Self::default()
            }
        }
    }
}

fn gravity(name: &str, geometry: [u32; 4]) -> GravityConfig {
    GravityConfig {
        name: name.to_owned(),
        geometry,
    }
}

fn tag(name: &str, pattern: Option<&str>) -> TagConfig {
    TagConfig {
        name: name.to_owned(),
        pattern: pattern.map(str::to_owned),
        ..TagConfig::default()
    }
}

fn view(name: &str, tags: &str) -> ViewConfig {
    ViewConfig {
        name: name.to_owned(),
        tags: tags.to_owned(),
    }
}

fn hotkey(modifiers: &str, key: &str, action: HotkeyAction) -> HotkeyConfig {
    HotkeyConfig {
        modifiers: modifiers.to_owned(),
        key: key.to_owned(),
        action,
    }
}

/// The gravity catalog, a 3x3 grid in three sizes each plus a few special purpose cells.
fn default_gravities() -> Vec<GravityConfig> {
    vec![
        gravity("top_left", [0, 0, 50, 50]),
        gravity("top_left66", [0, 0, 50, 66]),
        gravity("top_left33", [0, 0, 50, 34]),
        gravity("top", [0, 0, 100, 50]),
        gravity("top66", [0, 0, 100, 66]),
        gravity("top33", [0, 0, 100, 34]),
        gravity("top_right", [100, 0, 50, 50]),
        gravity("top_right66", [100, 0, 50, 66]),
        gravity("top_right33", [100, 0, 50, 34]),
        gravity("left", [0, 0, 50, 100]),
        gravity("left66", [0, 50, 50, 34]),
        gravity("left33", [0, 50, 25, 34]),
        gravity("center", [0, 0, 100, 100]),
        gravity("center66", [0, 50, 100, 34]),
        gravity("center33", [50, 50, 50, 34]),
        gravity("right", [100, 0, 50, 100]),
        gravity("right66", [100, 50, 50, 34]),
        gravity("right33", [100, 50, 25, 34]),
        gravity("bottom_left", [0, 100, 50, 50]),
        gravity("bottom_left66", [0, 100, 50, 66]),
        gravity("bottom_left33", [0, 100, 50, 34]),
        gravity("bottom", [0, 100, 100, 50]),
        gravity("bottom66", [0, 100, 100, 66]),
        gravity("bottom33", [0, 100, 100, 34]),
        gravity("bottom_right", [100, 100, 50, 50]),
        gravity("bottom_right66", [100, 100, 50, 66]),
        gravity("bottom_right33", [100, 100, 50, 34]),
        gravity("gimp_image", [50, 50, 80, 100]),
        gravity("gimp_toolbox", [0, 0, 10, 100]),
        gravity("gimp_dock", [100, 0, 10, 100]),
    ]
}

fn default_tags() -> Vec<TagConfig> {
    let mut editor = tag("editor", Some("[g]?vim"));
    editor.resize = true;

    let mut fixed = tag("fixed", None);
    fixed.geometry = Some([10, 10, 100, 100]);
    fixed.stick = true;

    let mut resize = tag("resize", Some("sakura|gvim"));
    resize.resize = true;

    let mut centered = tag("gravity", None);
    centered.gravity = Some(String::from("center"));

    let mut stick = tag("stick", Some("mplayer"));
    stick.float = true;
    stick.stick = true;

    let mut float = tag("float", Some("display"));
    float.float = true;

    let gimp = |name: &str, role: &str| {
        let mut rule = tag(name, Some(role));
        rule.fields = vec![String::from("role")];
        rule.gravity = Some(name.to_owned());
        rule
    };

    vec![
        tag("default", None),
        tag("terms", Some("xterm|[u]?rxvt|alacritty")),
        tag("browser", Some("uzbl|opera|firefox|navigator|librewolf")),
        editor,
        fixed,
        resize,
        centered,
        stick,
        float,
        gimp("gimp_image", "gimp-image-window"),
        gimp("gimp_toolbox", "gimp-toolbox$"),
        gimp("gimp_dock", "gimp-dock"),
    ]
}

fn default_hotkeys() -> Vec<HotkeyConfig> {
    let cycle = |names: [&str; 3]| HotkeyAction::Gravity(names.map(str::to_owned).to_vec());

    let mut hotkeys = vec![
        // terminal
        hotkey("MOD", "XK_Return", HotkeyAction::Spawn(String::from("alacritty"))),
        // app starter
        hotkey("MOD", "c", HotkeyAction::Spawn(String::from("rofi -show drun"))),
        // shutdown
        hotkey("CONTROL|MOD", "q", HotkeyAction::Spawn(String::from("killall tessera"))),
        // close window
        hotkey("MOD|SHIFT", "k", HotkeyAction::Kill),
        hotkey("CONTROL|MOD|SHIFT", "k", HotkeyAction::ForceKill),
        // modes
        hotkey("MOD", "f", HotkeyAction::ToggleFloat),
        hotkey("MOD", "space", HotkeyAction::ToggleFull),
        hotkey("MOD", "s", HotkeyAction::ToggleStick),
        hotkey("MOD", "e", HotkeyAction::ToggleResize),
        // stacking
        hotkey("MOD", "r", HotkeyAction::Raise),
        hotkey("MOD", "l", HotkeyAction::Lower),
        // selection
        hotkey("MOD", "XK_Left", HotkeyAction::Select(Direction::Left)),
        hotkey("MOD", "XK_Down", HotkeyAction::Select(Direction::Down)),
        hotkey("MOD", "XK_Up", HotkeyAction::Select(Direction::Up)),
        hotkey("MOD", "XK_Right", HotkeyAction::Select(Direction::Right)),
        // views
        hotkey("", "KP_Add", HotkeyAction::ViewNext(1)),
        hotkey("", "KP_Subtract", HotkeyAction::ViewNext(-1)),
        // gravities
        hotkey("MOD", "KP_7", cycle(["top_left", "top_left66", "top_left33"])),
        hotkey("MOD", "KP_8", cycle(["top", "top66", "top33"])),
        hotkey("MOD", "KP_9", cycle(["top_right", "top_right66", "top_right33"])),
        hotkey("MOD", "KP_4", cycle(["left", "left66", "left33"])),
        hotkey("MOD", "KP_5", cycle(["center", "center66", "center33"])),
        hotkey("MOD", "KP_6", cycle(["right", "right66", "right33"])),
        hotkey("MOD", "KP_1", cycle(["bottom_left", "bottom_left66", "bottom_left33"])),
        hotkey("MOD", "KP_2", cycle(["bottom", "bottom66", "bottom33"])),
        hotkey("MOD", "KP_3", cycle(["bottom_right", "bottom_right66", "bottom_right33"])),
        // tiles
        hotkey("MOD", "h", HotkeyAction::TileNew(Axis::Horizontal)),
        hotkey("MOD", "v", HotkeyAction::TileNew(Axis::Vertical)),
        hotkey("MOD|SHIFT", "d", HotkeyAction::TileDelete),
        hotkey("MOD|SHIFT", "s", HotkeyAction::TileShade),
    ];
    // switch to view
    hotkeys.extend((1..=4).map(|x| hotkey("MOD", &x.to_string(), HotkeyAction::ViewSwitch(x))));
    hotkeys
}

impl Default for ConfigDeserialized {
    /// Creates a new default Config if there was a problem with the specified path or config file
    fn default() -> Self {
        log::info!("using default config");
        Self {
            sizing: Sizing::default(),
            policy: Policy::default(),
            colors: Colors::default(),
            gravities: default_gravities(),
            tags: default_tags(),
            views: vec![
                view("terms", "terms|default"),
                view("www", "browser"),
                view("gimp", "gimp_.*"),
                view("dev", "editor"),
            ],
            hotkeys: default_hotkeys(),
            buttons: vec![
                ButtonConfig {
                    modifiers: String::from("MOD"),
                    button: 1,
                    action: HotkeyAction::WindowMove,
                },
                ButtonConfig {
                    modifiers: String::from("MOD"),
                    button: 3,
                    action: HotkeyAction::WindowResize,
                },
            ],
        }
    }
}
