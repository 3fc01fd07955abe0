//!
//! This module holds the pure geometry of the manager: rectangles, the gravity catalog and the functions mapping a gravity onto a screen.
//!
//! Nothing in here talks to the X11 server, every function takes and returns plain values.
use core::fmt;

/// The gravity index reserved for "unknown". It maps to the whole working area.
pub const GRAVITY_UNKNOWN: usize = 0;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
/// A rectangle in root window coordinates.
///
/// For client geometry `x` and `y` are the outer corner of the window while `width` and `height` exclude the border, which is how X11 itself configures windows.
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The first column to the right of the rectangle.
    #[must_use]
    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    /// The first row below the rectangle.
    #[must_use]
    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    #[must_use]
    pub const fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    #[must_use]
    pub const fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Returns whether the outer extent of a window with this geometry and `border` lies inside `area`.
    #[must_use]
    pub const fn fits_in(&self, border: i32, area: &Self) -> bool {
        self.x >= area.x
            && self.y >= area.y
            && self.x + self.width + 2 * border <= area.right()
            && self.y + self.height + 2 * border <= area.bottom()
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.x, self.y, self.width, self.height)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
/// A named placement slot, given in percent of a screen's working area.
pub struct Gravity {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Gravity {
    /// Creates a gravity, clamping every percentage to 100.
    #[must_use]
    pub fn new(name: &str, geometry: [u32; 4]) -> Self {
        let [x, y, width, height] = geometry.map(|v| v.min(100));
        Self {
            name: name.to_owned(),
            x,
            y,
            width,
            height,
        }
    }
}

/// The ordered list of gravities. Index 0 is always the reserved unknown gravity.
#[derive(Clone, Debug)]
pub struct GravityCatalog {
    gravities: Vec<Gravity>,
}

impl GravityCatalog {
    /// Creates a catalog, placing the reserved unknown gravity in front of `gravities`.
    #[must_use]
    pub fn new(gravities: Vec<Gravity>) -> Self {
        let mut all = Vec::with_capacity(gravities.len() + 1);
        all.push(Gravity::new("unknown", [0, 0, 100, 100]));
        all.extend(gravities);
        Self { gravities: all }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.gravities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gravities.len() <= 1
    }

    /// Clamps an index into the catalog. Negative indices become 0, indices past the end become the last gravity.
    #[must_use]
    pub fn clamp_index(&self, index: i64) -> usize {
        if index < 0 {
            return GRAVITY_UNKNOWN;
        }
        (index as usize).min(self.gravities.len() - 1)
    }

    /// Gets a gravity, clamping the index.
    #[must_use]
    pub fn get(&self, index: usize) -> &Gravity {
        &self.gravities[index.min(self.gravities.len() - 1)]
    }

    /// Finds a gravity index by its name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        self.gravities
            .iter()
            .skip(1)
            .position(|g| g.name == name)
            .map(|i| i + 1)
    }

    /// Serializes the catalog in the `XxY+W+H#name` form used for the gravity list property.
    #[must_use]
    pub fn publish_strings(&self) -> Vec<String> {
        self.gravities
            .iter()
            .skip(1)
            .map(|g| format!("{}x{}+{}+{}#{}", g.x, g.y, g.width, g.height, g.name))
            .collect()
    }
}

/// Scales `value` by `percent`, rounding towards zero.
fn percent_of(value: i32, percent: u32) -> i32 {
    (i64::from(value) * i64::from(percent) / 100) as i32
}

/// Maps a gravity onto a working area.
///
/// The percentage cell is computed first, then the gap and the border are taken from the inside of the cell. Cells anchored at 100% would start outside of the area, so the result is fitted back into it.
#[must_use]
pub fn gravity_rect(gravity: &Gravity, area: &Rect, border: i32, gap: i32) -> Rect {
    let cell = Rect {
        x: area.x + percent_of(area.width, gravity.x),
        y: area.y + percent_of(area.height, gravity.y),
        width: percent_of(area.width, gravity.width),
        height: percent_of(area.height, gravity.height),
    };

    let rect = Rect {
        x: cell.x + gap,
        y: cell.y + gap,
        width: (cell.width - 2 * border - 2 * gap).max(1),
        height: (cell.height - 2 * border - 2 * gap).max(1),
    };

    let mut fitted = fit(rect, border, area);
    // keep the gap towards the edge the cell was pushed against
    if fitted.x != rect.x && fitted.right() + 2 * border == area.right() {
        fitted.x = (fitted.x - gap).max(area.x);
    }
    if fitted.y != rect.y && fitted.bottom() + 2 * border == area.bottom() {
        fitted.y = (fitted.y - gap).max(area.y);
    }
    fitted
}

/// Clamps a window geometry into `area`.
///
/// The position is moved so the outer extent lies inside the area. The size only shrinks when the window is larger than the area.
#[must_use]
pub fn fit(rect: Rect, border: i32, area: &Rect) -> Rect {
    let mut fitted = rect;

    if fitted.width + 2 * border > area.width {
        fitted.width = (area.width - 2 * border).max(1);
    }
    if fitted.height + 2 * border > area.height {
        fitted.height = (area.height - 2 * border).max(1);
    }

    let max_x = area.right() - fitted.width - 2 * border;
    let max_y = area.bottom() - fitted.height - 2 * border;
    fitted.x = fitted.x.clamp(area.x, max_x.max(area.x));
    fitted.y = fitted.y.clamp(area.y, max_y.max(area.y));
    fitted
}

/// Pulls the edges of a window towards the edges of `area` when they are closer than `threshold`.
///
/// `rect` is given in content coordinates (the origin of the window inside its border), as used while dragging.
#[must_use]
pub fn snap(rect: Rect, border: i32, area: &Rect, threshold: i32) -> Rect {
    let mut snapped = rect;

    if (rect.x - border - area.x).abs() < threshold {
        snapped.x = area.x + border;
    } else if (area.right() - (rect.right() + border)).abs() < threshold {
        snapped.x = area.right() - rect.width - border;
    }

    if (rect.y - border - area.y).abs() < threshold {
        snapped.y = area.y + border;
    } else if (area.bottom() - (rect.bottom() + border)).abs() < threshold {
        snapped.y = area.bottom() - rect.height - border;
    }
    snapped
}

/// Centers a window of the given inner size inside `area`.
#[must_use]
pub fn center(width: i32, height: i32, border: i32, area: &Rect) -> Rect {
    fit(
        Rect {
            x: area.x + (area.width - width - 2 * border) / 2,
            y: area.y + (area.height - height - 2 * border) / 2,
            width,
            height,
        },
        border,
        area,
    )
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
/// Space reserved at the edges of the root window, as advertised by `_NET_WM_STRUT`.
pub struct Strut {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
/// A physical screen.
pub struct Screen {
    /// The full rectangle of the screen.
    pub base: Rect,
    /// The base rectangle minus the space reserved by struts.
    pub work: Rect,
}

impl Screen {
    #[must_use]
    pub const fn new(base: Rect) -> Self {
        Self { base, work: base }
    }

    /// Recomputes the working area from the struts of the docks on this screen.
    ///
    /// Struts are relative to the edges of `root`, so only the part reaching into this screen is reserved.
    pub fn apply_struts<'a>(&mut self, root: &Rect, struts: impl IntoIterator<Item = &'a Strut>) {
        let base = self.base;
        let (mut left, mut right, mut top, mut bottom) = (0, 0, 0, 0);
        for strut in struts {
            left = left.max(strut.left - (base.x - root.x));
            right = right.max(strut.right - (root.right() - base.right()));
            top = top.max(strut.top - (base.y - root.y));
            bottom = bottom.max(strut.bottom - (root.bottom() - base.bottom()));
        }
        self.work = Rect {
            x: base.x + left,
            y: base.y + top,
            width: (base.width - left - right).max(1),
            height: (base.height - top - bottom).max(1),
        };
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

/// Finds the rectangle nearest to `origin` in `direction`.
///
/// Candidates must have their center beyond the center of `origin`. They are scored by the distance between the facing edges plus the offset of their centers on the other axis.
pub fn nearest<T: Copy>(
    origin: &Rect,
    direction: Direction,
    candidates: impl IntoIterator<Item = (T, Rect)>,
) -> Option<T> {
    let (ox, oy) = origin.center();
    candidates
        .into_iter()
        .filter_map(|(id, rect)| {
            let (cx, cy) = rect.center();
            let score = match direction {
                Direction::Left if cx < ox => (origin.x - rect.right()).abs() + (cy - oy).abs(),
                Direction::Right if cx > ox => (rect.x - origin.right()).abs() + (cy - oy).abs(),
                Direction::Up if cy < oy => (origin.y - rect.bottom()).abs() + (cx - ox).abs(),
                Direction::Down if cy > oy => (rect.y - origin.bottom()).abs() + (cx - ox).abs(),
                _ => return None,
            };
            Some((score, id))
        })
        .min_by_key(|(score, _)| *score)
        .map(|(_, id)| id)
}
