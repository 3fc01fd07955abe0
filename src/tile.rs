//!
//! This module implements the recursive tiling layout as a tree stored in an arena.
//!
//! A container splits its area evenly among its children along one axis. Containers nest, so a view can be cut into arbitrary grids.
use serde::{Deserialize, Serialize};
use x11rb::protocol::xproto::Window;

use crate::geometry::Rect;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
/// The axis a container splits along.
pub enum Axis {
    /// Children are placed side by side.
    Horizontal,
    /// Children are placed on top of each other.
    Vertical,
}

/// An index into the tile arena.
pub type TileId = usize;

#[derive(Clone, Debug)]
enum TileKind {
    Container { axis: Axis, children: Vec<TileId> },
    Leaf { window: Window, shaded: bool },
}

#[derive(Clone, Debug)]
struct TileNode {
    parent: Option<TileId>,
    kind: TileKind,
}

#[derive(Clone, Debug)]
/// A tiling tree. The root is always a container.
pub struct TileTree {
    nodes: Vec<Option<TileNode>>,
    root: TileId,
    /// The container new leaves are added to.
    active: TileId,
}

impl TileTree {
    #[must_use]
    pub fn new(axis: Axis) -> Self {
        Self {
            nodes: vec![Some(TileNode {
                parent: None,
                kind: TileKind::Container {
                    axis,
                    children: Vec::new(),
                },
            })],
            root: 0,
            active: 0,
        }
    }

    #[must_use]
    pub const fn root(&self) -> TileId {
        self.root
    }

    #[must_use]
    pub const fn active(&self) -> TileId {
        self.active
    }

    fn node(&self, id: TileId) -> Option<&TileNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn is_container(&self, id: TileId) -> bool {
        matches!(
            self.node(id),
            Some(TileNode {
                kind: TileKind::Container { .. },
                ..
            })
        )
    }

    fn alloc(&mut self, node: TileNode) -> TileId {
        if let Some(free) = self.nodes.iter().position(Option::is_none) {
            self.nodes[free] = Some(node);
            free
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn attach(&mut self, parent: TileId, kind: TileKind) -> Option<TileId> {
        if !self.is_container(parent) {
            return None;
        }
        let id = self.alloc(TileNode {
            parent: Some(parent),
            kind,
        });
        if let Some(Some(TileNode {
            kind: TileKind::Container { children, .. },
            ..
        })) = self.nodes.get_mut(parent)
        {
            children.push(id);
        }
        Some(id)
    }

    /// Creates a container inside `parent` and makes it the active one.
    pub fn add_container(&mut self, parent: TileId, axis: Axis) -> Option<TileId> {
        let id = self.attach(
            parent,
            TileKind::Container {
                axis,
                children: Vec::new(),
            },
        )?;
        self.active = id;
        Some(id)
    }

    /// Adds a window to the active container, unless it is already in the tree.
    pub fn add_window(&mut self, window: Window) -> Option<TileId> {
        if let Some(id) = self.find(window) {
            return Some(id);
        }
        self.attach(
            self.active,
            TileKind::Leaf {
                window,
                shaded: false,
            },
        )
    }

    /// Finds the leaf of a window.
    #[must_use]
    pub fn find(&self, window: Window) -> Option<TileId> {
        self.nodes.iter().position(|n| {
            matches!(n, Some(TileNode { kind: TileKind::Leaf { window: w, .. }, .. }) if *w == window)
        })
    }

    /// Collapses or expands the leaf of a window.
    pub fn toggle_shaded(&mut self, window: Window) {
        if let Some(id) = self.find(window) {
            if let Some(Some(TileNode {
                kind: TileKind::Leaf { shaded, .. },
                ..
            })) = self.nodes.get_mut(id)
            {
                *shaded = !*shaded;
            }
        }
    }

    /// Removes the leaf of a window.
    pub fn remove_window(&mut self, window: Window) {
        if let Some(id) = self.find(window) {
            self.remove(id);
        }
    }

    /// Removes a node and all of its descendants, returning the windows of the removed leaves.
    ///
    /// Removing the root only empties it. The parent of a removed active container becomes active.
    pub fn remove(&mut self, id: TileId) -> Vec<Window> {
        let mut windows = Vec::new();
        if id == self.root {
            let children = match self.node(id) {
                Some(TileNode {
                    kind: TileKind::Container { children, .. },
                    ..
                }) => children.clone(),
                _ => Vec::new(),
            };
            for child in children {
                windows.extend(self.remove(child));
            }
            self.active = self.root;
            return windows;
        }

        let parent = self.node(id).and_then(|n| n.parent);
        if let Some(Some(TileNode {
            kind: TileKind::Container { children, .. },
            ..
        })) = parent.and_then(|p| self.nodes.get_mut(p))
        {
            children.retain(|&c| c != id);
        }

        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(node) = self.nodes.get_mut(current).and_then(Option::take) else {
                continue;
            };
            match node.kind {
                TileKind::Container { children, .. } => pending.extend(children),
                TileKind::Leaf { window, .. } => windows.push(window),
            }
            if current == self.active {
                self.active = parent.unwrap_or(self.root);
            }
        }
        windows
    }

    /// Computes the cell of every leaf inside `area`.
    ///
    /// Shaded leaves take `collapsed` pixels along the axis of their container, the rest is split evenly between the other children. The remainder of the division goes to the last child.
    #[must_use]
    pub fn layout(&self, area: Rect, collapsed: i32) -> Vec<(Window, Rect)> {
        let mut cells = Vec::new();
        self.layout_node(self.root, area, collapsed, &mut cells);
        cells
    }

    fn is_shaded(&self, id: TileId) -> bool {
        matches!(
            self.node(id),
            Some(TileNode {
                kind: TileKind::Leaf { shaded: true, .. },
                ..
            })
        )
    }

    fn layout_node(&self, id: TileId, area: Rect, collapsed: i32, cells: &mut Vec<(Window, Rect)>) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            TileKind::Leaf { window, .. } => cells.push((*window, area)),
            TileKind::Container { axis, children } => {
                if children.is_empty() {
                    return;
                }
                let shaded = children.iter().filter(|&&c| self.is_shaded(c)).count() as i32;
                let open = (children.len() as i32 - shaded).max(1);
                let (start, length) = match axis {
                    Axis::Horizontal => (area.x, area.width),
                    Axis::Vertical => (area.y, area.height),
                };
                let each = (length - shaded * collapsed).max(0) / open;
                let end = start + length;

                let mut position = start;
                for (i, &child) in children.iter().enumerate() {
                    let size = if i == children.len() - 1 {
                        end - position
                    } else if self.is_shaded(child) {
                        collapsed
                    } else {
                        each
                    };
                    let cell = match axis {
                        Axis::Horizontal => Rect::new(position, area.y, size, area.height),
                        Axis::Vertical => Rect::new(area.x, position, area.width, size),
                    };
                    self.layout_node(child, cell, collapsed, cells);
                    position += size;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows(tree: &TileTree) -> Vec<Window> {
        tree.layout(Rect::new(0, 0, 0, 0), 0)
            .into_iter()
            .map(|(w, _)| w)
            .collect()
    }

    #[test]
    fn remainder_goes_to_the_last_child() {
        let mut tree = TileTree::new(Axis::Horizontal);
        for w in 1..=3 {
            tree.add_window(w);
        }
        let cells = tree.layout(Rect::new(0, 0, 100, 50), 10);
        assert_eq!(
            cells,
            vec![
                (1, Rect::new(0, 0, 33, 50)),
                (2, Rect::new(33, 0, 33, 50)),
                (3, Rect::new(66, 0, 34, 50)),
            ]
        );
    }

    #[test]
    fn shaded_children_take_the_collapsed_size() {
        let mut tree = TileTree::new(Axis::Vertical);
        for w in 1..=3 {
            tree.add_window(w);
        }
        tree.toggle_shaded(2);
        let cells = tree.layout(Rect::new(0, 0, 100, 100), 10);
        assert_eq!(cells[0].1, Rect::new(0, 0, 100, 45));
        assert_eq!(cells[1].1, Rect::new(0, 45, 100, 10));
        assert_eq!(cells[2].1, Rect::new(0, 55, 100, 45));
    }

    #[test]
    fn all_shaded_children_count_as_one() {
        let mut tree = TileTree::new(Axis::Horizontal);
        tree.add_window(1);
        tree.add_window(2);
        tree.toggle_shaded(1);
        tree.toggle_shaded(2);
        let cells = tree.layout(Rect::new(0, 0, 100, 100), 10);
        assert_eq!(cells[0].1.width, 10);
        assert_eq!(cells[1].1, Rect::new(10, 0, 90, 100));
    }

    #[test]
    fn containers_nest() {
        let mut tree = TileTree::new(Axis::Horizontal);
        tree.add_window(1);
        let nested = tree.add_container(tree.root(), Axis::Vertical);
        assert_eq!(nested, Some(tree.active()));
        tree.add_window(2);
        tree.add_window(3);

        let cells = tree.layout(Rect::new(0, 0, 200, 100), 0);
        assert_eq!(
            cells,
            vec![
                (1, Rect::new(0, 0, 100, 100)),
                (2, Rect::new(100, 0, 100, 50)),
                (3, Rect::new(100, 50, 100, 50)),
            ]
        );
    }

    #[test]
    fn removing_a_container_removes_descendants_and_resplits() {
        let mut tree = TileTree::new(Axis::Horizontal);
        tree.add_window(1);
        let Some(nested) = tree.add_container(tree.root(), Axis::Vertical) else {
            panic!("root is a container");
        };
        tree.add_window(2);
        tree.add_container(nested, Axis::Horizontal);
        tree.add_window(3);

        let mut removed = tree.remove(nested);
        removed.sort_unstable();
        assert_eq!(removed, vec![2, 3]);
        assert_eq!(tree.active(), tree.root());
        assert_eq!(
            tree.layout(Rect::new(0, 0, 200, 100), 0),
            vec![(1, Rect::new(0, 0, 200, 100))]
        );

        tree.add_window(4);
        assert_eq!(windows(&tree), vec![1, 4]);
    }

    #[test]
    fn removing_the_root_empties_it() {
        let mut tree = TileTree::new(Axis::Vertical);
        tree.add_window(1);
        tree.add_window(2);
        assert_eq!(tree.remove(tree.root()), vec![1, 2]);
        assert!(windows(&tree).is_empty());
        tree.remove_window(9);
    }
}
