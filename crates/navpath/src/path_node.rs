//! Search nodes and the open list used by [`DijkstraSearch`](crate::DijkstraSearch) and
//! [`AStarSearch`](crate::AStarSearch).

use glam::Vec3;
use slotmap::{SlotMap, new_key_type};

use crate::tri_cell::{CellId, TriCell};

new_key_type! {
    /// A key to a [`PathNode`] in a [`PathNodeHeap`].
    pub struct NodeKey;
}

/// One step of a corridor through the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathNode {
    /// The cell this node stands for.
    pub cell: CellId,
    /// The node this one was reached from. `None` for the start node.
    pub parent: Option<NodeKey>,
    /// The cost of the step from the parent to this node.
    pub local_g: f32,
    /// The total cost from the start to this node.
    pub g: f32,
    /// An estimate of the remaining cost to the goal.
    pub h: f32,
    /// The number of cells from the start up to and including this one.
    pub path_size: usize,
}

impl PathNode {
    /// Creates the node a search starts from.
    pub fn root(cell: CellId) -> Self {
        Self {
            cell,
            parent: None,
            local_g: 0.0,
            g: 0.0,
            h: 0.0,
            path_size: 1,
        }
    }

    /// The priority of the node in the open list.
    #[inline]
    pub fn f(&self) -> f32 {
        self.g + self.h
    }
}

/// A binary min-heap of [`PathNode`]s ordered by [`PathNode::f`].
///
/// The heap owns the nodes. Nodes stay accessible after they have been polled so that closed
/// nodes can serve as parents and paths can be walked back to the start.
#[derive(Debug, Clone, Default)]
pub struct PathNodeHeap {
    nodes: SlotMap<NodeKey, PathNode>,
    heap: Vec<NodeKey>,
}

impl PathNodeHeap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of open nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether there are no open nodes left.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Looks up a node, open or closed.
    #[inline]
    pub fn get(&self, key: NodeKey) -> Option<&PathNode> {
        self.nodes.get(key)
    }

    /// Adds a node to the open list.
    pub fn push(&mut self, node: PathNode) -> NodeKey {
        let key = self.nodes.insert(node);
        self.heap.push(key);
        self.sift_up(self.heap.len() - 1);
        key
    }

    /// Creates a node for `cell` reached from `parent` and adds it to the open list.
    pub fn push_child(&mut self, cell: CellId, parent: NodeKey, local_g: f32) -> Option<NodeKey> {
        let parent_node = self.nodes.get(parent)?;
        let node = PathNode {
            cell,
            parent: Some(parent),
            local_g,
            g: parent_node.g + local_g,
            h: 0.0,
            path_size: parent_node.path_size + 1,
        };
        Some(self.push(node))
    }

    /// The open node with the lowest cost.
    pub fn peek(&self) -> Option<NodeKey> {
        self.heap.first().copied()
    }

    /// Removes the open node with the lowest cost from the open list.
    pub fn poll(&mut self) -> Option<NodeKey> {
        if self.heap.is_empty() {
            return None;
        }
        let result = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some(result)
    }

    /// Reparents an open node if reaching it through `parent` is strictly cheaper.
    ///
    /// Returns whether the node was updated.
    pub fn relax(&mut self, key: NodeKey, parent: NodeKey, local_g: f32) -> bool {
        let Some(parent_node) = self.nodes.get(parent).copied() else {
            return false;
        };
        let Some(node) = self.nodes.get_mut(key) else {
            return false;
        };
        let g = parent_node.g + local_g;
        if g >= node.g {
            return false;
        }
        node.parent = Some(parent);
        node.local_g = local_g;
        node.g = g;
        node.path_size = parent_node.path_size + 1;
        self.update(key);
        true
    }

    /// Sets the heuristic of a node and restores the heap order.
    pub fn set_heuristic(&mut self, key: NodeKey, h: f32) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.h = h;
            self.update(key);
        }
    }

    /// Restores the heap order after the cost of an open node changed.
    pub fn update(&mut self, key: NodeKey) {
        let Some(index) = self.heap.iter().position(|k| *k == key) else {
            return;
        };
        if self.sift_up(index) == index {
            self.sift_down(index);
        }
    }

    /// The cells from the start to the node at `key`.
    pub fn path(&self, key: NodeKey) -> Vec<CellId> {
        let mut cells = Vec::new();
        let mut current = Some(key);
        while let Some(node) = current.and_then(|key| self.nodes.get(key)) {
            cells.push(node.cell);
            current = node.parent;
        }
        cells.reverse();
        cells
    }

    /// The cost of leaving `node`'s cell through `wall`.
    ///
    /// Measured from the midpoint of the wall the node was entered through, or from `start` for
    /// the root node.
    pub(crate) fn step_cost(
        &self,
        node: &PathNode,
        cell: &TriCell,
        wall: usize,
        start: Vec3,
    ) -> f32 {
        let entry_wall = node
            .parent
            .and_then(|parent| self.get(parent))
            .and_then(|parent| cell.link_index(parent.cell));
        match entry_wall {
            Some(entry_wall) => cell.link_point_distance(entry_wall, wall),
            None => cell.link_point_distance_sq(start, wall).sqrt(),
        }
    }

    /// Removes all nodes, open and closed.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.heap.clear();
    }

    fn f(&self, index: usize) -> f32 {
        self.nodes.get(self.heap[index]).map_or(f32::MAX, PathNode::f)
    }

    fn sift_up(&mut self, mut index: usize) -> usize {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.f(index) >= self.f(parent) {
                break;
            }
            self.heap.swap(index, parent);
            index = parent;
        }
        index
    }

    fn sift_down(&mut self, mut index: usize) {
        loop {
            let left = index * 2 + 1;
            let right = left + 1;
            let mut selected = index;
            if left < self.heap.len() && self.f(selected) > self.f(left) {
                selected = left;
            }
            if right < self.heap.len() && self.f(selected) > self.f(right) {
                selected = right;
            }
            if selected == index {
                break;
            }
            self.heap.swap(index, selected);
            index = selected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(cell: u32, g: f32) -> PathNode {
        PathNode {
            g,
            ..PathNode::root(CellId(cell))
        }
    }

    fn drain(heap: &mut PathNodeHeap) -> Vec<u32> {
        let mut cells = Vec::new();
        while let Some(key) = heap.poll() {
            cells.push(heap.get(key).unwrap().cell.0);
        }
        cells
    }

    #[test]
    fn polls_in_cost_order() {
        let mut heap = PathNodeHeap::new();
        for (cell, g) in [(0, 5.0), (1, 1.0), (2, 3.0), (3, 8.0), (4, 2.0), (5, 0.5)] {
            heap.push(node(cell, g));
        }
        assert_eq!(heap.len(), 6);
        assert_eq!(heap.get(heap.peek().unwrap()).unwrap().cell, CellId(5));
        assert_eq!(drain(&mut heap), vec![5, 1, 4, 2, 0, 3]);
        assert!(heap.is_empty());
        assert_eq!(heap.poll(), None);
    }

    #[test]
    fn relax_only_accepts_cheaper_parents() {
        let mut heap = PathNodeHeap::new();
        let root = heap.push(PathNode::root(CellId(0)));
        heap.poll();
        let far = heap.push(node(9, 10.0));
        let child = heap.push_child(CellId(1), root, 4.0).unwrap();
        assert_eq!(heap.get(child).unwrap().g, 4.0);
        assert_eq!(heap.get(child).unwrap().path_size, 2);

        let other = heap.push(node(2, 1.0));
        assert!(!heap.relax(child, other, 3.5));
        assert!(heap.relax(child, other, 2.0));
        let relaxed = heap.get(child).unwrap();
        assert_eq!(relaxed.g, 3.0);
        assert_eq!(relaxed.parent, Some(other));

        assert_eq!(heap.poll(), Some(other));
        assert_eq!(heap.poll(), Some(child));
        assert_eq!(heap.poll(), Some(far));
    }

    #[test]
    fn heuristic_restacks_node() {
        let mut heap = PathNodeHeap::new();
        let a = heap.push(node(0, 1.0));
        let b = heap.push(node(1, 2.0));
        heap.set_heuristic(a, 5.0);
        assert_eq!(heap.peek(), Some(b));
        assert_eq!(heap.get(a).unwrap().f(), 6.0);
    }

    #[test]
    fn path_walks_back_to_root() {
        let mut heap = PathNodeHeap::new();
        let root = heap.push(PathNode::root(CellId(3)));
        let a = heap.push_child(CellId(7), root, 1.0).unwrap();
        let b = heap.push_child(CellId(2), a, 1.0).unwrap();
        assert_eq!(heap.path(b), vec![CellId(3), CellId(7), CellId(2)]);
        assert_eq!(heap.path(root), vec![CellId(3)]);

        heap.clear();
        assert!(heap.get(root).is_none());
        assert!(heap.path(b).is_empty());
    }
}
