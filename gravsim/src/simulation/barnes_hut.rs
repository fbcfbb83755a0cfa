//! # Barnes–Hut Quadtree (2D)
//!
//! This module implements a **2D Barnes–Hut quadtree** for approximating
//! gravitational acceleration in an `N`-body system. It replaces the naive
//! `O(N²)` all-pairs force calculation with an approximate `O(N log N)`
//! method while preserving good accuracy for distant interactions.
//!
//! ## Core Concepts
//!
//! A group of distant bodies is treated as a single pseudo-body located at
//! its center of mass. For sufficiently far clusters, evaluating one
//! interaction is drastically cheaper than computing many individual forces.
//!
//! - The simulation plane is recursively subdivided into 4 regions (quadrants).
//! - Each region becomes a node of the quadtree.
//! - Leaf nodes hold at most one body, or they are subdivided further.
//! - Each node stores:
//!   - total mass of its subtree
//!   - center of mass (COM)
//!   - bounding square (for computing size and subdivision)
//!
//! The tree is rebuilt from the body store on every step. Nothing is kept
//! between steps, so there are no incremental-update invariants to maintain;
//! the price is a full `O(N log N)` rebuild per step.
//!
//! ## Depth limit
//!
//! Bodies sharing the exact same position can never be separated by
//! subdivision. Once a node reaches [`MAX_DEPTH`] it stops splitting and
//! keeps extra occupants in [`BarnesHutNode::coincident`]; they interact
//! pairwise through the softened force law like any other leaf body.

use crate::simulation::forces::softened_pull;
use crate::simulation::states::{NVec2, System};

/// Deepest level a node may be split to
pub const MAX_DEPTH: u32 = 48;

/// A single quadtree node for the 2D Barnes–Hut algorithm.
///
/// Each node represents a square region of the plane that may contain:
/// - zero bodies (empty)
/// - exactly one body (leaf node, `body_index = Some(i)`)
/// - multiple bodies (internal node with children)
///
/// The node stores both geometric bounds and aggregate physical data
/// (total mass and center-of-mass) used to approximate distant regions.
#[derive(Debug, Clone)]
pub struct BarnesHutNode {
    pub mass: f64,
    pub com: NVec2,
    pub bbox_min: NVec2,
    pub bbox_max: NVec2,
    pub children: [Option<usize>; 4], // indices into BarnesHutTree::nodes
    pub body_index: Option<usize>,    // Some(i) if this leaf holds body i
    pub coincident: Vec<usize>,       // extra occupants of a leaf at MAX_DEPTH
    pub depth: u32,
}

impl BarnesHutNode {
    fn empty(bbox_min: NVec2, bbox_max: NVec2, depth: u32) -> Self {
        Self {
            mass: 0.0,
            com: NVec2::zeros(),
            bbox_min,
            bbox_max,
            children: [None; 4],
            body_index: None,
            coincident: Vec::new(),
            depth,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(|c| c.is_none())
    }

    /// Side length of the node's square
    pub fn width(&self) -> f64 {
        let size = self.bbox_max - self.bbox_min;
        size.x.max(size.y)
    }

    fn contains(&self, p: &NVec2) -> bool {
        p.x >= self.bbox_min.x && p.x <= self.bbox_max.x && p.y >= self.bbox_min.y && p.y <= self.bbox_max.y
    }

    /// Body indices stored directly in this node
    pub fn occupants(&self) -> impl Iterator<Item = usize> + '_ {
        self.body_index.into_iter().chain(self.coincident.iter().copied())
    }
}

/// The body being evaluated plus the force-law constants for one traversal
struct Probe {
    body_idx: usize,
    pos: NVec2,
    g: f64,
    eps2: f64,
    theta: f64,
}

/// A complete 2D Barnes–Hut quadtree built over an N-body system.
///
/// This structure owns:
/// - a vector of all quadtree nodes (`nodes`)
/// - an index into that list representing the root (`root`)
pub struct BarnesHutTree {
    pub nodes: Vec<BarnesHutNode>,
    pub root: usize,
}

impl BarnesHutTree {
    /// Build a 2D Barnes–Hut quadtree from the current state of the system.
    ///
    /// This:
    /// 1. Computes a global bounding square that encloses all bodies.
    /// 2. Creates a root node covering that square.
    /// 3. Inserts each body into the tree, subdividing nodes as needed.
    /// 4. Computes total mass and center-of-mass for every node (bottom-up).
    pub fn build(sys: &System) -> Self {
        let (bbox_min, bbox_max) = compute_global_bbox(sys);

        let mut nodes = Vec::with_capacity(2 * sys.bodies.len() + 1);
        let root = 0;
        nodes.push(BarnesHutNode::empty(bbox_min, bbox_max, 0));

        let mut tree = BarnesHutTree { nodes, root };

        for i in 0..sys.bodies.len() {
            tree.insert_body(root, i, sys);
        }

        tree.compute_mass_and_com(sys, root);

        tree
    }

    pub fn root_node(&self) -> &BarnesHutNode {
        &self.nodes[self.root]
    }

    /// Compute the net gravitational acceleration on a single body using the tree.
    ///
    /// - For nodes far enough away (`width / distance < theta`), the node's
    ///   total mass and center-of-mass act as a single pseudo-body.
    /// - Nodes that are too close, or that contain the body itself, are opened
    ///   and their children visited.
    /// - Leaves interact exactly, skipping the body itself.
    ///
    /// With `theta = 0` no node is ever approximated and the result equals the
    /// direct sum.
    pub fn force_on_body(&self, i: usize, sys: &System, g: f64, eps2: f64, theta: f64) -> NVec2 {
        let probe = Probe {
            body_idx: i,
            pos: sys.bodies[i].x,
            g,
            eps2,
            theta,
        };
        let mut acc = NVec2::zeros();
        self.traverse_node(self.root, &probe, sys, &mut acc);
        acc
    }

    // helpers ==============================================================================

    /// Insert a single body into the quadtree, starting from the given node.
    ///
    /// - Empty leaf: the body is stored here.
    /// - Occupied leaf: the existing body is pushed down into a child quadrant
    ///   and the new body follows it, splitting again if both land together.
    ///   At `MAX_DEPTH` the new body is parked next to the existing one.
    /// - Internal node: the body is forwarded to the child quadrant containing it.
    fn insert_body(&mut self, node_idx: usize, body_idx: usize, sys: &System) {
        let node = &self.nodes[node_idx];
        let is_leaf = node.is_leaf();
        let existing = node.body_index;
        let depth = node.depth;

        if is_leaf {
            match existing {
                None => {
                    self.nodes[node_idx].body_index = Some(body_idx);
                    return;
                }
                Some(_) if depth >= MAX_DEPTH => {
                    self.nodes[node_idx].coincident.push(body_idx);
                    return;
                }
                Some(existing_idx) => {
                    self.nodes[node_idx].body_index = None;
                    self.insert_into_child(node_idx, existing_idx, sys);
                }
            }
        }

        self.insert_into_child(node_idx, body_idx, sys);
    }

    /// Forward `body_idx` into the child quadrant of `node_idx` containing it,
    /// creating that child on first use.
    fn insert_into_child(&mut self, node_idx: usize, body_idx: usize, sys: &System) {
        let bbox_min = self.nodes[node_idx].bbox_min;
        let bbox_max = self.nodes[node_idx].bbox_max;
        let depth = self.nodes[node_idx].depth;
        let pos = sys.bodies[body_idx].x;

        let child_idx = child_index_for_point(&pos, &bbox_min, &bbox_max);
        let child_node_idx = match self.nodes[node_idx].children[child_idx] {
            Some(idx) => idx,
            None => {
                let (cmin, cmax) = child_bbox(&bbox_min, &bbox_max, child_idx);
                let new_idx = self.nodes.len();
                self.nodes.push(BarnesHutNode::empty(cmin, cmax, depth + 1));
                self.nodes[node_idx].children[child_idx] = Some(new_idx);
                new_idx
            }
        };

        self.insert_body(child_node_idx, body_idx, sys);
    }

    /// Recursively compute total mass and center-of-mass for a subtree.
    ///
    /// After this pass every node's `mass` is the sum of the masses below it
    /// and `com` is their mass-weighted mean position.
    fn compute_mass_and_com(&mut self, sys: &System, node_idx: usize) {
        let mut mass = 0.0;
        let mut com = NVec2::zeros();

        let children = self.nodes[node_idx].children; // [Option<usize>; 4] is Copy

        for bidx in self.nodes[node_idx].occupants() {
            let b = &sys.bodies[bidx];
            mass += b.m;
            com += b.x * b.m;
        }

        for child_idx in children.iter().flatten().copied() {
            self.compute_mass_and_com(sys, child_idx);
            let cn = &self.nodes[child_idx];
            if cn.mass > 0.0 {
                mass += cn.mass;
                com += cn.com * cn.mass;
            }
        }

        if mass > 0.0 {
            com /= mass;
        }

        let node = &mut self.nodes[node_idx];
        node.mass = mass;
        node.com = com;
    }

    /// Recursively traverse a subtree to accumulate Barnes–Hut acceleration.
    fn traverse_node(&self, node_idx: usize, probe: &Probe, sys: &System, acc: &mut NVec2) {
        let node = &self.nodes[node_idx];

        // Empty subtree (or only massless bodies): no contribution
        if node.mass == 0.0 {
            return;
        }

        if node.is_leaf() {
            for bidx in node.occupants() {
                if bidx == probe.body_idx {
                    continue; // no self-interaction
                }
                let b = &sys.bodies[bidx];
                *acc += softened_pull(&(b.x - probe.pos), b.m, probe.g, probe.eps2);
            }
            return;
        }

        let r = node.com - probe.pos;
        let dist = r.norm();

        // A node holding the probe is always opened so its own mass is never folded in
        let far_enough = dist > 0.0 && !node.contains(&probe.pos) && node.width() / dist < probe.theta;

        if far_enough {
            *acc += softened_pull(&r, node.mass, probe.g, probe.eps2);
        } else {
            for child_idx in node.children.iter().flatten().copied() {
                self.traverse_node(child_idx, probe, sys, acc);
            }
        }
    }
}

// helpers ===========================================================================

/// Compute a global bounding square enclosing all bodies in the system.
///
/// The axis-aligned extent is widened to a square around its center so the
/// node "size" used by the opening criterion is a single number. A
/// degenerate extent (one body, or all bodies coincident) gets unit size.
fn compute_global_bbox(sys: &System) -> (NVec2, NVec2) {
    let mut min = NVec2::new(f64::INFINITY, f64::INFINITY);
    let mut max = NVec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);

    for b in &sys.bodies {
        min.x = min.x.min(b.x.x);
        min.y = min.y.min(b.x.y);
        max.x = max.x.max(b.x.x);
        max.y = max.y.max(b.x.y);
    }

    if !(min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite()) {
        min = NVec2::zeros();
        max = NVec2::zeros();
    }

    let center = (min + max) * 0.5;
    let half_extent = (max - min) * 0.5;
    let mut half = half_extent.x.max(half_extent.y);
    if half <= 0.0 {
        half = 0.5;
    }

    let half = NVec2::new(half, half);
    (center - half, center + half)
}

/// Compute the quadrant index for a point within a node's bounding square.
///
/// - Bit 0 (value 1): X axis: 0 for left (x < center.x), 1 for right
/// - Bit 1 (value 2): Y axis: 0 for bottom (y < center.y), 1 for top
fn child_index_for_point(p: &NVec2, bbox_min: &NVec2, bbox_max: &NVec2) -> usize {
    let center = (bbox_min + bbox_max) * 0.5;
    let mut idx = 0;

    if p.x >= center.x { idx |= 1; } // bit 0
    if p.y >= center.y { idx |= 2; } // bit 1

    idx
}

/// Compute the bounding square for a given child quadrant, using the same
/// bit encoding as [`child_index_for_point`].
fn child_bbox(parent_min: &NVec2, parent_max: &NVec2, child_idx: usize) -> (NVec2, NVec2) {
    let center = (parent_min + parent_max) * 0.5;

    let mut min = *parent_min;
    let mut max = *parent_max;

    // x: bit 0
    if (child_idx & 1) == 0 {
        max.x = center.x;
    } else {
        min.x = center.x;
    }

    // y: bit 1
    if (child_idx & 2) == 0 {
        max.y = center.y;
    } else {
        min.y = center.y;
    }

    (min, max)
}
