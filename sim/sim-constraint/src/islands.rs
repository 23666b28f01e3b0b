//! Constraint islands for parallel row derivation.
//!
//! An island is a group of bodies connected through contacts or joints.
//! Rows of different islands never reference the same movable body, so
//! islands can be derived (and later solved) concurrently.
//!
//! # Algorithm
//!
//! Island detection uses a union-find (disjoint-set) data structure:
//!
//! 1. Each movable body starts in its own island
//! 2. For each constraint, union the islands of its movable bodies
//! 3. Number islands by the first appearance of their bodies
//!
//! Immovable bodies are never unioned. A floor touched by two separate
//! stacks would otherwise glue them into one island even though no force
//! can travel through it.
//!
//! # Example
//!
//! ```
//! use sim_constraint::{ConstraintIslands, ConstraintLink};
//! use sim_types::BodyId;
//!
//! struct Link(u64, u64);
//! impl ConstraintLink for Link {
//!     fn body0(&self) -> BodyId { BodyId::new(self.0) }
//!     fn body1(&self) -> BodyId { BodyId::new(self.1) }
//! }
//!
//! // Two stacks on a shared static floor (body 0).
//! let links = vec![Link(1, 0), Link(2, 1), Link(3, 0), Link(4, 3)];
//! let islands = ConstraintIslands::build_with_static_info(&links, |id| id.raw() == 0);
//!
//! assert_eq!(islands.num_islands(), 2);
//! assert!(!islands.same_island(BodyId::new(2), BodyId::new(4)));
//! ```

use hashbrown::HashMap;
use sim_types::BodyId;

use crate::ConstraintLink;

/// Bodies connected through active constraints, plus those constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Island {
    /// Movable bodies, sorted by ID.
    pub bodies: Vec<BodyId>,
    /// Indices into the link slice the islands were built from, ascending.
    pub constraint_indices: Vec<usize>,
    /// Set when every body of the island is immovable; such an island
    /// contributes no rows.
    pub is_static: bool,
}

impl Island {
    /// Whether `body` belongs to this island.
    #[must_use]
    pub fn contains_body(&self, body: BodyId) -> bool {
        self.bodies.binary_search(&body).is_ok()
    }
}

/// Partition of a set of links into islands.
#[derive(Debug, Clone, Default)]
pub struct ConstraintIslands {
    islands: Vec<Island>,
    body_to_island: HashMap<BodyId, usize>,
}

impl ConstraintIslands {
    /// Build islands treating every body as movable.
    #[must_use]
    pub fn build<L: ConstraintLink>(links: &[L]) -> Self {
        Self::build_with_static_info(links, |_| false)
    }

    /// Build islands, never merging through bodies for which `is_body_static` holds.
    ///
    /// A link between two immovable bodies lands in an island of its own,
    /// marked static. Islands are numbered in the order their first body
    /// appears in `links`.
    #[must_use]
    pub fn build_with_static_info<L, F>(links: &[L], is_body_static: F) -> Self
    where
        L: ConstraintLink,
        F: Fn(BodyId) -> bool,
    {
        // each link is anchored on a movable body when it has one
        let anchors: Vec<(BodyId, Option<BodyId>)> = links
            .iter()
            .map(|link| {
                let (a, b) = (link.body0(), link.body1());
                match (is_body_static(a), is_body_static(b)) {
                    (false, false) => (a, Some(b)),
                    (true, false) => (b, None),
                    _ => (a, None),
                }
            })
            .collect();

        let mut order: Vec<BodyId> = Vec::new();
        let mut slot: HashMap<BodyId, usize> = HashMap::new();
        for &(a, b) in &anchors {
            for id in std::iter::once(a).chain(b) {
                slot.entry(id).or_insert_with(|| {
                    order.push(id);
                    order.len() - 1
                });
            }
        }

        let mut sets = DisjointSets::new(order.len());
        for &(a, b) in &anchors {
            if let Some(b) = b {
                sets.merge(slot[&a], slot[&b]);
            }
        }

        let mut root_to_island: HashMap<usize, usize> = HashMap::new();
        let mut islands: Vec<Island> = Vec::new();
        let mut body_to_island: HashMap<BodyId, usize> = HashMap::with_capacity(order.len());
        for (index, &body) in order.iter().enumerate() {
            let root = sets.root(index);
            let island = *root_to_island.entry(root).or_insert_with(|| {
                islands.push(Island::default());
                islands.len() - 1
            });
            islands[island].bodies.push(body);
            body_to_island.insert(body, island);
        }

        for (link, &(anchor, _)) in anchors.iter().enumerate() {
            if let Some(&island) = body_to_island.get(&anchor) {
                islands[island].constraint_indices.push(link);
            }
        }
        for island in &mut islands {
            island.bodies.sort_unstable();
            island.is_static = island.bodies.iter().all(|&id| is_body_static(id));
        }

        Self {
            islands,
            body_to_island,
        }
    }

    /// Number of islands, static ones included.
    #[must_use]
    pub fn num_islands(&self) -> usize {
        self.islands.len()
    }

    /// All islands.
    #[must_use]
    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    /// Island index of `body`. An immovable body only has one if it
    /// anchors a link between two immovable bodies.
    #[must_use]
    pub fn island_for_body(&self, body: BodyId) -> Option<usize> {
        self.body_to_island.get(&body).copied()
    }

    /// Whether both bodies ended up in the same island.
    #[must_use]
    pub fn same_island(&self, a: BodyId, b: BodyId) -> bool {
        matches!(
            (self.island_for_body(a), self.island_for_body(b)),
            (Some(x), Some(y)) if x == y
        )
    }

    /// Number of islands that contribute rows.
    #[must_use]
    pub fn num_active_islands(&self) -> usize {
        self.islands.iter().filter(|i| !i.is_static).count()
    }

    /// Islands that contribute rows, with their index.
    pub fn active_islands(&self) -> impl Iterator<Item = (usize, &Island)> {
        self.islands.iter().enumerate().filter(|(_, i)| !i.is_static)
    }
}

/// Disjoint sets over `0..n` with union by size and path halving.
struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn root(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn merge(&mut self, a: usize, b: usize) {
        let (mut a, mut b) = (self.root(a), self.root(b));
        if a == b {
            return;
        }
        if self.size[a] < self.size[b] {
            std::mem::swap(&mut a, &mut b);
        }
        self.parent[b] = a;
        self.size[a] += self.size[b];
    }
}
