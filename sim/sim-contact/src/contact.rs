//! Contact points, manifolds and the per-pair contact relation.

use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use parking_lot::RwLock;
use sim_constraint::{frame, BodyState, ConstraintLink, ConstraintRow, RowSource};
use sim_types::{BodyId, PairKey, Result, SimError};
use smallvec::SmallVec;
use tracing::trace;

use crate::ContactMaterial;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default minimum spacing between two points of one manifold.
pub const DEFAULT_PRUNE_TOLERANCE: f64 = 0.05;

/// A contact handle shared between the world and both bodies' registries.
pub type SharedContact = Arc<RwLock<Contact>>;

/// A single point of contact reported by the narrow phase.
///
/// The normal points from the second body of the pair toward the first,
/// so a positive relative velocity along it means the bodies separate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactPoint {
    /// Contact position in world coordinates.
    pub position: Point3<f64>,
    /// Unit contact normal.
    pub normal: Vector3<f64>,
    /// Two unit tangents, orthogonal to the normal and to each other.
    pub tangents: [Vector3<f64>; 2],
    /// Penetration depth (positive when overlapping).
    pub penetration: f64,
    /// Material and warm-start forces.
    pub material: ContactMaterial,
}

impl ContactPoint {
    /// Create a contact point with a tangent basis derived from the normal.
    ///
    /// A degenerate normal falls back to +Y.
    #[must_use]
    pub fn new(position: Point3<f64>, normal: Vector3<f64>, penetration: f64) -> Self {
        let normal = normal.try_normalize(1.0e-12).unwrap_or_else(Vector3::y);
        let tangent0 = frame::perpendicular(&normal);
        let tangent1 = normal.cross(&tangent0);
        Self {
            position,
            normal,
            tangents: [tangent0, tangent1],
            penetration,
            material: ContactMaterial::default(),
        }
    }

    /// Replace the tangent basis (e.g. aligned with the sliding direction).
    ///
    /// The first tangent is projected onto the contact plane; the second is
    /// rebuilt from the normal. A tangent parallel to the normal is ignored.
    #[must_use]
    pub fn with_tangent(mut self, tangent: Vector3<f64>) -> Self {
        let projected = tangent - self.normal * tangent.dot(&self.normal);
        if let Some(t0) = projected.try_normalize(1.0e-12) {
            self.tangents = [t0, self.normal.cross(&t0)];
        }
        self
    }

    /// Set the material.
    #[must_use]
    pub fn with_material(mut self, material: ContactMaterial) -> Self {
        self.material = material;
        self
    }

    /// Rows this point contributes: one normal plus enabled friction directions.
    #[must_use]
    pub fn row_count(&self) -> usize {
        1 + self.material.enabled_friction_rows()
    }
}

/// Collection of contact points between one pair of bodies.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactManifold {
    points: SmallVec<[ContactPoint; 4]>,
}

impl ContactManifold {
    /// Create an empty manifold.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the points for this step.
    ///
    /// New points closer than `prune_tolerance` to an already accepted point
    /// are dropped. Each accepted point inherits the resolved forces of the
    /// nearest previous point within the tolerance. Returns the number of
    /// points kept.
    pub fn update<I>(&mut self, points: I, prune_tolerance: f64) -> usize
    where
        I: IntoIterator<Item = ContactPoint>,
    {
        let tolerance_sq = prune_tolerance * prune_tolerance;
        let previous = std::mem::take(&mut self.points);
        let mut pruned = 0usize;

        for mut point in points {
            let crowded = self
                .points
                .iter()
                .any(|kept| (kept.position - point.position).norm_squared() < tolerance_sq);
            if crowded {
                pruned += 1;
                continue;
            }

            let nearest = previous
                .iter()
                .map(|old| (old, (old.position - point.position).norm_squared()))
                .filter(|(_, dist_sq)| *dist_sq < tolerance_sq)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((old, _)) = nearest {
                point.material.forces = old.material.forces;
            }
            self.points.push(point);
        }

        if pruned > 0 {
            trace!(kept = self.points.len(), pruned, "Pruned manifold points");
        }
        self.points.len()
    }

    /// Remove all points.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Points of the manifold.
    #[must_use]
    pub fn points(&self) -> &[ContactPoint] {
        &self.points
    }

    /// Mutable points of the manifold.
    pub fn points_mut(&mut self) -> &mut [ContactPoint] {
        &mut self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the manifold has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Deepest penetration over all points.
    #[must_use]
    pub fn max_penetration(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.penetration)
            .fold(0.0, f64::max)
    }

    /// Total rows the manifold contributes.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.points.iter().map(ContactPoint::row_count).sum()
    }
}

/// The contact relation between one pair of bodies.
///
/// The first body always has a nonzero inverse mass. A contact starts
/// inactive and becomes active when the narrow phase reports points.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    body0: BodyId,
    body1: BodyId,
    manifold: ContactManifold,
    active: bool,
    prune_tolerance: f64,
}

impl Contact {
    /// Create the contact for two bodies, ordering them so the first is movable.
    pub fn between(a: &BodyState, b: &BodyState) -> Result<Self> {
        if a.id == b.id {
            return Err(SimError::SelfContact(a.id.raw()));
        }
        let (body0, body1) = match (a.is_static(), b.is_static()) {
            (true, true) => {
                let key = PairKey::new(a.id, b.id);
                return Err(SimError::StaticPair {
                    low: key.low().raw(),
                    high: key.high().raw(),
                });
            }
            (true, false) => (b.id, a.id),
            _ => (a.id, b.id),
        };
        Ok(Self {
            body0,
            body1,
            manifold: ContactManifold::new(),
            active: false,
            prune_tolerance: DEFAULT_PRUNE_TOLERANCE,
        })
    }

    /// Restore the movable-first ordering after a body's mass changed.
    ///
    /// When the first body became static and the second is movable, the
    /// bodies swap and every point's normal and tangents are negated, so each
    /// row (and its warm-start force) describes the same constraint as
    /// before. Returns whether a swap happened.
    pub fn canonicalize(&mut self, body0_static: bool, body1_static: bool) -> Result<bool> {
        match (body0_static, body1_static) {
            (true, true) => {
                let key = self.key();
                Err(SimError::StaticPair {
                    low: key.low().raw(),
                    high: key.high().raw(),
                })
            }
            (true, false) => {
                std::mem::swap(&mut self.body0, &mut self.body1);
                for point in self.manifold.points_mut() {
                    point.normal = -point.normal;
                    point.tangents = [-point.tangents[0], -point.tangents[1]];
                }
                trace!(body0 = %self.body0, body1 = %self.body1, "Contact bodies swapped");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Set the manifold pruning tolerance.
    #[must_use]
    pub fn with_prune_tolerance(mut self, tolerance: f64) -> Self {
        self.prune_tolerance = tolerance.max(0.0);
        self
    }

    /// Wrap the contact for sharing.
    #[must_use]
    pub fn into_shared(self) -> SharedContact {
        Arc::new(RwLock::new(self))
    }

    /// Canonical key of the pair.
    #[must_use]
    pub fn key(&self) -> PairKey {
        PairKey::new(self.body0, self.body1)
    }

    /// The two bodies, movable one first.
    #[must_use]
    pub fn bodies(&self) -> (BodyId, BodyId) {
        (self.body0, self.body1)
    }

    /// The manifold.
    #[must_use]
    pub fn manifold(&self) -> &ContactManifold {
        &self.manifold
    }

    /// Mutable manifold, for callers adjusting materials in place.
    pub fn manifold_mut(&mut self) -> &mut ContactManifold {
        &mut self.manifold
    }

    /// Pruning tolerance for manifold updates.
    #[must_use]
    pub fn prune_tolerance(&self) -> f64 {
        self.prune_tolerance
    }

    /// Whether the contact contributes rows.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Force the activity flag.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Replace the manifold for this step.
    ///
    /// An empty update means the shapes separated and deactivates the
    /// contact; points arriving again reactivate it. Returns the number of
    /// points kept.
    pub fn update<I>(&mut self, points: I) -> usize
    where
        I: IntoIterator<Item = ContactPoint>,
    {
        let kept = self.manifold.update(points, self.prune_tolerance);
        self.active = kept > 0;
        kept
    }

    /// Rows the contact contributes this step.
    #[must_use]
    pub fn row_count(&self) -> usize {
        if self.active {
            self.manifold.row_count()
        } else {
            0
        }
    }

    /// Write the solver's forces back into the manifold.
    ///
    /// `rows` are the rows derived for this contact and `forces` the solver
    /// result, one per row.
    pub fn store_resolved_forces(&mut self, rows: &[ConstraintRow], forces: &[f64]) -> Result<()> {
        if rows.len() != forces.len() {
            return Err(SimError::ForceCountMismatch {
                expected: rows.len(),
                actual: forces.len(),
            });
        }
        let points = self.manifold.points_mut();
        for (row, &force) in rows.iter().zip(forces) {
            match row.source {
                RowSource::ContactNormal { point } => {
                    if let Some(p) = points.get_mut(point) {
                        p.material.forces.normal = force;
                    }
                }
                RowSource::ContactFriction { point, axis } => {
                    if let Some(slot) = points
                        .get_mut(point)
                        .and_then(|p| p.material.forces.friction.get_mut(axis))
                    {
                        *slot = force;
                    }
                }
                RowSource::JointAxis { .. } => {
                    return Err(SimError::invalid_config(
                        "joint row passed to a contact force write-back",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl ConstraintLink for Contact {
    fn body0(&self) -> BodyId {
        self.body0
    }

    fn body1(&self) -> BodyId {
        self.body1
    }
}
