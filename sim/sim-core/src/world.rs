//! Simulation world: bodies, contacts, joints and per-step row building.
//!
//! The [`World`] owns every body and joint and indexes every contact by its
//! body pair. Each contact is also registered with both of its bodies.
//!
//! # Step protocol
//!
//! ```text
//! narrow phase  ->  update_contact(a, b, points)
//! build_rows()  ->  StepRows        (hand to the solver)
//! solver        ->  one force per row
//! apply_resolved_forces(&rows, &forces)
//! ```

use std::sync::Arc;

use hashbrown::HashMap;
use nalgebra::Vector3;
use parking_lot::Mutex;
use sim_constraint::{
    BodyState, ConstraintDescriptor, ConstraintIslands, ConstraintLink, Joint, JointKind,
};
use sim_contact::{Contact, ContactPoint, SharedContact};
use sim_types::{BodyId, BodySnapshot, JointId, PairKey, Pose, Result, SimError, SimulationConfig};
use tracing::debug;

use crate::parallel::{derive_islands, DeriveContext, Link, LinkSource};
use crate::{RigidBody, ShapeClass};

/// Which constraint a block of rows belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintOwner {
    /// Contact between a pair of bodies.
    Contact(PairKey),
    /// A joint.
    Joint(JointId),
}

/// Rows derived for one constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBlock {
    /// Constraint the rows came from.
    pub owner: ConstraintOwner,
    /// Island the constraint belongs to.
    pub island: usize,
    /// The rows. Coupled bounds index into this descriptor.
    pub descriptor: ConstraintDescriptor,
}

/// Everything the solver needs for one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepRows {
    blocks: Vec<RowBlock>,
    islands: usize,
    parallel: bool,
}

impl StepRows {
    /// Row blocks ordered by island, then by constraint.
    #[must_use]
    pub fn blocks(&self) -> &[RowBlock] {
        &self.blocks
    }

    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether there is nothing to solve.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total rows over all blocks.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.blocks.iter().map(|b| b.descriptor.len()).sum()
    }

    /// Number of islands that produced rows.
    #[must_use]
    pub fn island_count(&self) -> usize {
        self.islands
    }

    /// Whether derivation ran on the rayon pool.
    #[must_use]
    pub fn was_parallel(&self) -> bool {
        self.parallel
    }

    /// Block of a given constraint.
    #[must_use]
    pub fn block(&self, owner: ConstraintOwner) -> Option<&RowBlock> {
        self.blocks.iter().find(|b| b.owner == owner)
    }
}

/// The simulation world.
///
/// # Example
///
/// ```
/// use sim_core::{RigidBody, ShapeClass, World};
/// use sim_contact::ContactPoint;
/// use sim_types::{Pose, SimulationConfig};
/// use nalgebra::{Point3, Vector3};
///
/// let mut world = World::new(SimulationConfig::default());
/// let ground = world.add_body(Pose::identity(), ShapeClass::NonConvex);
/// let ball = world.add_dynamic_body(
///     Pose::from_position(Point3::new(0.0, 0.5, 0.0)),
///     1.0,
///     Vector3::new(0.1, 0.1, 0.1),
/// );
///
/// world.attach_contact(ball, ground).unwrap();
/// world
///     .update_contact(ball, ground, [ContactPoint::new(Point3::origin(), Vector3::y(), 0.01)])
///     .unwrap();
///
/// let rows = world.build_rows().unwrap();
/// assert_eq!(rows.row_count(), 3);
/// ```
#[derive(Debug)]
pub struct World {
    config: SimulationConfig,
    step_count: u64,
    bodies: HashMap<BodyId, RigidBody>,
    /// Pair index; each lock covers a single attach, detach or lookup.
    contacts: Mutex<HashMap<PairKey, SharedContact>>,
    joints: HashMap<JointId, Joint>,
    next_body_id: u64,
    next_joint_id: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            step_count: 0,
            bodies: HashMap::new(),
            contacts: Mutex::new(HashMap::new()),
            joints: HashMap::new(),
            next_body_id: 1,
            next_joint_id: 1,
        }
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Replace the configuration after validating it.
    pub fn set_config(&mut self, config: SimulationConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Number of completed `build_rows` calls.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Number of bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of registered contacts.
    #[must_use]
    pub fn contact_count(&self) -> usize {
        self.contacts.lock().len()
    }

    /// Number of joints.
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    // =========================================================================
    // Body Management
    // =========================================================================

    /// Add a body (immovable until a mass is assigned) and return its ID.
    pub fn add_body(&mut self, pose: Pose, shape: ShapeClass) -> BodyId {
        let id = BodyId::new(self.next_body_id);
        self.next_body_id += 1;
        self.bodies.insert(id, RigidBody::new(id, pose, shape));
        id
    }

    /// Add a convex body with the given mass and principal inertia.
    pub fn add_dynamic_body(
        &mut self,
        pose: Pose,
        mass: f64,
        inertia: Vector3<f64>,
    ) -> BodyId {
        let id = self.add_body(pose, ShapeClass::Convex);
        if let Some(body) = self.bodies.get_mut(&id) {
            body.set_mass_matrix(mass, inertia);
        }
        id
    }

    /// Add a pre-built body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body ID already exists.
    pub fn insert_body(&mut self, body: RigidBody) -> Result<()> {
        let id = body.id();
        if self.bodies.contains_key(&id) {
            return Err(SimError::invalid_config(format!("{id} already exists")));
        }
        if id.raw() >= self.next_body_id {
            self.next_body_id = id.raw() + 1;
        }
        self.bodies.insert(id, body);
        Ok(())
    }

    /// Get a body by ID.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(&id)
    }

    /// Get a mutable reference to a body by ID.
    #[must_use]
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(&id)
    }

    /// Iterate over all bodies.
    pub fn bodies(&self) -> impl Iterator<Item = &RigidBody> {
        self.bodies.values()
    }

    /// Remove a body together with its contacts and joints.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] if the body does not exist.
    pub fn remove_body(&mut self, id: BodyId) -> Result<RigidBody> {
        let keys = self
            .bodies
            .get(&id)
            .ok_or(SimError::InvalidBodyId(id.raw()))?
            .contacts()
            .keys();
        for key in keys {
            self.detach_contact(key.low(), key.high())?;
        }

        let mut joint_ids: Vec<JointId> = self
            .joints
            .values()
            .filter(|j| j.body0() == id || j.body1() == id)
            .map(Joint::id)
            .collect();
        joint_ids.sort_unstable();
        for joint_id in joint_ids {
            self.joints.remove(&joint_id);
        }

        self.bodies
            .remove(&id)
            .ok_or(SimError::InvalidBodyId(id.raw()))
    }

    // =========================================================================
    // Contact Management
    // =========================================================================

    /// Create the contact between two bodies and register it with both.
    ///
    /// The movable body becomes the contact's first body.
    ///
    /// # Errors
    ///
    /// Fails if a body is unknown, if the pair already has a contact, if
    /// both are the same body, or if both are immovable.
    pub fn attach_contact(&self, a: BodyId, b: BodyId) -> Result<SharedContact> {
        let key = PairKey::new(a, b);
        let mut contacts = self.contacts.lock();
        if contacts.contains_key(&key) {
            return Err(SimError::DuplicateContact {
                low: key.low().raw(),
                high: key.high().raw(),
            });
        }
        let body_a = self.bodies.get(&a).ok_or(SimError::InvalidBodyId(a.raw()))?;
        let body_b = self.bodies.get(&b).ok_or(SimError::InvalidBodyId(b.raw()))?;

        let contact = Contact::between(&body_a.state(), &body_b.state())?
            .with_prune_tolerance(self.config.constraint.prune_tolerance)
            .into_shared();
        body_a.contacts().attach(&contact)?;
        if let Err(err) = body_b.contacts().attach(&contact) {
            body_a.contacts().detach(a, b)?;
            return Err(err);
        }
        contacts.insert(key, Arc::clone(&contact));
        Ok(contact)
    }

    /// Feed this step's narrow-phase points to a contact.
    ///
    /// Normals point from the contact's second body toward its first, as
    /// reported by [`Contact::bodies`]. Returns the number of points kept
    /// after pruning. An empty set deactivates the contact.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::MissingContact`] if the pair has no contact.
    pub fn update_contact<I>(&self, a: BodyId, b: BodyId, points: I) -> Result<usize>
    where
        I: IntoIterator<Item = ContactPoint>,
    {
        let contact = self.contact_or_missing(a, b)?;
        let kept = contact.write().update(points);
        Ok(kept)
    }

    /// Remove the contact between two bodies from the world and both registries.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::MissingContact`] if the pair has no contact.
    pub fn detach_contact(&self, a: BodyId, b: BodyId) -> Result<SharedContact> {
        let key = PairKey::new(a, b);
        let mut contacts = self.contacts.lock();
        let contact = contacts.remove(&key).ok_or(SimError::MissingContact {
            low: key.low().raw(),
            high: key.high().raw(),
        })?;
        for id in [key.low(), key.high()] {
            if let Some(body) = self.bodies.get(&id) {
                body.contacts().detach(key.low(), key.high())?;
            }
        }
        Ok(contact)
    }

    /// Contact between two bodies, in either order.
    #[must_use]
    pub fn find_contact(&self, a: BodyId, b: BodyId) -> Option<SharedContact> {
        self.contacts.lock().get(&PairKey::new(a, b)).cloned()
    }

    fn contact_or_missing(&self, a: BodyId, b: BodyId) -> Result<SharedContact> {
        let key = PairKey::new(a, b);
        self.contacts
            .lock()
            .get(&key)
            .cloned()
            .ok_or(SimError::MissingContact {
                low: key.low().raw(),
                high: key.high().raw(),
            })
    }

    /// Every contact, ordered by pair key.
    fn sorted_contacts(&self) -> Vec<(PairKey, SharedContact)> {
        let mut contacts: Vec<(PairKey, SharedContact)> = self
            .contacts
            .lock()
            .iter()
            .map(|(&key, contact)| (key, Arc::clone(contact)))
            .collect();
        contacts.sort_unstable_by_key(|(key, _)| *key);
        contacts
    }

    // =========================================================================
    // Joint Management
    // =========================================================================

    /// Join two bodies with a frame at the midpoint of their centres of mass.
    ///
    /// # Errors
    ///
    /// Fails if a body is unknown or the centres of mass coincide.
    pub fn add_joint(&mut self, kind: JointKind, body0: BodyId, body1: BodyId) -> Result<JointId> {
        let state0 = self
            .bodies
            .get(&body0)
            .ok_or(SimError::InvalidBodyId(body0.raw()))?
            .state();
        let state1 = self
            .bodies
            .get(&body1)
            .ok_or(SimError::InvalidBodyId(body1.raw()))?
            .state();

        let id = JointId::new(self.next_joint_id);
        let joint = Joint::between(id, kind, &state0, &state1)?;
        self.next_joint_id += 1;
        self.joints.insert(id, joint);
        Ok(id)
    }

    /// Insert a pre-built joint.
    ///
    /// # Errors
    ///
    /// Fails if the joint ID already exists or a body is unknown.
    pub fn insert_joint(&mut self, joint: Joint) -> Result<()> {
        let id = joint.id();
        if self.joints.contains_key(&id) {
            return Err(SimError::invalid_config(format!("{id} already exists")));
        }
        for body in [joint.body0(), joint.body1()] {
            if !self.bodies.contains_key(&body) {
                return Err(SimError::InvalidBodyId(body.raw()));
            }
        }
        if id.raw() >= self.next_joint_id {
            self.next_joint_id = id.raw() + 1;
        }
        self.joints.insert(id, joint);
        Ok(())
    }

    /// Remove a joint.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidJointId`] if the joint does not exist.
    pub fn remove_joint(&mut self, id: JointId) -> Result<Joint> {
        self.joints
            .remove(&id)
            .ok_or(SimError::InvalidJointId(id.raw()))
    }

    /// Get a joint by ID.
    #[must_use]
    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(&id)
    }

    /// Get a mutable reference to a joint by ID.
    #[must_use]
    pub fn joint_mut(&mut self, id: JointId) -> Option<&mut Joint> {
        self.joints.get_mut(&id)
    }

    /// Iterate over all joints.
    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.joints.values()
    }

    // =========================================================================
    // Step
    // =========================================================================

    /// Derive every row for this step.
    ///
    /// Refreshes each body's world inertia and gyroscopic terms, reorders
    /// contacts whose first body has become immovable, lets overloaded joints
    /// give way, groups active constraints into islands and derives rows
    /// island by island.
    ///
    /// # Errors
    ///
    /// Any failure aborts the whole step; no partial row set is returned.
    pub fn build_rows(&mut self) -> Result<StepRows> {
        self.config.validate()?;
        let constraint = self.config.constraint;

        for body in self.bodies.values_mut() {
            body.update_inv_inertia_matrix();
        }
        let states: HashMap<BodyId, BodyState> = self
            .bodies
            .iter()
            .map(|(&id, body)| (id, body.state()))
            .collect();
        let is_static = |id: BodyId| states.get(&id).is_none_or(BodyState::is_static);

        let contacts = self.sorted_contacts();
        for (key, shared) in &contacts {
            let mut contact = shared.write();
            if contact.is_active() {
                let (body0, body1) = contact.bodies();
                if contact.canonicalize(is_static(body0), is_static(body1))? {
                    debug!(pair = ?key, "Reordered contact after a mass change");
                }
            }
        }

        let mut joint_ids: Vec<JointId> = self.joints.keys().copied().collect();
        joint_ids.sort_unstable();
        for id in &joint_ids {
            if let Some(joint) = self.joints.get_mut(id) {
                joint.update_breakage(constraint.breakage_ratio);
            }
        }

        let mut links = Vec::with_capacity(contacts.len() + joint_ids.len());
        for (key, shared) in &contacts {
            let contact = shared.read();
            if contact.is_active() {
                let (body0, body1) = contact.bodies();
                links.push(Link {
                    owner: ConstraintOwner::Contact(*key),
                    body0,
                    body1,
                    source: LinkSource::Contact(shared),
                });
            }
        }
        for id in &joint_ids {
            if let Some(joint) = self.joints.get(id).filter(|j| j.is_active()) {
                links.push(Link {
                    owner: ConstraintOwner::Joint(*id),
                    body0: joint.body0(),
                    body1: joint.body1(),
                    source: LinkSource::Joint(joint),
                });
            }
        }

        let islands = ConstraintIslands::build_with_static_info(&links, is_static);
        let ctx = DeriveContext {
            states: &states,
            config: &constraint,
            timestep: self.config.timestep,
        };
        let (blocks, parallel) = derive_islands(&links, &islands, &ctx, &self.config.parallel)?;

        let rows = StepRows {
            blocks,
            islands: islands.num_active_islands(),
            parallel,
        };
        self.step_count += 1;
        debug!(
            step = self.step_count,
            bodies = self.bodies.len(),
            constraints = links.len(),
            islands = rows.islands,
            rows = rows.row_count(),
            parallel,
            "Built constraint rows"
        );
        Ok(rows)
    }

    /// Store the solver's forces for warm starting and friction coupling.
    ///
    /// `forces[i]` holds one force per row of `rows.blocks()[i]`. Lengths
    /// and owners are checked before anything is written, so a failed call
    /// leaves every constraint untouched.
    ///
    /// # Errors
    ///
    /// Fails on a length mismatch or if a constraint has been removed since
    /// the rows were built.
    pub fn apply_resolved_forces(&mut self, rows: &StepRows, forces: &[Vec<f64>]) -> Result<()> {
        if forces.len() != rows.blocks.len() {
            return Err(SimError::ForceCountMismatch {
                expected: rows.blocks.len(),
                actual: forces.len(),
            });
        }
        let mut handles: Vec<Option<SharedContact>> = Vec::with_capacity(rows.blocks.len());
        for (block, block_forces) in rows.blocks.iter().zip(forces) {
            if block.descriptor.len() != block_forces.len() {
                return Err(SimError::ForceCountMismatch {
                    expected: block.descriptor.len(),
                    actual: block_forces.len(),
                });
            }
            let handle = match block.owner {
                ConstraintOwner::Contact(key) => {
                    Some(self.contact_or_missing(key.low(), key.high())?)
                }
                ConstraintOwner::Joint(id) => {
                    let joint = self
                        .joints
                        .get(&id)
                        .ok_or(SimError::InvalidJointId(id.raw()))?;
                    let expected = joint.kind().row_count();
                    if expected != block_forces.len() {
                        return Err(SimError::ForceCountMismatch {
                            expected,
                            actual: block_forces.len(),
                        });
                    }
                    None
                }
            };
            handles.push(handle);
        }

        for ((block, block_forces), handle) in rows.blocks.iter().zip(forces).zip(handles) {
            match (block.owner, handle) {
                (_, Some(contact)) => {
                    contact
                        .write()
                        .store_resolved_forces(block.descriptor.rows(), block_forces)?;
                }
                (ConstraintOwner::Joint(id), None) => {
                    if let Some(joint) = self.joints.get_mut(&id) {
                        joint.store_resolved_forces(block_forces)?;
                    }
                }
                (ConstraintOwner::Contact(_), None) => {}
            }
        }
        Ok(())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Snapshot every body, ordered by ID.
    #[must_use]
    pub fn snapshot_bodies(&self) -> Vec<(BodyId, BodySnapshot)> {
        let mut snapshots: Vec<_> = self
            .bodies
            .iter()
            .map(|(&id, body)| (id, body.snapshot()))
            .collect();
        snapshots.sort_unstable_by_key(|(id, _)| *id);
        snapshots
    }

    /// Restore one body from a snapshot.
    ///
    /// # Errors
    ///
    /// Fails if the body is unknown or the snapshot is not finite.
    pub fn restore_body(&mut self, id: BodyId, snapshot: &BodySnapshot) -> Result<()> {
        self.bodies
            .get_mut(&id)
            .ok_or(SimError::InvalidBodyId(id.raw()))?
            .restore(snapshot)
    }
}
