//! Island-parallel row derivation using rayon.
//!
//! Islands share no bodies, so their rows can be derived independently.
//! Every worker reads the same immutable body-state snapshot and takes only
//! read locks on contacts; nothing is written until the whole step has
//! succeeded.
//!
//! Parallel derivation only kicks in when there are at least
//! `min_islands_for_parallel` islands. The output order is the same either
//! way: island by island, then constraint by constraint.

use hashbrown::HashMap;
use rayon::prelude::*;
use sim_constraint::{
    BodyState, ConstraintDescriptor, ConstraintIslands, ConstraintLink, Island, Joint,
};
use sim_contact::{derive_contact_rows, SharedContact};
use sim_types::{BodyId, ConstraintConfig, ParallelConfig, Result, SimError};

use crate::{ConstraintOwner, RowBlock};

/// What a link borrows from the world for derivation.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LinkSource<'a> {
    Contact(&'a SharedContact),
    Joint(&'a Joint),
}

/// One active constraint, with its bodies resolved up front.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Link<'a> {
    pub owner: ConstraintOwner,
    pub body0: BodyId,
    pub body1: BodyId,
    pub source: LinkSource<'a>,
}

impl ConstraintLink for Link<'_> {
    fn body0(&self) -> BodyId {
        self.body0
    }

    fn body1(&self) -> BodyId {
        self.body1
    }
}

/// Shared read-only inputs of one derivation pass.
pub(crate) struct DeriveContext<'a> {
    pub states: &'a HashMap<BodyId, BodyState>,
    pub config: &'a ConstraintConfig,
    pub timestep: f64,
}

/// Derive the rows of every non-static island.
///
/// Returns the blocks and whether the rayon path was taken. The first
/// error aborts the whole pass.
pub(crate) fn derive_islands(
    links: &[Link<'_>],
    islands: &ConstraintIslands,
    ctx: &DeriveContext<'_>,
    parallel: &ParallelConfig,
) -> Result<(Vec<RowBlock>, bool)> {
    let active: Vec<(usize, &Island)> = islands.active_islands().collect();
    if active.is_empty() {
        return Ok((Vec::new(), false));
    }

    let use_parallel = parallel.use_parallel(active.len());
    let per_island: Vec<Vec<RowBlock>> = if use_parallel {
        active
            .par_iter()
            .map(|&(index, island)| derive_island(links, index, island, ctx))
            .collect::<Result<_>>()?
    } else {
        active
            .iter()
            .map(|&(index, island)| derive_island(links, index, island, ctx))
            .collect::<Result<_>>()?
    };

    Ok((per_island.into_iter().flatten().collect(), use_parallel))
}

fn derive_island(
    links: &[Link<'_>],
    index: usize,
    island: &Island,
    ctx: &DeriveContext<'_>,
) -> Result<Vec<RowBlock>> {
    island
        .constraint_indices
        .iter()
        .filter_map(|&i| links.get(i))
        .map(|link| derive_link(link, index, ctx))
        .collect()
}

fn derive_link(link: &Link<'_>, island: usize, ctx: &DeriveContext<'_>) -> Result<RowBlock> {
    let state0 = ctx
        .states
        .get(&link.body0)
        .ok_or(SimError::InvalidBodyId(link.body0.raw()))?;
    let state1 = ctx
        .states
        .get(&link.body1)
        .ok_or(SimError::InvalidBodyId(link.body1.raw()))?;

    let descriptor = match link.source {
        LinkSource::Contact(contact) => {
            let contact = contact.read();
            let mut desc = ConstraintDescriptor::new(ctx.timestep, contact.row_count());
            derive_contact_rows(&contact, state0, state1, &mut desc, ctx.config)?;
            desc
        }
        LinkSource::Joint(joint) => {
            let mut desc = ConstraintDescriptor::new(ctx.timestep, joint.row_count());
            joint.derive_rows(state0, state1, &mut desc, ctx.config)?;
            desc
        }
    };

    Ok(RowBlock {
        owner: link.owner,
        island,
        descriptor,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Point3};
    use sim_constraint::JointKind;
    use sim_types::{JointId, Pose};

    fn chain(count: u64) -> (HashMap<BodyId, BodyState>, Vec<Joint>) {
        let mut states = HashMap::new();
        let mut joints = Vec::new();
        for i in 0..count {
            let a = BodyState::dynamic(
                BodyId::new(2 * i),
                Pose::from_position(Point3::new(i as f64 * 3.0, 0.0, 0.0)),
                1.0,
                Matrix3::identity(),
            );
            let b = BodyState::dynamic(
                BodyId::new(2 * i + 1),
                Pose::from_position(Point3::new(i as f64 * 3.0, 1.0, 0.0)),
                1.0,
                Matrix3::identity(),
            );
            joints.push(Joint::between(JointId::new(i), JointKind::Hinge, &a, &b).unwrap());
            states.insert(a.id, a);
            states.insert(b.id, b);
        }
        (states, joints)
    }

    fn links(joints: &[Joint]) -> Vec<Link<'_>> {
        joints
            .iter()
            .map(|joint| Link {
                owner: ConstraintOwner::Joint(joint.id()),
                body0: joint.body0(),
                body1: joint.body1(),
                source: LinkSource::Joint(joint),
            })
            .collect()
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (states, joints) = chain(6);
        let links = links(&joints);
        let islands = ConstraintIslands::build(&links);
        let config = ConstraintConfig::default();
        let ctx = DeriveContext {
            states: &states,
            config: &config,
            timestep: 1.0 / 60.0,
        };

        let (sequential, used) = derive_islands(&links, &islands, &ctx, &ParallelConfig::sequential()).unwrap();
        assert!(!used);
        let (parallel, used) = derive_islands(&links, &islands, &ctx, &ParallelConfig::many_islands()).unwrap();
        assert!(used);

        assert_eq!(sequential.len(), 6);
        assert_eq!(sequential, parallel);
        assert!(sequential.iter().all(|b| b.descriptor.len() == 5));
    }

    #[test]
    fn test_too_few_islands_stays_sequential() {
        let (states, joints) = chain(2);
        let links = links(&joints);
        let islands = ConstraintIslands::build(&links);
        let config = ConstraintConfig::default();
        let ctx = DeriveContext {
            states: &states,
            config: &config,
            timestep: 1.0 / 60.0,
        };
        let (_, used) = derive_islands(&links, &islands, &ctx, &ParallelConfig::default()).unwrap();
        assert!(!used);
    }

    #[test]
    fn test_missing_state_aborts() {
        let (mut states, joints) = chain(3);
        states.remove(&BodyId::new(3));
        let links = links(&joints);
        let islands = ConstraintIslands::build(&links);
        let config = ConstraintConfig::default();
        let ctx = DeriveContext {
            states: &states,
            config: &config,
            timestep: 1.0 / 60.0,
        };
        let err = derive_islands(&links, &islands, &ctx, &ParallelConfig::default().with_min_islands(1)).unwrap_err();
        assert_eq!(err, SimError::InvalidBodyId(3));
    }
}
