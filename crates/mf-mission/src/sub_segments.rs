//! Steps that drive a mission's children.
//!
//! The combined system of a simultaneous mission is every leaf's unknowns and
//! residuals in depth-first order. A nested mission's own extras follow its
//! children, and the top-level mission's extras come last.

use crate::conditions::Conditions;
use crate::error::{MissionError, MissionResult};
use crate::methods::converge::classify;
use crate::mission::{Mission, SegmentNode};
use crate::segment::SegmentLifecycle;
use mf_core::{Data, Slot};
use mf_solver::{RootSolution, solve};
use nalgebra::DVector;

/// Packed layout of one owner's unknowns and residuals.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Tag of the segment or mission the block belongs to.
    pub owner: String,
    pub unknowns: Vec<Slot>,
    pub residuals: Vec<Slot>,
}

impl Block {
    pub fn unknown_len(&self) -> usize {
        self.unknowns.iter().map(Slot::len).sum()
    }

    pub fn residual_len(&self) -> usize {
        self.residuals.iter().map(Slot::len).sum()
    }
}

/// Unknowns and residuals of a whole mission, packed end to end.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedSystem {
    pub unknowns: DVector<f64>,
    pub residuals: DVector<f64>,
    pub blocks: Vec<Block>,
}

impl CombinedSystem {
    pub fn is_square(&self) -> bool {
        self.unknowns.len() == self.residuals.len()
    }
}

fn visit<F>(mission: &Mission, f: &mut F)
where
    F: FnMut(&str, &Data, &Data),
{
    fn walk<F>(nodes: &[SegmentNode], f: &mut F)
    where
        F: FnMut(&str, &Data, &Data),
    {
        for node in nodes {
            match node {
                SegmentNode::Leaf(s) => f(&s.tag, &s.state.unknowns, &s.state.residuals),
                SegmentNode::Group(m) => {
                    walk(&m.segments, f);
                    f(&m.tag, &m.state.unknowns, &m.state.residuals);
                }
            }
        }
    }
    walk(&mission.segments, f);
    f(&mission.tag, &mission.state.unknowns, &mission.state.residuals);
}

fn visit_mut<F>(mission: &mut Mission, f: &mut F) -> MissionResult<()>
where
    F: FnMut(&str, &mut Data, &mut Data) -> MissionResult<()>,
{
    fn walk<F>(nodes: &mut [SegmentNode], f: &mut F) -> MissionResult<()>
    where
        F: FnMut(&str, &mut Data, &mut Data) -> MissionResult<()>,
    {
        for node in nodes {
            match node {
                SegmentNode::Leaf(s) => {
                    f(&s.tag, &mut s.state.unknowns, &mut s.state.residuals)?;
                }
                SegmentNode::Group(m) => {
                    walk(&mut m.segments, f)?;
                    f(&m.tag, &mut m.state.unknowns, &mut m.state.residuals)?;
                }
            }
        }
        Ok(())
    }
    walk(&mut mission.segments, f)?;
    f(&mission.tag, &mut mission.state.unknowns, &mut mission.state.residuals)
}

/// Pack every child's unknowns and residuals, plus the mission's own.
pub fn expand_sub_segments(mission: &Mission) -> CombinedSystem {
    let mut unknowns = Vec::new();
    let mut residuals = Vec::new();
    let mut blocks = Vec::new();
    visit(mission, &mut |owner: &str, u: &Data, r: &Data| {
        unknowns.extend(u.pack_array().iter());
        residuals.extend(r.pack_array().iter());
        blocks.push(Block {
            owner: owner.to_string(),
            unknowns: u.layout(),
            residuals: r.layout(),
        });
    });
    CombinedSystem {
        unknowns: DVector::from_vec(unknowns),
        residuals: DVector::from_vec(residuals),
        blocks,
    }
}

/// Write a combined system back into every child and the mission.
///
/// Each block's layout must still match its owner's.
pub fn merge_sub_segment_states(mission: &mut Mission, combined: &CombinedSystem) -> MissionResult<()> {
    scatter(
        mission,
        &combined.blocks,
        combined.unknowns.as_slice(),
        Some(combined.residuals.as_slice()),
    )
}

fn scatter(
    mission: &mut Mission,
    blocks: &[Block],
    unknowns: &[f64],
    residuals: Option<&[f64]>,
) -> MissionResult<()> {
    let total: usize = blocks.iter().map(Block::unknown_len).sum();
    if total != unknowns.len() {
        return Err(MissionError::mismatch(
            &mission.tag,
            format!("combined unknowns hold {} values, layout expects {total}", unknowns.len()),
        ));
    }
    if let Some(r) = residuals {
        let total: usize = blocks.iter().map(Block::residual_len).sum();
        if total != r.len() {
            return Err(MissionError::mismatch(
                &mission.tag,
                format!("combined residuals hold {} values, layout expects {total}", r.len()),
            ));
        }
    }

    let mut blocks = blocks.iter();
    let mut u_offset = 0;
    let mut r_offset = 0;
    visit_mut(mission, &mut |owner: &str, u: &mut Data, r: &mut Data| {
        let Some(block) = blocks.next() else {
            return Err(MissionError::mismatch(owner, "missing from the combined layout"));
        };
        if block.owner != owner || block.unknowns != u.layout() || block.residuals != r.layout() {
            return Err(MissionError::mismatch(
                owner,
                "unknowns or residuals changed since the combined system was built",
            ));
        }
        let n = block.unknown_len();
        u.unpack_slice(&unknowns[u_offset..u_offset + n])?;
        u_offset += n;
        if let Some(values) = residuals {
            let m = block.residual_len();
            r.unpack_slice(&values[r_offset..r_offset + m])?;
            r_offset += m;
        }
        Ok(())
    })?;
    if blocks.next().is_some() {
        return Err(MissionError::mismatch(
            &mission.tag,
            "combined layout has more blocks than the mission",
        ));
    }
    Ok(())
}

fn gather_residuals(mission: &Mission) -> DVector<f64> {
    let mut out = Vec::new();
    visit(mission, &mut |_: &str, _: &Data, r: &Data| {
        out.extend(r.pack_array().iter())
    });
    DVector::from_vec(out)
}

fn final_row(node: &SegmentNode) -> MissionResult<Option<Conditions>> {
    match node {
        SegmentNode::Leaf(s) => Ok(Some(s.state.conditions.final_row()?)),
        SegmentNode::Group(m) => m.final_row(),
    }
}

/// Initialize every child in order, each seeded with its predecessor's final row.
pub fn initialize_sub_segments(mission: &mut Mission) -> MissionResult<()> {
    fn walk(nodes: &mut [SegmentNode], mut prev: Option<Conditions>) -> MissionResult<Option<Conditions>> {
        for node in nodes.iter_mut() {
            match node {
                SegmentNode::Leaf(s) => {
                    s.state.initials = prev.clone();
                    s.initialize()?;
                }
                SegmentNode::Group(m) => {
                    m.initials = prev.clone();
                    walk(&mut m.segments, prev.clone())?;
                }
            }
            if let Some(last) = final_row(node)? {
                prev = Some(last);
            }
        }
        Ok(prev)
    }
    let initials = mission.initials.clone();
    walk(&mut mission.segments, initials)?;
    Ok(())
}

/// Iterate every child in order, refreshing the initials chain as it goes.
///
/// A nested mission runs its own `iterate.unknowns` before its children and
/// `iterate.residuals` after them.
pub fn iterate_sub_segments(mission: &mut Mission) -> MissionResult<()> {
    fn walk(nodes: &mut [SegmentNode], mut prev: Option<Conditions>) -> MissionResult<Option<Conditions>> {
        for node in nodes.iter_mut() {
            match node {
                SegmentNode::Leaf(s) => {
                    s.state.initials = prev.clone();
                    s.iterate()?;
                }
                SegmentNode::Group(m) => {
                    m.initials = prev.clone();
                    m.run("iterate.unknowns")?;
                    walk(&mut m.segments, prev.clone())?;
                    m.run("iterate.residuals")?;
                }
            }
            if let Some(last) = final_row(node)? {
                prev = Some(last);
            }
        }
        Ok(prev)
    }
    let initials = mission.initials.clone();
    walk(&mut mission.segments, initials)?;
    Ok(())
}

/// Post-process every converged leaf and refresh nested missions' states.
pub fn post_process_sub_segments(mission: &mut Mission) -> MissionResult<()> {
    fn walk(nodes: &mut [SegmentNode]) -> MissionResult<()> {
        for node in nodes.iter_mut() {
            match node {
                SegmentNode::Leaf(s) if s.lifecycle() == SegmentLifecycle::Converged => {
                    s.post_process()?;
                }
                SegmentNode::Leaf(_) => {}
                SegmentNode::Group(m) => {
                    walk(&mut m.segments)?;
                    update_state(m)?;
                }
            }
        }
        Ok(())
    }
    walk(&mut mission.segments)
}

/// Evaluate each child in turn, chaining final rows into initials.
///
/// A failed child aborts the mission unless `tolerate_partial` is set; then it
/// is flagged and the next child inherits from the last child that succeeded.
pub fn sequential_sub_segments(mission: &mut Mission) -> MissionResult<()> {
    let tolerate = mission.settings.tolerate_partial;
    let mut prev = mission.initials.clone();
    for node in mission.segments.iter_mut() {
        let result = match node {
            SegmentNode::Leaf(s) => {
                s.state.initials = prev.clone();
                s.evaluate()
            }
            SegmentNode::Group(m) => {
                m.initials = prev.clone();
                m.evaluate().map(drop)
            }
        };
        match result {
            Ok(()) => {
                if let Some(last) = final_row(node)? {
                    prev = Some(last);
                }
            }
            Err(err) if tolerate => {
                tracing::warn!(
                    mission = %mission.tag,
                    segment = %node.tag(),
                    error = %err,
                    "segment failed, continuing with partial results"
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Copy every leaf's conditions into `mission.state.segments`.
pub fn update_state(mission: &mut Mission) -> MissionResult<()> {
    let segments = mission
        .leaves()
        .into_iter()
        .map(|s| (s.tag.clone(), s.state.conditions.clone()))
        .collect();
    mission.state.segments = segments;
    Ok(())
}

fn fail_leaves(mission: &mut Mission, err: &MissionError) {
    for leaf in mission.leaves_mut() {
        leaf.state.numerics.converged = Some(false);
        leaf.fail(err);
    }
}

/// Solve the combined system of a simultaneous mission.
///
/// The system must be square; a mismatch fails before any child iterates.
/// Every failure marks all leaves `Failed`.
pub fn converge_root(mission: &mut Mission) -> MissionResult<()> {
    let system = expand_sub_segments(mission);
    if !system.is_square() {
        let err = MissionError::mismatch(
            &mission.tag,
            format!(
                "{} unknowns but {} residuals; the system must be square",
                system.unknowns.len(),
                system.residuals.len()
            ),
        );
        fail_leaves(mission, &err);
        return Err(err);
    }

    for leaf in mission.leaves_mut() {
        leaf.set_lifecycle(SegmentLifecycle::Converging);
    }

    let config = mission.settings.solver.clone();
    let blocks = system.blocks;
    let residual_len = system.residuals.len();
    let outcome = solve(
        system.unknowns,
        residual_len,
        |x: &DVector<f64>| -> MissionResult<DVector<f64>> {
            scatter(mission, &blocks, x.as_slice(), None)?;
            mission.iterate()?;
            Ok(gather_residuals(mission))
        },
        &config,
    );

    let result = match outcome {
        Ok(RootSolution {
            x,
            residual_norm,
            iterations,
            evaluations,
        }) => {
            tracing::debug!(
                mission = %mission.tag,
                unknowns = x.len(),
                iterations,
                evaluations,
                residual_norm,
                "combined root found"
            );
            scatter(mission, &blocks, x.as_slice(), None)
                .and_then(|()| mission.iterate())
                .map(|()| (iterations, residual_norm))
        }
        Err(err) => Err(classify(&mission.tag, err, &config)),
    };

    match result {
        Ok((iterations, residual_norm)) => {
            for leaf in mission.leaves_mut() {
                let numerics = &mut leaf.state.numerics;
                numerics.converged = Some(true);
                numerics.iterations = iterations;
                numerics.residual_norm = Some(residual_norm);
                leaf.set_lifecycle(SegmentLifecycle::Converged);
            }
            Ok(())
        }
        Err(err) => {
            if let MissionError::NonConvergence {
                residual_norm,
                iterations,
                ..
            } = &err
            {
                for leaf in mission.leaves_mut() {
                    leaf.state.numerics.iterations = *iterations;
                    leaf.state.numerics.residual_norm = Some(*residual_norm);
                }
            }
            fail_leaves(mission, &err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;
    use mf_core::{ones_row, row};

    fn leaf(tag: &str, unknown: f64, residual_width: usize) -> Segment {
        let mut s = Segment::new(tag).with_control_points(2);
        s.add_unknown("x", row(&[unknown])).unwrap();
        s.add_residual("r", residual_width).unwrap();
        s.state.expand_rows(2).unwrap();
        s
    }

    fn mission() -> Mission {
        let inner = Mission::sequential("inner").with_segment(leaf("b", 2.0, 1));
        let mut m = Mission::simultaneous("outer")
            .with_segment(leaf("a", 1.0, 1))
            .with_segment(inner);
        m.state.unknowns.set("p", ones_row(1) * 7.0).unwrap();
        m.state.residuals.set("q", ones_row(1) * 0.0).unwrap();
        m
    }

    #[test]
    fn depth_first_order_with_mission_extras_last() {
        let m = mission();
        let system = expand_sub_segments(&m);
        let owners: Vec<&str> = system.blocks.iter().map(|b| b.owner.as_str()).collect();
        assert_eq!(owners, ["a", "b", "inner", "outer"]);
        assert_eq!(system.unknowns.as_slice(), &[1.0, 1.0, 2.0, 2.0, 7.0]);
        assert_eq!(system.residuals.len(), 5);
        assert!(system.is_square());
    }

    #[test]
    fn merge_writes_back_into_each_owner() {
        let mut m = mission();
        let mut system = expand_sub_segments(&m);
        system.unknowns = DVector::from_vec(vec![10.0, 11.0, 20.0, 21.0, 30.0]);
        merge_sub_segment_states(&mut m, &system).unwrap();

        assert_eq!(m.segment("a").unwrap().state.unknowns.array("x").unwrap().as_slice(), &[10.0, 11.0]);
        assert_eq!(m.segment("b").unwrap().state.unknowns.array("x").unwrap().as_slice(), &[20.0, 21.0]);
        assert_eq!(m.state.unknowns.array("p").unwrap()[(0, 0)], 30.0);
    }

    #[test]
    fn merge_rejects_changed_layout() {
        let mut m = mission();
        let system = expand_sub_segments(&m);
        m.segment_mut("b").unwrap().add_residual("extra", 1).unwrap();
        let err = merge_sub_segment_states(&mut m, &system).unwrap_err();
        assert!(matches!(err, MissionError::ConfigurationMismatch { segment, .. } if segment == "b"));
    }

    #[test]
    fn update_state_collects_leaves_in_order() {
        let mut m = mission();
        update_state(&mut m).unwrap();
        let tags: Vec<&str> = m.state.segments.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(tags, ["a", "b"]);
        assert_eq!(m.state.merged().unwrap().rows(), 4);
    }
}
