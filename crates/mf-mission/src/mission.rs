//! Composition of segments into missions.

use crate::conditions::Conditions;
use crate::error::{MissionError, MissionResult};
use crate::segment::{Segment, SegmentLifecycle};
use crate::state::StateContainer;
use crate::sub_segments;
use mf_core::Value;
use mf_process::{Process, Step};
use mf_solver::SolverConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub type MissionProcess = Process<Mission, MissionError>;
pub type MissionStep = Step<Mission, MissionError>;

/// How a mission's children are solved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Each segment is its own square system, solved in order; the final row
    /// of one seeds the next.
    #[default]
    Sequential,
    /// Every segment's unknowns and residuals, plus the mission's own, form
    /// one system solved at once.
    Simultaneous,
}

/// Mission-wide options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionSettings {
    /// Log every process step at info level.
    pub verbose: bool,
    /// Sequential only: flag a failed segment and keep going instead of aborting.
    pub tolerate_partial: bool,
    /// Solver for the combined system of a simultaneous mission.
    pub solver: SolverConfig,
}

/// A mission child: a segment or a nested mission.
#[derive(Debug)]
pub enum SegmentNode {
    Leaf(Segment),
    Group(Mission),
}

impl SegmentNode {
    pub fn tag(&self) -> &str {
        match self {
            SegmentNode::Leaf(s) => &s.tag,
            SegmentNode::Group(m) => &m.tag,
        }
    }
}

impl From<Segment> for SegmentNode {
    fn from(s: Segment) -> Self {
        SegmentNode::Leaf(s)
    }
}

impl From<Mission> for SegmentNode {
    fn from(m: Mission) -> Self {
        SegmentNode::Group(m)
    }
}

/// Outcome of one leaf segment.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentStatus {
    /// Not solved yet (or skipped after an abort).
    Pending,
    Converged { iterations: usize, residual_norm: f64 },
    Failed(MissionError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentReport {
    pub tag: String,
    pub status: SegmentStatus,
}

/// Per-leaf outcome of a mission evaluation, in mission order.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionReport {
    pub tag: String,
    pub segments: Vec<SegmentReport>,
}

impl MissionReport {
    /// Every leaf converged.
    pub fn is_complete(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s.status, SegmentStatus::Converged { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &SegmentReport> {
        self.segments
            .iter()
            .filter(|s| matches!(s.status, SegmentStatus::Failed(_)))
    }

    pub fn status(&self, tag: &str) -> Option<&SegmentStatus> {
        self.segments.iter().find(|s| s.tag == tag).map(|s| &s.status)
    }
}

/// An ordered composition of segments.
///
/// Sequential tree:
///
/// ```text
/// initialize:   {}
/// converge:     sequential_sub_segments
/// post_process: update_state
/// ```
///
/// Simultaneous tree:
///
/// ```text
/// initialize:   sub_segments
/// converge:     converge_root
/// iterate:      unknowns {}, sub_segments, residuals {}
/// post_process: sub_segments, update_state
/// ```
pub struct Mission {
    pub tag: String,
    pub settings: MissionSettings,
    /// Mission-level extra unknowns/residuals and the collected segment conditions.
    pub state: StateContainer,
    /// Final row handed to the first segment, when this mission is itself a child.
    pub initials: Option<Conditions>,
    strategy: Strategy,
    pub(crate) segments: Vec<SegmentNode>,
    process: Arc<MissionProcess>,
}

impl fmt::Debug for Mission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mission")
            .field("tag", &self.tag)
            .field("strategy", &self.strategy)
            .field("segments", &self.segments)
            .field("process", &self.process)
            .finish_non_exhaustive()
    }
}

impl Mission {
    pub fn new(tag: impl Into<String>, strategy: Strategy) -> Self {
        let process = match strategy {
            Strategy::Sequential => sequential_process(),
            Strategy::Simultaneous => simultaneous_process(),
        };
        Self {
            tag: tag.into(),
            settings: MissionSettings::default(),
            state: StateContainer::default(),
            initials: None,
            strategy,
            segments: Vec::new(),
            process: Arc::new(process),
        }
    }

    pub fn sequential(tag: impl Into<String>) -> Self {
        Self::new(tag, Strategy::Sequential)
    }

    pub fn simultaneous(tag: impl Into<String>) -> Self {
        Self::new(tag, Strategy::Simultaneous)
    }

    pub fn with_settings(mut self, settings: MissionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_segment(mut self, node: impl Into<SegmentNode>) -> Self {
        self.push(node);
        self
    }

    pub fn push(&mut self, node: impl Into<SegmentNode>) {
        self.segments.push(node.into());
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn segments(&self) -> &[SegmentNode] {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut [SegmentNode] {
        &mut self.segments
    }

    pub fn process(&self) -> &MissionProcess {
        &self.process
    }

    pub fn process_mut(&mut self) -> &mut MissionProcess {
        Arc::make_mut(&mut self.process)
    }

    /// Leaf segments, depth-first.
    pub fn leaves(&self) -> Vec<&Segment> {
        fn collect<'a>(nodes: &'a [SegmentNode], out: &mut Vec<&'a Segment>) {
            for node in nodes {
                match node {
                    SegmentNode::Leaf(s) => out.push(s),
                    SegmentNode::Group(m) => collect(&m.segments, out),
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.segments, &mut out);
        out
    }

    pub fn leaves_mut(&mut self) -> Vec<&mut Segment> {
        fn collect<'a>(nodes: &'a mut [SegmentNode], out: &mut Vec<&'a mut Segment>) {
            for node in nodes {
                match node {
                    SegmentNode::Leaf(s) => out.push(s),
                    SegmentNode::Group(m) => collect(&mut m.segments, out),
                }
            }
        }
        let mut out = Vec::new();
        collect(&mut self.segments, &mut out);
        out
    }

    /// Leaf segment by tag, depth-first.
    pub fn segment(&self, tag: &str) -> Option<&Segment> {
        self.leaves().into_iter().find(|s| s.tag == tag)
    }

    pub fn segment_mut(&mut self, tag: &str) -> Option<&mut Segment> {
        self.leaves_mut().into_iter().find(|s| s.tag == tag)
    }

    /// Final row of the last leaf's conditions.
    pub fn final_row(&self) -> MissionResult<Option<Conditions>> {
        match self.leaves().last() {
            Some(last) => Ok(Some(last.state.conditions.final_row()?)),
            None => Ok(None),
        }
    }

    /// Run one named sub-process (or step) of the tree against this mission.
    pub fn run(&mut self, path: &str) -> MissionResult<Value> {
        let process = Arc::clone(&self.process);
        match process.step(path) {
            Some(step) => step.run(self),
            None => Ok(Value::Empty),
        }
    }

    pub fn initialize(&mut self) -> MissionResult<()> {
        self.run("initialize").map(drop)
    }

    pub fn converge(&mut self) -> MissionResult<()> {
        self.run("converge").map(drop)
    }

    /// One pass over the combined system (simultaneous missions only).
    pub fn iterate(&mut self) -> MissionResult<()> {
        self.run("iterate").map(drop)
    }

    pub fn post_process(&mut self) -> MissionResult<()> {
        self.run("post_process").map(drop)
    }

    /// Initialize, converge and post-process every segment.
    ///
    /// A failed segment aborts the evaluation and its error is returned,
    /// unless the mission is sequential and tolerates partial results.
    pub fn evaluate(&mut self) -> MissionResult<MissionReport> {
        if self.settings.verbose {
            self.set_verbose();
        }
        tracing::info!(
            mission = %self.tag,
            strategy = ?self.strategy,
            segments = self.leaves().len(),
            "evaluating mission"
        );

        self.initialize()?;
        self.converge()?;
        self.post_process()?;

        let report = self.report();
        if report.is_complete() {
            tracing::info!(mission = %self.tag, "mission converged");
        } else {
            tracing::warn!(
                mission = %self.tag,
                failed = report.failed().count(),
                "mission finished with flagged segments"
            );
        }
        Ok(report)
    }

    fn set_verbose(&mut self) {
        self.settings.verbose = true;
        self.process_mut().set_verbose(true);
        for node in &mut self.segments {
            match node {
                SegmentNode::Leaf(s) => s.process_mut().set_verbose(true),
                SegmentNode::Group(m) => m.set_verbose(),
            }
        }
    }

    /// Current status of every leaf.
    pub fn report(&self) -> MissionReport {
        let segments = self
            .leaves()
            .into_iter()
            .map(|s| SegmentReport {
                tag: s.tag.clone(),
                status: status_of(s),
            })
            .collect();
        MissionReport {
            tag: self.tag.clone(),
            segments,
        }
    }
}

fn status_of(seg: &Segment) -> SegmentStatus {
    match seg.lifecycle() {
        SegmentLifecycle::Converged | SegmentLifecycle::PostProcessed => SegmentStatus::Converged {
            iterations: seg.state.numerics.iterations,
            residual_norm: seg.state.numerics.residual_norm.unwrap_or(0.0),
        },
        SegmentLifecycle::Failed => match seg.failure() {
            Some(err) => SegmentStatus::Failed(err.clone()),
            None => SegmentStatus::Failed(MissionError::Lifecycle {
                tag: seg.tag.clone(),
                action: "converge",
                state: SegmentLifecycle::Failed,
            }),
        },
        _ => SegmentStatus::Pending,
    }
}

fn sequential_process() -> MissionProcess {
    MissionProcess::new()
        .with("initialize", MissionProcess::new())
        .with("converge", Step::action(sub_segments::sequential_sub_segments))
        .with(
            "post_process",
            MissionProcess::new().with("update_state", Step::action(sub_segments::update_state)),
        )
}

fn simultaneous_process() -> MissionProcess {
    MissionProcess::new()
        .with(
            "initialize",
            MissionProcess::new()
                .with("sub_segments", Step::action(sub_segments::initialize_sub_segments)),
        )
        .with("converge", Step::action(sub_segments::converge_root))
        .with(
            "iterate",
            MissionProcess::new()
                .with("unknowns", MissionProcess::new())
                .with("sub_segments", Step::action(sub_segments::iterate_sub_segments))
                .with("residuals", MissionProcess::new()),
        )
        .with(
            "post_process",
            MissionProcess::new()
                .with("sub_segments", Step::action(sub_segments::post_process_sub_segments))
                .with("update_state", Step::action(sub_segments::update_state)),
        )
}
