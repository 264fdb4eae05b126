//! Segment lifecycle and process tree.

use crate::error::{MissionError, MissionResult};
use crate::methods;
use crate::state::State;
use mf_core::{Data, Value};
use mf_process::{Analysis, AnalysisContainer, Process, Step};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type SegmentProcess = Process<Segment, MissionError>;
pub type SegmentStep = Step<Segment, MissionError>;

/// Where a segment is in its evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentLifecycle {
    Constructed,
    Initialized,
    Converging,
    Converged,
    Failed,
    PostProcessed,
}

/// User-fixed boundary values. Each kind reads the ones it needs; anything
/// left unset is taken from the predecessor's final row when possible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Boundary {
    pub time_start: Option<f64>,
    pub altitude_start: Option<f64>,
    pub altitude_end: Option<f64>,
    pub mass_start: Option<f64>,
    pub energy_start: Option<f64>,
    pub air_speed: Option<f64>,
    pub climb_rate: Option<f64>,
    pub distance: Option<f64>,
    pub duration: Option<f64>,
}

/// One physically homogeneous leg of a mission, solved as one nonlinear system.
///
/// The process tree is assembled at construction and only parameterised
/// afterwards through [`process_mut`](Segment::process_mut):
///
/// ```text
/// initialize:   expand_state, differentials, conditions
/// converge:     converge_root
/// iterate:      initials { time, mass, energy, position }
///               unknowns {}
///               conditions { differentials, kinematics, atmosphere,
///                            aerodynamics, energy, weights, forces }
///               residuals {}
/// post_process: ground_track, noise, finalize_analyses
/// ```
pub struct Segment {
    pub tag: String,
    /// Flat options routed to every collaborator.
    pub settings: Data,
    pub boundary: Boundary,
    pub state: State,
    pub analyses: AnalysisContainer<State>,
    process: Arc<SegmentProcess>,
    lifecycle: SegmentLifecycle,
    failure: Option<MissionError>,
    compiled: bool,
    /// Set by a successful `initialize`, cleared when one fails.
    initialized: bool,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("tag", &self.tag)
            .field("lifecycle", &self.lifecycle)
            .field("analyses", &self.analyses)
            .field("process", &self.process)
            .finish_non_exhaustive()
    }
}

impl Segment {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            settings: Data::new(),
            boundary: Boundary::default(),
            state: State::default(),
            analyses: AnalysisContainer::new(),
            process: Arc::new(default_process()),
            lifecycle: SegmentLifecycle::Constructed,
            failure: None,
            compiled: false,
            initialized: false,
        }
    }

    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_settings(mut self, settings: Data) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_control_points(mut self, points: usize) -> Self {
        self.state.numerics.number_of_control_points = points;
        self
    }

    pub fn with_analysis(
        mut self,
        name: impl Into<String>,
        analysis: impl Analysis<State> + 'static,
    ) -> Self {
        self.analyses.insert(name, Box::new(analysis));
        self
    }

    /// Declare an unknown with its single-row initial guess.
    pub fn add_unknown(&mut self, name: &str, guess: DMatrix<f64>) -> MissionResult<()> {
        self.state.unknowns.set(name, guess)?;
        Ok(())
    }

    /// Declare a residual `width` columns wide.
    pub fn add_residual(&mut self, name: &str, width: usize) -> MissionResult<()> {
        self.state.residuals.set(name, DMatrix::zeros(1, width))?;
        Ok(())
    }

    pub fn process(&self) -> &SegmentProcess {
        &self.process
    }

    pub fn process_mut(&mut self) -> &mut SegmentProcess {
        Arc::make_mut(&mut self.process)
    }

    pub fn lifecycle(&self) -> SegmentLifecycle {
        self.lifecycle
    }

    /// Error that moved the segment to `Failed`, if any.
    pub fn failure(&self) -> Option<&MissionError> {
        self.failure.as_ref()
    }

    pub fn is_converged(&self) -> bool {
        matches!(
            self.lifecycle,
            SegmentLifecycle::Converged | SegmentLifecycle::PostProcessed
        )
    }

    fn lifecycle_error(&self, action: &'static str) -> MissionError {
        MissionError::Lifecycle {
            tag: self.tag.clone(),
            action,
            state: self.lifecycle,
        }
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: SegmentLifecycle) {
        self.lifecycle = lifecycle;
    }

    pub(crate) fn fail(&mut self, err: &MissionError) {
        self.lifecycle = SegmentLifecycle::Failed;
        self.failure = Some(err.clone());
    }

    /// Run one named sub-process (or step) of the tree against this segment.
    ///
    /// The tree is shared through an `Arc`, so steps may call back into
    /// [`iterate`](Segment::iterate) while it runs.
    pub fn run(&mut self, path: &str) -> MissionResult<Value> {
        let process = Arc::clone(&self.process);
        match process.step(path) {
            Some(step) => step.run(self),
            None => Ok(Value::Empty),
        }
    }

    /// Size the state, build the operators and set boundary conditions.
    pub fn initialize(&mut self) -> MissionResult<()> {
        if self.lifecycle == SegmentLifecycle::Converging {
            return Err(self.lifecycle_error("initialize"));
        }
        self.failure = None;
        self.state.numerics.converged = None;

        let result = self.initialize_inner();
        self.initialized = result.is_ok();
        match &result {
            Ok(()) => self.lifecycle = SegmentLifecycle::Initialized,
            Err(err) => self.fail(err),
        }
        result
    }

    fn initialize_inner(&mut self) -> MissionResult<()> {
        if !self.compiled {
            self.analyses.compile_all()?;
            self.compiled = true;
        }
        self.analyses.initialize_all()?;
        self.run("initialize")?;
        tracing::debug!(segment = %self.tag, rows = self.state.rows(), "segment initialized");
        Ok(())
    }

    /// One pass of `initials -> unknowns -> conditions -> residuals`.
    pub fn iterate(&mut self) -> MissionResult<()> {
        if !self.initialized {
            return Err(self.lifecycle_error("iterate"));
        }
        self.run("iterate")?;
        Ok(())
    }

    /// Drive the residuals to zero.
    ///
    /// Requires the last `initialize` to have succeeded; a segment whose
    /// initialization failed keeps arrays sized for the previous run.
    pub fn converge(&mut self) -> MissionResult<()> {
        if !self.initialized || self.lifecycle == SegmentLifecycle::Converging {
            return Err(self.lifecycle_error("converge"));
        }
        self.lifecycle = SegmentLifecycle::Converging;
        match self.run("converge") {
            Ok(_) => {
                self.lifecycle = SegmentLifecycle::Converged;
                tracing::info!(
                    segment = %self.tag,
                    iterations = self.state.numerics.iterations,
                    residual_norm = ?self.state.numerics.residual_norm,
                    "segment converged"
                );
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Derived outputs that do not feed back into the residuals.
    pub fn post_process(&mut self) -> MissionResult<()> {
        if self.lifecycle != SegmentLifecycle::Converged {
            return Err(self.lifecycle_error("post_process"));
        }
        match self.run("post_process") {
            Ok(_) => {
                self.lifecycle = SegmentLifecycle::PostProcessed;
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// `initialize`, `converge` then `post_process`.
    pub fn evaluate(&mut self) -> MissionResult<()> {
        self.initialize()?;
        self.converge()?;
        self.post_process()
    }
}

/// Process tree shared by every segment kind.
pub fn default_process() -> SegmentProcess {
    use methods::{common, converge, initials, post_process, update};

    let initialize = SegmentProcess::new()
        .with("expand_state", Step::action(common::expand_state))
        .with("differentials", Step::action(common::dimensionless_operators))
        .with("conditions", Step::action(common::initialize_time));

    let iterate = SegmentProcess::new()
        .with(
            "initials",
            SegmentProcess::new()
                .with("time", Step::action(initials::time))
                .with("mass", Step::action(initials::mass))
                .with("energy", Step::action(initials::energy))
                .with("position", Step::action(initials::position)),
        )
        .with("unknowns", SegmentProcess::new())
        .with(
            "conditions",
            SegmentProcess::new()
                .with("differentials", Step::action(update::differentials_time))
                .with("kinematics", Step::action(update::kinematics))
                .with("atmosphere", update::collaborator("atmosphere"))
                .with("aerodynamics", update::collaborator("aerodynamics"))
                .with("energy", Step::action(update::energy))
                .with("weights", Step::action(update::weights))
                .with("forces", update::collaborator("forces")),
        )
        .with("residuals", SegmentProcess::new());

    let post = SegmentProcess::new()
        .with("ground_track", Step::action(post_process::ground_track))
        .with("noise", update::collaborator("noise"))
        .with("finalize_analyses", Step::action(post_process::finalize_analyses));

    SegmentProcess::new()
        .with("initialize", initialize)
        .with("converge", Step::action(converge::converge_root))
        .with("iterate", iterate)
        .with("post_process", post)
}
