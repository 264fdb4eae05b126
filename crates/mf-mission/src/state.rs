//! Per-segment and per-mission state.

use crate::conditions::Conditions;
use mf_core::{Data, MfResult};
use mf_numerics::{Discretization, Operators};
use mf_solver::SolverConfig;
use serde::{Deserialize, Serialize};

/// Discretization settings, operators and the outcome of the last solve.
///
/// Only the settings are (de)serialized; operators and solve results are
/// rebuilt on every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Numerics {
    pub number_of_control_points: usize,
    pub discretization: Discretization,
    pub solver: SolverConfig,

    /// Operators on the dimensionless control points, fixed at initialize.
    #[serde(skip)]
    pub dimensionless: Operators,
    /// Operators rescaled to the current physical time span.
    #[serde(skip)]
    pub time: Operators,

    #[serde(skip)]
    pub converged: Option<bool>,
    #[serde(skip)]
    pub iterations: usize,
    #[serde(skip)]
    pub residual_norm: Option<f64>,
}

impl Default for Numerics {
    fn default() -> Self {
        Self {
            number_of_control_points: 16,
            discretization: Discretization::default(),
            solver: SolverConfig::default(),
            dimensionless: Operators::default(),
            time: Operators::default(),
            converged: None,
            iterations: 0,
            residual_norm: None,
        }
    }
}

/// Everything a segment's steps read and write.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub conditions: Conditions,
    /// Quantities the solver may adjust.
    pub unknowns: Data,
    /// Mismatches the solver drives to zero.
    pub residuals: Data,
    pub numerics: Numerics,
    /// Final row of the predecessor's conditions.
    pub initials: Option<Conditions>,
}

impl State {
    /// Resize conditions, unknowns and residuals to `rows` control points.
    ///
    /// State left over from a run with a different number of points is
    /// reset: conditions go back to a single zero row, and unknowns and
    /// residuals keep their first row as the new guess.
    pub fn expand_rows(&mut self, rows: usize) -> MfResult<()> {
        let current = self.conditions.rows();
        if current != rows && current != 1 {
            self.conditions = Conditions::with_rows(1);
            self.unknowns.first_rows();
            self.residuals.first_rows();
        }
        self.conditions.expand_rows(rows)?;
        self.unknowns.expand_rows(rows)?;
        self.residuals.expand_rows(rows)
    }

    pub fn rows(&self) -> usize {
        self.conditions.rows()
    }
}

/// Mission-level state.
///
/// `unknowns` and `residuals` hold the extra, mission-wide quantities solved
/// alongside the segments. `segments` is refreshed after evaluation with each
/// leaf segment's conditions, in mission order.
#[derive(Debug, Clone, Default)]
pub struct StateContainer {
    pub unknowns: Data,
    pub residuals: Data,
    pub segments: Vec<(String, Conditions)>,
}

impl StateContainer {
    pub fn segment(&self, tag: &str) -> Option<&Conditions> {
        self.segments
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, c)| c)
    }

    /// Conditions of every segment stacked in order.
    pub fn merged(&self) -> MfResult<Conditions> {
        let parts: Vec<&Conditions> = self.segments.iter().map(|(_, c)| c).collect();
        Conditions::stack(&parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::ones_row;
    use mf_solver::RootFinder;

    #[test]
    fn expand_reaches_unknowns_and_residuals() {
        let mut state = State::default();
        state.unknowns.set("throttle", ones_row(1) * 0.5).unwrap();
        state.residuals.set("forces", ones_row(2) * 0.0).unwrap();

        state.expand_rows(6).unwrap();
        assert_eq!(state.rows(), 6);
        assert_eq!(state.unknowns.array("throttle").unwrap().shape(), (6, 1));
        assert_eq!(state.residuals.array("forces").unwrap().shape(), (6, 2));
    }

    #[test]
    fn expand_resets_state_sized_for_another_run() {
        let mut state = State::default();
        state.unknowns.set("throttle", ones_row(1) * 0.5).unwrap();
        state.residuals.set("forces", ones_row(2) * 0.0).unwrap();
        state.conditions.extra.set("aerodynamics.lift", ones_row(1)).unwrap();
        state.expand_rows(4).unwrap();
        state.conditions.time[(3, 0)] = 9.0;

        state.expand_rows(3).unwrap();
        assert_eq!(state.rows(), 3);
        assert_eq!(state.conditions.time[(2, 0)], 0.0);
        assert!(state.conditions.extra.is_empty());
        let throttle = state.unknowns.array("throttle").unwrap();
        assert_eq!(throttle.shape(), (3, 1));
        assert!(throttle.iter().all(|&t| t == 0.5));
        assert_eq!(state.residuals.array("forces").unwrap().shape(), (3, 2));
    }

    #[test]
    fn numerics_from_yaml() {
        let yaml = r#"
number_of_control_points: 8
discretization: linear
solver:
  method: broyden
  tolerance: 1.0e-10
"#;
        let numerics: Numerics = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(numerics.number_of_control_points, 8);
        assert_eq!(numerics.discretization, Discretization::Linear);
        assert_eq!(numerics.solver.method, RootFinder::Broyden);
        assert_eq!(numerics.solver.max_iterations, 50);
        assert!(numerics.converged.is_none());
    }

    #[test]
    fn merged_stacks_segments() {
        let mut container = StateContainer::default();
        container.segments.push(("climb".into(), Conditions::with_rows(3)));
        container.segments.push(("cruise".into(), Conditions::with_rows(4)));
        assert_eq!(container.merged().unwrap().rows(), 7);
        assert!(container.segment("cruise").is_some());
        assert!(StateContainer::default().merged().is_err());
    }
}
