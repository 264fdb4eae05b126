//! Independent missions evaluated together.

use crate::error::MissionResult;
use crate::mission::{Mission, MissionReport};
use rayon::prelude::*;

/// Outcome of one mission in a set, keyed by mission tag.
pub type MissionOutcome = (String, MissionResult<MissionReport>);

/// Ordered collection of missions that share nothing.
#[derive(Debug, Default)]
pub struct MissionSet {
    missions: Vec<Mission>,
}

impl MissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, mission: Mission) -> Self {
        self.push(mission);
        self
    }

    pub fn push(&mut self, mission: Mission) {
        self.missions.push(mission);
    }

    pub fn len(&self) -> usize {
        self.missions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missions.is_empty()
    }

    pub fn get(&self, tag: &str) -> Option<&Mission> {
        self.missions.iter().find(|m| m.tag == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mission> {
        self.missions.iter()
    }

    /// Evaluate every mission in order on the current thread.
    pub fn evaluate_all(&mut self) -> Vec<MissionOutcome> {
        self.missions
            .iter_mut()
            .map(|m| (m.tag.clone(), m.evaluate()))
            .collect()
    }

    /// Evaluate every mission on the rayon pool, one mission per task.
    ///
    /// Results keep the insertion order.
    pub fn evaluate_all_parallel(&mut self) -> Vec<MissionOutcome> {
        tracing::info!(missions = self.missions.len(), "evaluating mission set in parallel");
        self.missions
            .par_iter_mut()
            .map(|m| (m.tag.clone(), m.evaluate()))
            .collect()
    }
}
