//! Physics collaborator contract and the named container fanning phases out.

use crate::error::{AnalysisError, AnalysisResult};
use mf_core::{Data, Value};
use std::fmt;

/// Lifecycle phases an analysis declares it implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phases {
    pub compile: bool,
    pub initialize: bool,
    pub evaluate: bool,
    pub finalize: bool,
}

impl Phases {
    pub const ALL: Phases = Phases {
        compile: true,
        initialize: true,
        evaluate: true,
        finalize: true,
    };

    pub const NONE: Phases = Phases {
        compile: false,
        initialize: false,
        evaluate: false,
        finalize: false,
    };

    /// Pure model with no setup or teardown.
    pub const fn evaluate_only() -> Phases {
        Phases {
            evaluate: true,
            ..Phases::NONE
        }
    }
}

impl Default for Phases {
    fn default() -> Self {
        Phases::ALL
    }
}

/// A physics collaborator (aerodynamics, propulsion, atmosphere, ...).
///
/// The engine never interprets what an analysis computes. It only drives the
/// four phases and stores whatever `evaluate` returns.
pub trait Analysis<S>: Send {
    /// Capability set; read once when the analysis is registered.
    fn phases(&self) -> Phases {
        Phases::ALL
    }

    fn compile(&mut self) -> AnalysisResult<()> {
        Ok(())
    }

    fn initialize(&mut self) -> AnalysisResult<()> {
        Ok(())
    }

    fn evaluate(&mut self, state: &mut S, settings: &Data) -> AnalysisResult<Data> {
        let _ = (state, settings);
        Err(AnalysisError::NotImplemented { phase: "evaluate" })
    }

    fn finalize(&mut self) -> AnalysisResult<()> {
        Ok(())
    }

    /// Vehicle description the analysis was built against, if any.
    fn geometry(&self) -> Option<&Data> {
        None
    }
}

struct Entry<S> {
    name: String,
    phases: Phases,
    analysis: Box<dyn Analysis<S>>,
}

/// Ordered, named collection of analyses, itself an [`Analysis`].
pub struct AnalysisContainer<S> {
    entries: Vec<Entry<S>>,
}

impl<S> Default for AnalysisContainer<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<S> fmt::Debug for AnalysisContainer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (&e.name, e.phases)))
            .finish()
    }
}

fn wrap(name: &str, err: AnalysisError) -> AnalysisError {
    AnalysisError::Child {
        name: name.to_string(),
        source: Box::new(err),
    }
}

impl<S> AnalysisContainer<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Register an analysis; replacing a name keeps its slot.
    pub fn insert(&mut self, name: impl Into<String>, analysis: Box<dyn Analysis<S>>) {
        let name = name.into();
        let entry = Entry {
            phases: analysis.phases(),
            name,
            analysis,
        };
        match self.position(&entry.name) {
            Some(idx) => self.entries[idx] = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn with(mut self, name: impl Into<String>, analysis: impl Analysis<S> + 'static) -> Self {
        self.insert(name, Box::new(analysis));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Analysis<S>> {
        self.position(name)
            .map(|idx| self.entries[idx].analysis.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Analysis<S> + 'static)> {
        let idx = self.position(name)?;
        Some(self.entries[idx].analysis.as_mut())
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Analysis<S>>> {
        let idx = self.position(name)?;
        Some(self.entries.remove(idx).analysis)
    }

    pub fn compile_all(&mut self) -> AnalysisResult<()> {
        for e in self.entries.iter_mut().filter(|e| e.phases.compile) {
            e.analysis.compile().map_err(|err| wrap(&e.name, err))?;
        }
        Ok(())
    }

    pub fn initialize_all(&mut self) -> AnalysisResult<()> {
        for e in self.entries.iter_mut().filter(|e| e.phases.initialize) {
            e.analysis.initialize().map_err(|err| wrap(&e.name, err))?;
        }
        Ok(())
    }

    pub fn finalize_all(&mut self) -> AnalysisResult<()> {
        for e in self.entries.iter_mut().filter(|e| e.phases.finalize) {
            e.analysis.finalize().map_err(|err| wrap(&e.name, err))?;
        }
        Ok(())
    }

    /// Evaluate every child declaring `evaluate`, keyed by child name.
    pub fn evaluate_all(&mut self, state: &mut S, settings: &Data) -> AnalysisResult<Data> {
        let mut results = Data::new();
        for e in self.entries.iter_mut().filter(|e| e.phases.evaluate) {
            tracing::trace!(analysis = %e.name, "evaluating analysis");
            let out = e
                .analysis
                .evaluate(state, settings)
                .map_err(|err| wrap(&e.name, err))?;
            results.insert(e.name.clone(), Value::Map(out));
        }
        Ok(results)
    }

    /// Evaluate one named child.
    ///
    /// A child that does not declare `evaluate` yields `Ok(None)`.
    pub fn evaluate_one(
        &mut self,
        name: &str,
        state: &mut S,
        settings: &Data,
    ) -> AnalysisResult<Option<Data>> {
        let idx = self.position(name).ok_or_else(|| AnalysisError::NotFound {
            name: name.to_string(),
        })?;
        let e = &mut self.entries[idx];
        if !e.phases.evaluate {
            return Ok(None);
        }
        e.analysis
            .evaluate(state, settings)
            .map(Some)
            .map_err(|err| wrap(&e.name, err))
    }

    /// Route the vehicle description of one child without interpreting it.
    pub fn geometry(&self, name: &str) -> AnalysisResult<Option<&Data>> {
        self.get(name)
            .map(|a| a.geometry())
            .ok_or_else(|| AnalysisError::NotFound {
                name: name.to_string(),
            })
    }
}

impl<S> Analysis<S> for AnalysisContainer<S> {
    fn compile(&mut self) -> AnalysisResult<()> {
        self.compile_all()
    }

    fn initialize(&mut self) -> AnalysisResult<()> {
        self.initialize_all()
    }

    fn evaluate(&mut self, state: &mut S, settings: &Data) -> AnalysisResult<Data> {
        self.evaluate_all(state, settings)
    }

    fn finalize(&mut self) -> AnalysisResult<()> {
        self.finalize_all()
    }
}
