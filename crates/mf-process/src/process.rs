//! Ordered, callable step pipelines.

use crate::error::{ProcessError, ProcessResult};
use crate::step::{Evaluate, Step};
use mf_core::{Data, Value};
use std::fmt;

/// An ordered sequence of named steps, itself callable.
///
/// Evaluating a process runs every step in insertion order against the same
/// context and returns a result map with one entry per step, in the same
/// order. The first failing step aborts the run; its error is returned as is.
///
/// Nested processes are addressed with dotted paths (`"iterate.conditions"`).
pub struct Process<C, E> {
    steps: Vec<(String, Step<C, E>)>,
    verbose: bool,
}

impl<C, E> Default for Process<C, E> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            verbose: false,
        }
    }
}

impl<C, E> Clone for Process<C, E> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
            verbose: self.verbose,
        }
    }
}

impl<C, E> fmt::Debug for Process<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.steps.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl<C, E> Process<C, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`push`](Self::push) for names known when the tree is written.
    ///
    /// # Panics
    ///
    /// If `name` is not a valid step name (empty or containing `.`).
    pub fn with(mut self, name: impl Into<String>, step: impl Into<Step<C, E>>) -> Self {
        let name = name.into();
        assert!(valid_name(&name), "invalid step name {name:?}");
        self.put(name, step.into());
        self
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Log every step at info level instead of trace, nested processes included.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
        for (_, step) in &mut self.steps {
            if let Some(p) = step.as_process_mut() {
                p.set_verbose(verbose);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|(k, _)| k.as_str())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|(k, _)| k == name)
    }

    /// Append a step; replacing an existing name keeps its slot.
    ///
    /// Names must be non-empty and must not contain `.`, which separates path
    /// segments.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        step: impl Into<Step<C, E>>,
    ) -> ProcessResult<&mut Self> {
        let name = checked(name.into())?;
        self.put(name, step.into());
        Ok(self)
    }

    fn put(&mut self, name: String, step: Step<C, E>) {
        match self.position(&name) {
            Some(idx) => self.steps[idx].1 = step,
            None => self.steps.push((name, step)),
        }
    }

    /// Insert a new step directly before `anchor`.
    pub fn insert_before(
        &mut self,
        anchor: &str,
        name: impl Into<String>,
        step: impl Into<Step<C, E>>,
    ) -> ProcessResult<()> {
        let name = checked(name.into())?;
        let idx = self.anchor(anchor)?;
        self.insert_at(idx, name, step.into());
        Ok(())
    }

    /// Insert a new step directly after `anchor`.
    pub fn insert_after(
        &mut self,
        anchor: &str,
        name: impl Into<String>,
        step: impl Into<Step<C, E>>,
    ) -> ProcessResult<()> {
        let name = checked(name.into())?;
        let idx = self.anchor(anchor)?;
        self.insert_at(idx + 1, name, step.into());
        Ok(())
    }

    fn anchor(&self, anchor: &str) -> ProcessResult<usize> {
        self.position(anchor).ok_or_else(|| ProcessError::MissingStep {
            name: anchor.to_string(),
        })
    }

    fn insert_at(&mut self, idx: usize, name: String, step: Step<C, E>) {
        if let Some(existing) = self.position(&name) {
            self.steps.remove(existing);
            let idx = if existing < idx { idx - 1 } else { idx };
            self.steps.insert(idx, (name, step));
        } else {
            self.steps.insert(idx, (name, step));
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Step<C, E>> {
        let idx = self.position(name)?;
        Some(self.steps.remove(idx).1)
    }

    pub fn get(&self, name: &str) -> Option<&Step<C, E>> {
        self.position(name).map(|idx| &self.steps[idx].1)
    }

    /// Step at a dotted path.
    pub fn step(&self, path: &str) -> Option<&Step<C, E>> {
        match path.rsplit_once('.') {
            None => self.get(path),
            Some((parent, last)) => self.process(parent)?.get(last),
        }
    }

    pub fn step_mut(&mut self, path: &str) -> Option<&mut Step<C, E>> {
        let (parent, last) = match path.rsplit_once('.') {
            None => (self, path),
            Some((parent, last)) => (self.process_mut(parent)?, last),
        };
        let idx = parent.position(last)?;
        Some(&mut parent.steps[idx].1)
    }

    /// Nested process at a dotted path.
    pub fn process(&self, path: &str) -> Option<&Process<C, E>> {
        path.split('.')
            .try_fold(self, |current, part| current.get(part)?.as_process())
    }

    pub fn process_mut(&mut self, path: &str) -> Option<&mut Process<C, E>> {
        let mut current = self;
        for part in path.split('.') {
            let idx = current.position(part)?;
            current = current.steps[idx].1.as_process_mut()?;
        }
        Some(current)
    }

    /// Assign a step at a dotted path; every parent must be a nested process.
    pub fn set(&mut self, path: &str, step: impl Into<Step<C, E>>) -> ProcessResult<()> {
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(ProcessError::InvalidPath {
                path: path.to_string(),
            });
        }
        let (parent, last) = match path.rsplit_once('.') {
            None => (self, path),
            Some((parent, last)) => {
                let parent = self
                    .process_mut(parent)
                    .ok_or_else(|| ProcessError::MissingProcess {
                        path: parent.to_string(),
                    })?;
                (parent, last)
            }
        };
        parent.push(last, step)?;
        Ok(())
    }

    /// Replace the step at `path` with [`Step::NoOp`], keeping its slot.
    pub fn disable(&mut self, path: &str) -> ProcessResult<()> {
        if self.step(path).is_none() {
            return Err(ProcessError::MissingStep {
                name: path.to_string(),
            });
        }
        self.set(path, Step::NoOp)
    }

    /// Run every step in order and collect their results.
    pub fn evaluate(&self, ctx: &mut C) -> Result<Data, E> {
        let mut results = Data::new();
        for (name, step) in &self.steps {
            if self.verbose {
                tracing::info!(step = %name, "running step");
            } else {
                tracing::trace!(step = %name, "running step");
            }
            let value = step.run(ctx)?;
            results.insert(name.clone(), value);
        }
        Ok(results)
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.')
}

fn checked(name: String) -> ProcessResult<String> {
    if valid_name(&name) {
        Ok(name)
    } else {
        Err(ProcessError::InvalidPath { path: name })
    }
}

impl<C, E> Evaluate<C, E> for Process<C, E> {
    fn evaluate(&self, ctx: &mut C) -> Result<Value, E> {
        Process::evaluate(self, ctx).map(Value::Map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Counter = Vec<&'static str>;

    fn log(name: &'static str) -> Step<Counter, String> {
        Step::action(move |log: &mut Counter| {
            log.push(name);
            Ok(())
        })
    }

    #[test]
    fn insert_before_and_after() {
        let mut p = Process::new().with("a", log("a")).with("c", log("c"));
        p.insert_before("c", "b", log("b")).unwrap();
        p.insert_after("c", "d", log("d")).unwrap();
        assert_eq!(p.names().collect::<Vec<_>>(), ["a", "b", "c", "d"]);

        p.insert_before("a", "d", log("d")).unwrap();
        assert_eq!(p.names().collect::<Vec<_>>(), ["d", "a", "b", "c"]);

        assert!(matches!(
            p.insert_after("missing", "x", log("x")),
            Err(ProcessError::MissingStep { .. })
        ));
    }

    #[test]
    fn replacing_keeps_slot() {
        let mut p = Process::new()
            .with("a", log("a"))
            .with("b", log("b"))
            .with("c", log("c"));
        p.push("a", log("A")).unwrap();

        let mut trace = Counter::new();
        p.evaluate(&mut trace).unwrap();
        assert_eq!(trace, ["A", "b", "c"]);
    }

    #[test]
    fn nested_paths() {
        let inner = Process::new().with("x", log("x"));
        let mut p = Process::new()
            .with("outer", Process::new().with("inner", inner))
            .with("tail", log("tail"));

        p.set("outer.inner.y", log("y")).unwrap();
        assert!(p.step("outer.inner.y").is_some());
        assert_eq!(p.process("outer.inner").map(Process::len), Some(2));

        assert_eq!(
            p.set("tail.z", log("z")).unwrap_err(),
            ProcessError::MissingProcess {
                path: "tail".to_string()
            }
        );
        assert!(matches!(
            p.set("outer..y", log("y")),
            Err(ProcessError::InvalidPath { .. })
        ));
    }

    #[test]
    fn dotted_or_empty_names_are_rejected() {
        let mut p = Process::new().with("a", log("a"));
        assert_eq!(
            p.push("b.c", log("b")).unwrap_err(),
            ProcessError::InvalidPath {
                path: "b.c".to_string()
            }
        );
        assert!(matches!(
            p.push("", log("b")),
            Err(ProcessError::InvalidPath { .. })
        ));
        assert!(matches!(
            p.insert_after("a", "x.y", log("x")),
            Err(ProcessError::InvalidPath { .. })
        ));
        assert_eq!(p.names().collect::<Vec<_>>(), ["a"]);
    }

    #[test]
    #[should_panic(expected = "invalid step name")]
    fn builder_panics_on_dotted_name() {
        let _ = Process::new().with("a.b", log("a"));
    }

    #[test]
    fn step_mut_replaces_in_place() {
        let mut p = Process::new()
            .with("outer", Process::new().with("x", log("x")).with("y", log("y")));
        if let Some(slot) = p.step_mut("outer.x") {
            *slot = log("X");
        }
        assert!(p.step_mut("outer.z").is_none());

        let mut trace = Counter::new();
        p.evaluate(&mut trace).unwrap();
        assert_eq!(trace, ["X", "y"]);
    }

    #[test]
    fn remove_step() {
        let mut p = Process::new().with("a", log("a")).with("b", log("b"));
        assert!(p.remove("a").is_some());
        assert!(p.remove("a").is_none());
        assert_eq!(p.len(), 1);
    }
}
