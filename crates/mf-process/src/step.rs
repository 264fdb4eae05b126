//! Pipeline steps.

use crate::process::Process;
use mf_core::Value;
use std::fmt;
use std::sync::Arc;

/// Plain function step operating on the pipeline context.
pub type StepFn<C, E> = Arc<dyn Fn(&mut C) -> Result<Value, E> + Send + Sync>;

/// Anything exposing an `evaluate` capability over the pipeline context.
pub trait Evaluate<C, E>: Send + Sync {
    fn evaluate(&self, ctx: &mut C) -> Result<Value, E>;
}

/// One slot of a [`Process`].
///
/// The variant is fixed when the step is built, so running a step is a plain
/// `match`. `NoOp` disables a slot without removing it, keeping the ordering
/// and any downstream references stable.
pub enum Step<C, E> {
    NoOp,
    Direct(StepFn<C, E>),
    Evaluator(Arc<dyn Evaluate<C, E>>),
    Process(Process<C, E>),
}

impl<C, E> Step<C, E> {
    /// Step from a function whose return value is recorded in the result map.
    pub fn direct<F>(f: F) -> Self
    where
        F: Fn(&mut C) -> Result<Value, E> + Send + Sync + 'static,
    {
        Step::Direct(Arc::new(f))
    }

    /// Step from a function that only mutates the context.
    pub fn action<F>(f: F) -> Self
    where
        F: Fn(&mut C) -> Result<(), E> + Send + Sync + 'static,
        C: 'static,
        E: 'static,
    {
        Step::Direct(Arc::new(move |ctx: &mut C| f(ctx).map(|()| Value::Empty)))
    }

    pub fn evaluator<T>(evaluator: T) -> Self
    where
        T: Evaluate<C, E> + 'static,
    {
        Step::Evaluator(Arc::new(evaluator))
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Step::NoOp)
    }

    pub fn as_process(&self) -> Option<&Process<C, E>> {
        match self {
            Step::Process(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_process_mut(&mut self) -> Option<&mut Process<C, E>> {
        match self {
            Step::Process(p) => Some(p),
            _ => None,
        }
    }

    /// Run the step once against `ctx`.
    pub fn run(&self, ctx: &mut C) -> Result<Value, E> {
        match self {
            Step::NoOp => Ok(Value::Empty),
            Step::Direct(f) => f(ctx),
            Step::Evaluator(e) => e.evaluate(ctx),
            Step::Process(p) => p.evaluate(ctx).map(Value::Map),
        }
    }
}

impl<C, E> Clone for Step<C, E> {
    fn clone(&self) -> Self {
        match self {
            Step::NoOp => Step::NoOp,
            Step::Direct(f) => Step::Direct(Arc::clone(f)),
            Step::Evaluator(e) => Step::Evaluator(Arc::clone(e)),
            Step::Process(p) => Step::Process(p.clone()),
        }
    }
}

impl<C, E> From<Process<C, E>> for Step<C, E> {
    fn from(p: Process<C, E>) -> Self {
        Step::Process(p)
    }
}

impl<C, E> fmt::Debug for Step<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::NoOp => write!(f, "NoOp"),
            Step::Direct(_) => write!(f, "Direct"),
            Step::Evaluator(_) => write!(f, "Evaluator"),
            Step::Process(p) => f.debug_tuple("Process").field(p).finish(),
        }
    }
}
