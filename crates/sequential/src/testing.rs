//! Test doubles shared by unit tests.

use seqarrange_core::session::{AssertionStack, CheckResult, ModelValue};
use seqarrange_core::{Formula, Rational, Result, SolverBackend, SolverSession, Sort, VarId};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

type Shared<T> = Rc<RefCell<T>>;

/// What one session of a [`ScriptedBackend`] saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionLog {
    /// Boolean variables declared (ordering flags).
    pub bools: usize,
    /// Satisfiability checks.
    pub checks: usize,
}

/// Session that records formulas and answers checks from a scripted model.
#[derive(Debug, Default)]
pub struct RecordingSession {
    stack: AssertionStack,
    model: HashMap<VarId, f64>,
    named: HashMap<String, f64>,
    answer: Option<CheckResult>,
    script: Option<Shared<VecDeque<CheckResult>>>,
    log: Option<(Shared<Vec<SessionLog>>, usize)>,
    pub checks: usize,
}

impl RecordingSession {
    /// Asserted formulas.
    pub fn assertions(&self) -> &[Formula] {
        self.stack.assertions()
    }

    /// Sets the answer of every following check.
    pub fn answer_with(&mut self, answer: CheckResult) {
        self.answer = Some(answer);
    }

    /// Sets a model value by variable name.
    pub fn set_value(&mut self, name: &str, value: f64) {
        if let Some(var) = self.stack.lookup(name) {
            self.model.insert(var, value);
        }
    }

    /// Evaluates every assertion under the scripted model.
    pub fn model_satisfies(&self, extra: &[Formula]) -> bool {
        let value = |v: VarId| self.model.get(&v).copied();
        self.stack
            .assertions()
            .iter()
            .chain(extra)
            .all(|f| f.evaluate(&value) == Some(true))
    }

    fn record(&self, update: impl FnOnce(&mut SessionLog)) {
        if let Some((log, index)) = &self.log {
            if let Some(entry) = log.borrow_mut().get_mut(*index) {
                update(entry);
            }
        }
    }

    fn adopt_named(&mut self, name: &str, var: VarId) {
        if let Some(&value) = self.named.get(name) {
            self.model.insert(var, value);
        }
    }
}

impl SolverSession for RecordingSession {
    fn declare_real(&mut self, name: &str, lower: Rational, upper: Rational) -> Result<VarId> {
        let var = self.stack.declare(name, Sort::Real, Some(lower), Some(upper))?;
        self.adopt_named(name, var);
        Ok(var)
    }

    fn declare_bool(&mut self, name: &str) -> Result<VarId> {
        let var = self.stack.declare(name, Sort::Bool, None, None)?;
        self.adopt_named(name, var);
        self.record(|entry| entry.bools += 1);
        Ok(var)
    }

    fn lookup(&self, name: &str) -> Option<VarId> {
        self.stack.lookup(name)
    }

    fn assert(&mut self, formula: Formula) {
        self.stack.assert(formula);
    }

    fn push(&mut self) {
        self.stack.push();
    }

    fn pop(&mut self) -> Result<()> {
        self.stack.pop()
    }

    fn check_assuming(&mut self, _assumptions: &[Formula]) -> Result<CheckResult> {
        self.checks += 1;
        self.record(|entry| entry.checks += 1);
        let scripted = self.script.as_ref().and_then(|script| script.borrow_mut().pop_front());
        Ok(scripted.or(self.answer).unwrap_or(CheckResult::Unknown))
    }

    fn model_value(&self, var: VarId) -> Option<ModelValue> {
        self.model.get(&var).map(|v| ModelValue::Approximate(*v))
    }

    fn assertion_count(&self) -> usize {
        self.stack.assertions().len()
    }
}

/// Backend whose sessions answer from a shared script.
///
/// Checks consume the script in order across all sessions; once it runs out
/// every check gets the fallback answer. Model values are given by variable
/// name and apply to every session.
#[derive(Debug)]
pub struct ScriptedBackend {
    fallback: CheckResult,
    script: Shared<VecDeque<CheckResult>>,
    model: HashMap<String, f64>,
    log: Shared<Vec<SessionLog>>,
}

impl ScriptedBackend {
    /// Every check answers `answer`.
    pub fn new(answer: CheckResult) -> Self {
        Self::scripted(std::iter::empty(), answer)
    }

    /// Checks answer `answers` in turn, then `fallback`.
    pub fn scripted(answers: impl IntoIterator<Item = CheckResult>, fallback: CheckResult) -> Self {
        Self {
            fallback,
            script: Rc::new(RefCell::new(answers.into_iter().collect())),
            model: HashMap::new(),
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Model value of the variable called `name`.
    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.model.insert(name.into(), value);
        self
    }

    /// Sessions opened so far.
    pub fn sessions(&self) -> usize {
        self.log.borrow().len()
    }

    /// Per-session record, in opening order.
    pub fn session_log(&self) -> Vec<SessionLog> {
        self.log.borrow().clone()
    }
}

impl SolverBackend for ScriptedBackend {
    type Session = RecordingSession;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open_session(&self, _timeout_ms: u64) -> Result<RecordingSession> {
        let index = {
            let mut log = self.log.borrow_mut();
            log.push(SessionLog::default());
            log.len() - 1
        };
        Ok(RecordingSession {
            named: self.model.clone(),
            answer: Some(self.fallback),
            script: Some(Rc::clone(&self.script)),
            log: Some((Rc::clone(&self.log), index)),
            ..RecordingSession::default()
        })
    }
}
