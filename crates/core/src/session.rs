//! Solver session abstraction.
//!
//! A [`SolverSession`] owns declared variables and asserted formulas. Sessions
//! are incremental: [`SolverSession::push`] / [`SolverSession::pop`] open and
//! discard assertion frames, and [`SolverSession::check_assuming`] checks with
//! extra formulas that are not retained. The model of the most recent
//! satisfiable check stays readable until the next check.
//!
//! [`AssertionStack`] is the bookkeeping shared by the backends.

use crate::error::{Error, Result};
use crate::formula::{Formula, Sort, VarId};
use crate::rational::Rational;
use std::collections::HashMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Outcome of a satisfiability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CheckResult {
    /// A model exists and can be read back.
    Sat,
    /// No model exists.
    Unsat,
    /// Timeout or incomplete reasoning.
    #[default]
    Unknown,
}

impl CheckResult {
    /// Returns true for [`CheckResult::Sat`].
    pub fn is_sat(self) -> bool {
        matches!(self, CheckResult::Sat)
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sat => write!(f, "sat"),
            Self::Unsat => write!(f, "unsat"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A value read from a solver model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelValue {
    /// Exact rational numeral.
    Exact {
        /// Numerator.
        numerator: i64,
        /// Denominator.
        denominator: i64,
    },
    /// Floating approximation (numeral too large, or a floating backend).
    Approximate(f64),
    /// Boolean value.
    Bool(bool),
}

impl ModelValue {
    /// Floating conversion (booleans as 0/1).
    pub fn as_f64(&self) -> f64 {
        match *self {
            ModelValue::Exact {
                numerator,
                denominator,
            } => {
                if denominator == 0 {
                    0.0
                } else {
                    numerator as f64 / denominator as f64
                }
            }
            ModelValue::Approximate(v) => v,
            ModelValue::Bool(b) => f64::from(u8::from(b)),
        }
    }
}

/// A declared variable.
#[derive(Debug, Clone)]
pub struct Declaration {
    /// Unique name within the session.
    pub name: String,
    /// Sort.
    pub sort: Sort,
    /// Lower bound (reals only).
    pub lower: Option<Rational>,
    /// Upper bound (reals only).
    pub upper: Option<Rational>,
}

/// An incremental solver session.
pub trait SolverSession {
    /// Declares a bounded real variable.
    fn declare_real(&mut self, name: &str, lower: Rational, upper: Rational) -> Result<VarId>;

    /// Declares a boolean variable.
    fn declare_bool(&mut self, name: &str) -> Result<VarId>;

    /// Looks a variable up by name.
    fn lookup(&self, name: &str) -> Option<VarId>;

    /// Adds a formula to the current frame.
    fn assert(&mut self, formula: Formula);

    /// Opens an assertion frame.
    fn push(&mut self);

    /// Discards the assertions of the innermost frame.
    fn pop(&mut self) -> Result<()>;

    /// Checks the asserted formulas.
    fn check(&mut self) -> Result<CheckResult> {
        self.check_assuming(&[])
    }

    /// Checks the asserted formulas together with temporary assumptions.
    fn check_assuming(&mut self, assumptions: &[Formula]) -> Result<CheckResult>;

    /// Value of a variable in the last model, if any.
    fn model_value(&self, var: VarId) -> Option<ModelValue>;

    /// Number of formulas currently asserted.
    fn assertion_count(&self) -> usize;
}

/// Factory of solver sessions.
pub trait SolverBackend {
    /// Session type produced by this backend.
    type Session: SolverSession;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Opens a fresh session with a per-check time limit.
    fn open_session(&self, timeout_ms: u64) -> Result<Self::Session>;
}

/// Declarations, assertions and frames of a session.
#[derive(Debug, Clone, Default)]
pub struct AssertionStack {
    declarations: Vec<Declaration>,
    names: HashMap<String, VarId>,
    assertions: Vec<Formula>,
    frames: Vec<usize>,
}

impl AssertionStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a variable, rejecting duplicate names.
    pub fn declare(
        &mut self,
        name: &str,
        sort: Sort,
        lower: Option<Rational>,
        upper: Option<Rational>,
    ) -> Result<VarId> {
        if self.names.contains_key(name) {
            return Err(Error::DuplicateVariable(name.to_string()));
        }
        if let (Some(lo), Some(hi)) = (lower, upper) {
            if lo > hi {
                return Err(Error::InvalidConfig(format!(
                    "variable {} has empty range [{}, {}]",
                    name, lo, hi
                )));
            }
        }
        let id = VarId(self.declarations.len());
        self.declarations.push(Declaration {
            name: name.to_string(),
            sort,
            lower,
            upper,
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declaration of a variable.
    pub fn declaration(&self, var: VarId) -> Option<&Declaration> {
        self.declarations.get(var.index())
    }

    /// All declarations in order.
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Looks a variable up by name.
    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.names.get(name).copied()
    }

    /// Adds a formula; constant `true` is dropped.
    pub fn assert(&mut self, formula: Formula) {
        if !matches!(formula, Formula::Const(true)) {
            self.assertions.push(formula);
        }
    }

    /// Opens a frame.
    pub fn push(&mut self) {
        self.frames.push(self.assertions.len());
    }

    /// Closes the innermost frame.
    pub fn pop(&mut self) -> Result<()> {
        let mark = self
            .frames
            .pop()
            .ok_or_else(|| Error::Internal("pop without matching push".into()))?;
        self.assertions.truncate(mark);
        Ok(())
    }

    /// Current assertions.
    pub fn assertions(&self) -> &[Formula] {
        &self.assertions
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
