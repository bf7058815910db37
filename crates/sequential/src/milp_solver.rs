//! MILP solver backend.
//!
//! Formulas are lowered to a mixed-integer feasibility program and handed to
//! HiGHS through `good_lp`:
//!
//! - every formula is put in negation normal form,
//! - an atom `e ⋈ 0` becomes a row `e + m ≤ 0`, where `m` is the strict
//!   margin for `<`/`>` and zero otherwise,
//! - a disjunction introduces one binary indicator per branch and a row
//!   requiring one indicator to be set,
//! - a branch guarded by indicator `z` relaxes its rows by a big-M term
//!   derived from the variable bounds, so `z = 0` switches it off.
//!
//! Programs are rebuilt for every check; assumptions are lowered together
//! with the asserted formulas. Returned assignments are re-checked against
//! the rows and a violated row turns the answer into `Unknown`.

use seqarrange_core::session::{AssertionStack, CheckResult, Declaration, ModelValue};
use seqarrange_core::{Formula, LinExpr, Rational, Relation, Result, SolverBackend, SolverSession, Sort, VarId};

#[cfg(feature = "milp")]
use good_lp::{
    constraint, solvers::highs::highs, variable, Expression, ProblemVariables, ResolutionError,
    Solution, SolverModel, Variable,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration of the MILP backend.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MilpConfig {
    /// Slack enforced by strict inequalities.
    pub strict_margin: f64,
    /// Relative tolerance when re-checking returned assignments.
    pub feasibility_tolerance: f64,
    /// Let HiGHS print its log.
    pub verbose: bool,
}

impl Default for MilpConfig {
    fn default() -> Self {
        Self {
            strict_margin: 0.01,
            feasibility_tolerance: 1e-6,
            verbose: false,
        }
    }
}

impl MilpConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the strict-inequality margin.
    pub fn with_strict_margin(mut self, margin: f64) -> Self {
        self.strict_margin = margin.max(0.0);
        self
    }

    /// Sets the feasibility tolerance.
    pub fn with_feasibility_tolerance(mut self, tolerance: f64) -> Self {
        self.feasibility_tolerance = tolerance.max(0.0);
        self
    }

    /// Enables solver output.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Check if MILP feature is enabled.
pub fn is_milp_available() -> bool {
    cfg!(feature = "milp")
}

/// Column of a lowered program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Declared(usize),
    Indicator(usize),
}

/// `Σ terms + constant ≤ 0`.
#[derive(Debug, Clone, PartialEq)]
struct Row {
    terms: Vec<(Column, f64)>,
    constant: f64,
}

impl Row {
    fn normalized(mut self) -> Self {
        let scale = self
            .terms
            .iter()
            .map(|(_, c)| c.abs())
            .fold(0.0_f64, f64::max);
        if scale > 0.0 && scale != 1.0 {
            for (_, c) in &mut self.terms {
                *c /= scale;
            }
            self.constant /= scale;
        }
        self
    }
}

/// Column bounds of a lowered program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ColumnSpec {
    pub lower: f64,
    pub upper: f64,
    pub binary: bool,
}

/// Feasibility program `rows ≤ 0` over bounded columns.
#[derive(Debug, Clone, Default)]
pub(crate) struct LinearProgram {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<(Vec<(usize, f64)>, f64)>,
}

impl LinearProgram {
    /// Largest relative row violation of an assignment.
    fn worst_violation(&self, values: &[f64]) -> f64 {
        self.rows
            .iter()
            .map(|(terms, constant)| {
                let mut sum = *constant;
                let mut magnitude = constant.abs();
                for &(col, coef) in terms {
                    let v = coef * values.get(col).copied().unwrap_or(0.0);
                    sum += v;
                    magnitude += v.abs();
                }
                sum / magnitude.max(1.0)
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Translation of formulas into rows.
struct Lowering<'a> {
    declarations: &'a [Declaration],
    margin: f64,
    rows: Vec<Row>,
    indicators: usize,
    infeasible: bool,
}

impl<'a> Lowering<'a> {
    fn new(declarations: &'a [Declaration], margin: f64) -> Self {
        Self {
            declarations,
            margin,
            rows: Vec::new(),
            indicators: 0,
            infeasible: false,
        }
    }

    fn bounds(&self, var: VarId) -> (f64, f64) {
        match self.declarations.get(var.index()) {
            Some(decl) if decl.sort == Sort::Bool => (0.0, 1.0),
            Some(decl) => (
                decl.lower.map(|r| r.as_f64()).unwrap_or(f64::MIN),
                decl.upper.map(|r| r.as_f64()).unwrap_or(f64::MAX),
            ),
            None => (0.0, 0.0),
        }
    }

    /// Interval of an expression over the variable bounds.
    fn range(&self, expr: &LinExpr) -> (f64, f64) {
        let c = expr.constant_part().as_f64();
        expr.terms().iter().fold((c, c), |(lo, hi), (var, coef)| {
            let k = coef.as_f64();
            let (a, b) = self.bounds(*var);
            if k >= 0.0 {
                (lo + k * a, hi + k * b)
            } else {
                (lo + k * b, hi + k * a)
            }
        })
    }

    fn new_indicator(&mut self) -> usize {
        self.indicators += 1;
        self.indicators - 1
    }

    fn lower_root(&mut self, formula: &Formula) {
        let nnf = formula.to_nnf();
        self.lower(&nnf, None);
    }

    fn lower(&mut self, formula: &Formula, active: Option<usize>) {
        match formula {
            Formula::Const(true) => {}
            Formula::Const(false) => match active {
                None => self.infeasible = true,
                Some(z) => self.rows.push(Row {
                    terms: vec![(Column::Indicator(z), 1.0)],
                    constant: 0.0,
                }),
            },
            Formula::Atom(expr, relation) => {
                let expr = expr.simplified();
                match relation {
                    Relation::Lt => self.enforce(&expr, self.margin, active),
                    Relation::Le => self.enforce(&expr, 0.0, active),
                    Relation::Gt => self.enforce(&-expr, self.margin, active),
                    Relation::Ge => self.enforce(&-expr, 0.0, active),
                    Relation::Eq => {
                        self.enforce(&expr, 0.0, active);
                        self.enforce(&-expr, 0.0, active);
                    }
                }
            }
            Formula::Bool(v) => {
                let var = Column::Declared(v.index());
                self.rows.push(match active {
                    None => Row {
                        terms: vec![(var, -1.0)],
                        constant: 1.0,
                    },
                    Some(z) => Row {
                        terms: vec![(Column::Indicator(z), 1.0), (var, -1.0)],
                        constant: 0.0,
                    },
                });
            }
            Formula::Not(inner) => match inner.as_ref() {
                Formula::Bool(v) => {
                    let var = Column::Declared(v.index());
                    self.rows.push(match active {
                        None => Row {
                            terms: vec![(var, 1.0)],
                            constant: 0.0,
                        },
                        Some(z) => Row {
                            terms: vec![(Column::Indicator(z), 1.0), (var, 1.0)],
                            constant: -1.0,
                        },
                    });
                }
                other => {
                    let nnf = Formula::negate(other.clone()).to_nnf();
                    self.lower(&nnf, active);
                }
            },
            Formula::And(parts) => {
                for part in parts {
                    self.lower(part, active);
                }
            }
            Formula::Or(parts) => {
                let mut selector = Row {
                    terms: Vec::with_capacity(parts.len() + 1),
                    constant: 1.0,
                };
                if let Some(z) = active {
                    selector.terms.push((Column::Indicator(z), 1.0));
                    selector.constant = 0.0;
                }
                for part in parts {
                    let w = self.new_indicator();
                    selector.terms.push((Column::Indicator(w), -1.0));
                    self.lower(part, Some(w));
                }
                self.rows.push(selector);
            }
            Formula::Implies(..) => {
                let nnf = formula.to_nnf();
                self.lower(&nnf, active);
            }
        }
    }

    /// `expr + margin ≤ 0`, relaxed by big-M when guarded.
    fn enforce(&mut self, expr: &LinExpr, margin: f64, active: Option<usize>) {
        let (lo, hi) = self.range(expr);
        if hi + margin <= 0.0 {
            return;
        }
        let terms: Vec<(Column, f64)> = expr
            .terms()
            .iter()
            .map(|(v, c)| (Column::Declared(v.index()), c.as_f64()))
            .collect();
        let constant = expr.constant_part().as_f64() + margin;
        match active {
            None => {
                if lo + margin > 0.0 {
                    self.infeasible = true;
                }
                self.rows.push(Row { terms, constant }.normalized());
            }
            Some(z) => {
                let big = hi + margin;
                let mut terms = terms;
                terms.push((Column::Indicator(z), big));
                self.rows.push(
                    Row {
                        terms,
                        constant: constant - big,
                    }
                    .normalized(),
                );
            }
        }
    }

    fn finish(self) -> LinearProgram {
        let offset = self.declarations.len();
        let mut columns: Vec<ColumnSpec> = self
            .declarations
            .iter()
            .map(|decl| match decl.sort {
                Sort::Bool => ColumnSpec {
                    lower: 0.0,
                    upper: 1.0,
                    binary: true,
                },
                Sort::Real => ColumnSpec {
                    lower: decl.lower.map(|r| r.as_f64()).unwrap_or(f64::MIN),
                    upper: decl.upper.map(|r| r.as_f64()).unwrap_or(f64::MAX),
                    binary: false,
                },
            })
            .collect();
        columns.extend((0..self.indicators).map(|_| ColumnSpec {
            lower: 0.0,
            upper: 1.0,
            binary: true,
        }));
        let resolve = |c: Column| match c {
            Column::Declared(i) => i,
            Column::Indicator(k) => offset + k,
        };
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                (
                    row.terms.into_iter().map(|(c, k)| (resolve(c), k)).collect(),
                    row.constant,
                )
            })
            .collect();
        LinearProgram { columns, rows }
    }
}

/// Answer of the MILP solver on a lowered program.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ProgramAnswer {
    Feasible(Vec<f64>),
    Infeasible,
    Unknown,
}

#[cfg(feature = "milp")]
fn solve_program(program: &LinearProgram, timeout_ms: u64, verbose: bool) -> ProgramAnswer {
    let mut vars = ProblemVariables::new();
    let columns: Vec<Variable> = program
        .columns
        .iter()
        .map(|c| {
            if c.binary {
                vars.add(variable().binary())
            } else {
                vars.add(variable().min(c.lower).max(c.upper))
            }
        })
        .collect();

    let mut problem = vars
        .minimise(Expression::from(0.0))
        .using(highs)
        .set_option("time_limit", timeout_ms as f64 / 1000.0)
        .set_option("output_flag", verbose);
    for (terms, constant) in &program.rows {
        let mut expr = Expression::from(*constant);
        for &(col, coef) in terms {
            expr += coef * columns[col];
        }
        problem = problem.with(constraint!(expr <= 0.0));
    }

    match problem.solve() {
        Ok(solution) => ProgramAnswer::Feasible(columns.iter().map(|v| solution.value(*v)).collect()),
        Err(ResolutionError::Infeasible) => ProgramAnswer::Infeasible,
        Err(e) => {
            log::warn!("HiGHS returned no answer: {}", e);
            ProgramAnswer::Unknown
        }
    }
}

#[cfg(not(feature = "milp"))]
fn solve_program(_program: &LinearProgram, _timeout_ms: u64, _verbose: bool) -> ProgramAnswer {
    log::warn!("MILP solver not available (compile with 'milp' feature)");
    ProgramAnswer::Unknown
}

/// Backend producing [`MilpSession`]s.
#[derive(Debug, Clone, Default)]
pub struct MilpBackend {
    config: MilpConfig,
}

impl MilpBackend {
    /// Creates a backend with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with the given settings.
    pub fn with_config(config: MilpConfig) -> Self {
        Self { config }
    }

    /// Backend settings.
    pub fn config(&self) -> &MilpConfig {
        &self.config
    }
}

impl SolverBackend for MilpBackend {
    type Session = MilpSession;

    fn name(&self) -> &'static str {
        "highs"
    }

    fn open_session(&self, timeout_ms: u64) -> Result<MilpSession> {
        Ok(MilpSession::new(self.config.clone(), timeout_ms))
    }
}

/// Incremental session over the MILP solver.
#[derive(Debug, Clone)]
pub struct MilpSession {
    stack: AssertionStack,
    config: MilpConfig,
    timeout_ms: u64,
    model: Option<Vec<f64>>,
}

impl MilpSession {
    /// Creates an empty session.
    pub fn new(config: MilpConfig, timeout_ms: u64) -> Self {
        Self {
            stack: AssertionStack::new(),
            config,
            timeout_ms,
            model: None,
        }
    }

    fn lower(&self, assumptions: &[Formula]) -> Option<LinearProgram> {
        let mut lowering = Lowering::new(self.stack.declarations(), self.config.strict_margin);
        for formula in self.stack.assertions().iter().chain(assumptions) {
            lowering.lower_root(formula);
            if lowering.infeasible {
                return None;
            }
        }
        Some(lowering.finish())
    }
}

impl SolverSession for MilpSession {
    fn declare_real(&mut self, name: &str, lower: Rational, upper: Rational) -> Result<VarId> {
        self.stack.declare(name, Sort::Real, Some(lower), Some(upper))
    }

    fn declare_bool(&mut self, name: &str) -> Result<VarId> {
        self.stack.declare(name, Sort::Bool, None, None)
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

    fn check_assuming(&mut self, assumptions: &[Formula]) -> Result<CheckResult> {
        self.model = None;
        let Some(program) = self.lower(assumptions) else {
            log::debug!("lowering found a trivially infeasible row");
            return Ok(CheckResult::Unsat);
        };
        log::trace!(
            "MILP program: {} columns, {} rows",
            program.columns.len(),
            program.rows.len()
        );

        match solve_program(&program, self.timeout_ms, self.config.verbose) {
            ProgramAnswer::Feasible(values) => {
                let worst = program.worst_violation(&values);
                if worst > self.config.feasibility_tolerance {
                    log::warn!("MILP assignment violates a row by {:.3e}", worst);
                    return Ok(CheckResult::Unknown);
                }
                self.model = Some(values);
                Ok(CheckResult::Sat)
            }
            ProgramAnswer::Infeasible => Ok(CheckResult::Unsat),
            ProgramAnswer::Unknown => Ok(CheckResult::Unknown),
        }
    }

    fn model_value(&self, var: VarId) -> Option<ModelValue> {
        let value = *self.model.as_ref()?.get(var.index())?;
        let decl = self.stack.declaration(var)?;
        Some(match decl.sort {
            Sort::Bool => ModelValue::Bool(value > 0.5),
            Sort::Real => ModelValue::Approximate(value),
        })
    }

    fn assertion_count(&self) -> usize {
        self.stack.assertions().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declarations() -> AssertionStack {
        let mut stack = AssertionStack::new();
        stack
            .declare("x", Sort::Real, Some(Rational::ZERO), Some(Rational::from_integer(10)))
            .unwrap();
        stack.declare("b", Sort::Bool, None, None).unwrap();
        stack
    }

    fn x() -> VarId {
        declarations().lookup("x").unwrap()
    }

    #[test]
    fn test_is_milp_available() {
        let _available = is_milp_available();
    }

    #[test]
    fn test_lower_plain_atom() {
        let stack = declarations();
        let mut lowering = Lowering::new(stack.declarations(), 0.01);
        lowering.lower_root(&Formula::le(x(), Rational::from_integer(4)));
        let program = lowering.finish();
        assert_eq!(program.columns.len(), 2);
        assert_eq!(program.rows.len(), 1);
        assert!(program.worst_violation(&[3.0, 0.0]) <= 0.0);
        assert!(program.worst_violation(&[5.0, 0.0]) > 0.0);
    }

    #[test]
    fn test_lower_disjunction() {
        let stack = declarations();
        let mut lowering = Lowering::new(stack.declarations(), 0.01);
        lowering.lower_root(&Formula::any([
            Formula::lt(x(), Rational::from_integer(2)),
            Formula::gt(x(), Rational::from_integer(8)),
        ]));
        let program = lowering.finish();
        // Two indicators, two guarded rows and the selector.
        assert_eq!(program.columns.len(), 4);
        assert_eq!(program.rows.len(), 3);

        // x = 1 with the first branch selected.
        assert!(program.worst_violation(&[1.0, 0.0, 1.0, 0.0]) <= 1e-9);
        // x = 9 with the second branch selected.
        assert!(program.worst_violation(&[9.0, 0.0, 0.0, 1.0]) <= 1e-9);
        // x = 5 cannot satisfy either branch.
        assert!(program.worst_violation(&[5.0, 0.0, 1.0, 0.0]) > 0.0);
        assert!(program.worst_violation(&[5.0, 0.0, 0.0, 1.0]) > 0.0);
        assert!(program.worst_violation(&[5.0, 0.0, 0.0, 0.0]) > 0.0);
    }

    #[test]
    fn test_lower_bool_literals() {
        let stack = declarations();
        let b = stack.lookup("b").unwrap();
        let mut lowering = Lowering::new(stack.declarations(), 0.01);
        lowering.lower_root(&Formula::implies(
            Formula::Bool(b),
            Formula::ge(x(), Rational::from_integer(5)),
        ));
        let program = lowering.finish();
        // b = 1 forces x ≥ 5.
        let ok = |values: &[f64]| program.worst_violation(values) <= 1e-9;
        let with_first = |x: f64, b: f64| [x, b, 1.0, 0.0];
        let with_second = |x: f64, b: f64| [x, b, 0.0, 1.0];
        assert!(ok(&with_first(0.0, 0.0)));
        assert!(!ok(&with_first(0.0, 1.0)));
        assert!(ok(&with_second(6.0, 1.0)));
        assert!(!ok(&with_second(4.0, 1.0)));
    }

    #[test]
    fn test_trivially_infeasible() {
        let stack = declarations();
        let mut lowering = Lowering::new(stack.declarations(), 0.01);
        lowering.lower_root(&Formula::gt(x(), Rational::from_integer(20)));
        assert!(lowering.infeasible);

        let mut session = MilpSession::new(MilpConfig::default(), 1000);
        let v = session
            .declare_real("x", Rational::ZERO, Rational::from_integer(10))
            .unwrap();
        session.assert(Formula::Const(false));
        assert_eq!(session.check().unwrap(), CheckResult::Unsat);
        assert!(session.model_value(v).is_none());
    }

    #[test]
    fn test_redundant_guarded_atom_dropped() {
        let stack = declarations();
        let mut lowering = Lowering::new(stack.declarations(), 0.01);
        lowering.lower_root(&Formula::any([
            Formula::le(x(), Rational::from_integer(50)),
            Formula::Bool(stack.lookup("b").unwrap()),
        ]));
        let program = lowering.finish();
        // The always-true atom adds no row of its own.
        assert_eq!(program.rows.len(), 2);
    }

    #[test]
    fn test_config_builder() {
        let config = MilpConfig::new().with_strict_margin(-1.0).with_verbose(true);
        assert_eq!(config.strict_margin, 0.0);
        assert!(config.verbose);
    }

    #[test]
    #[cfg(feature = "milp")]
    fn test_session_solves_disjunction() {
        let mut session = MilpBackend::new().open_session(5000).unwrap();
        let x = session
            .declare_real("x", Rational::ZERO, Rational::from_integer(10))
            .unwrap();
        let y = session
            .declare_real("y", Rational::ZERO, Rational::from_integer(10))
            .unwrap();
        session.assert(Formula::any([
            Formula::lt(LinExpr::var(x) + LinExpr::var(y), Rational::from_integer(1)),
            Formula::gt(LinExpr::var(x) - LinExpr::var(y), Rational::from_integer(9)),
        ]));
        session.assert(Formula::ge(y, Rational::from_integer(1)));
        assert_eq!(session.check().unwrap(), CheckResult::Sat);
        let xv = session.model_value(x).unwrap().as_f64();
        let yv = session.model_value(y).unwrap().as_f64();
        assert!(xv - yv > 9.0 - 1e-6);

        session.push();
        session.assert(Formula::le(x, Rational::from_integer(5)));
        assert_eq!(session.check().unwrap(), CheckResult::Unsat);
        session.pop().unwrap();
        assert_eq!(session.check().unwrap(), CheckResult::Sat);
    }

    #[test]
    #[cfg(feature = "milp")]
    fn test_session_assumptions_not_retained() {
        let mut session = MilpBackend::new().open_session(5000).unwrap();
        let x = session
            .declare_real("x", Rational::ZERO, Rational::from_integer(10))
            .unwrap();
        let too_big = Formula::gt(x, Rational::from_integer(11));
        assert_eq!(session.check_assuming(&[too_big]).unwrap(), CheckResult::Unsat);
        assert_eq!(session.check().unwrap(), CheckResult::Sat);
        assert_eq!(session.assertion_count(), 0);
    }
}
