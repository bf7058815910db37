//! Backend-agnostic formulas over decision variables.
//!
//! Constraints are built as [`Formula`] trees of linear atoms `expr ⋈ 0`,
//! boolean variables and connectives. Backends translate them into their own
//! representation: the MILP backend lowers disjunctions to indicator rows,
//! the SMT-LIB backend prints them verbatim.
//!
//! Smart constructors ([`Formula::all`], [`Formula::any`], [`Formula::compare`])
//! flatten nested connectives and fold constant atoms, so formulas built
//! against fixed objects stay small.

use crate::rational::Rational;
use std::ops::{Add, Mul, Neg, Sub};

/// Handle of a declared variable, scoped to one solver session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

impl VarId {
    /// Position of the variable in its session's declaration list.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Sort of a declared variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    /// Real-valued (rational) variable.
    Real,
    /// Boolean variable.
    Bool,
}

/// Linear expression `Σ cᵢ·xᵢ + c₀` with rational coefficients.
#[derive(Debug, Clone, Default)]
pub struct LinExpr {
    terms: Vec<(VarId, Rational)>,
    constant: Rational,
}

impl LinExpr {
    /// The zero expression.
    pub fn zero() -> Self {
        Self::default()
    }

    /// A constant expression.
    pub fn constant(value: Rational) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    /// A single variable with coefficient one.
    pub fn var(var: VarId) -> Self {
        Self::term(var, Rational::ONE)
    }

    /// A single weighted variable.
    pub fn term(var: VarId, coefficient: Rational) -> Self {
        Self {
            terms: vec![(var, coefficient)],
            constant: Rational::ZERO,
        }
    }

    /// Adds a weighted variable.
    pub fn plus_term(mut self, var: VarId, coefficient: Rational) -> Self {
        self.terms.push((var, coefficient));
        self
    }

    /// Adds a constant.
    pub fn plus_const(mut self, value: Rational) -> Self {
        self.constant = self.constant + value;
        self
    }

    /// Variable terms (may contain repeated variables until simplified).
    pub fn terms(&self) -> &[(VarId, Rational)] {
        &self.terms
    }

    /// Constant part.
    pub fn constant_part(&self) -> Rational {
        self.constant
    }

    /// Merges repeated variables and drops zero coefficients.
    pub fn simplified(&self) -> Self {
        let mut terms: Vec<(VarId, Rational)> = Vec::with_capacity(self.terms.len());
        let mut sorted = self.terms.clone();
        sorted.sort_by_key(|(v, _)| *v);
        for (var, coefficient) in sorted {
            match terms.last_mut() {
                Some((last, acc)) if *last == var => *acc = *acc + coefficient,
                _ => terms.push((var, coefficient)),
            }
        }
        terms.retain(|(_, c)| !c.is_zero());
        Self {
            terms,
            constant: self.constant,
        }
    }

    /// Returns true if the expression has no variable terms.
    pub fn is_constant(&self) -> bool {
        self.terms.iter().all(|(_, c)| c.is_zero())
    }

    /// Evaluates under an assignment; `None` if a variable is unassigned.
    pub fn evaluate(&self, value: &dyn Fn(VarId) -> Option<f64>) -> Option<f64> {
        self.terms
            .iter()
            .try_fold(self.constant.as_f64(), |acc, (v, c)| {
                value(*v).map(|x| acc + c.as_f64() * x)
            })
    }
}

impl From<VarId> for LinExpr {
    fn from(var: VarId) -> Self {
        LinExpr::var(var)
    }
}

impl From<Rational> for LinExpr {
    fn from(value: Rational) -> Self {
        LinExpr::constant(value)
    }
}

impl Add for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: LinExpr) -> LinExpr {
        self.terms.extend(rhs.terms);
        self.constant = self.constant + rhs.constant;
        self
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;

    fn neg(self) -> LinExpr {
        self * Rational::from_integer(-1)
    }
}

impl Sub for LinExpr {
    type Output = LinExpr;

    fn sub(self, rhs: LinExpr) -> LinExpr {
        self + (-rhs)
    }
}

impl Mul<Rational> for LinExpr {
    type Output = LinExpr;

    fn mul(self, rhs: Rational) -> LinExpr {
        LinExpr {
            terms: self.terms.into_iter().map(|(v, c)| (v, c * rhs)).collect(),
            constant: self.constant * rhs,
        }
    }
}

/// Comparison of an expression against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `< 0`
    Lt,
    /// `<= 0`
    Le,
    /// `= 0`
    Eq,
    /// `>= 0`
    Ge,
    /// `> 0`
    Gt,
}

impl Relation {
    /// Evaluates the relation on a number.
    pub fn holds(self, value: f64) -> bool {
        match self {
            Relation::Lt => value < 0.0,
            Relation::Le => value <= 0.0,
            Relation::Eq => value == 0.0,
            Relation::Ge => value >= 0.0,
            Relation::Gt => value > 0.0,
        }
    }

    /// Returns true for `<` and `>`.
    pub fn is_strict(self) -> bool {
        matches!(self, Relation::Lt | Relation::Gt)
    }

    /// SMT-LIB operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Relation::Lt => "<",
            Relation::Le => "<=",
            Relation::Eq => "=",
            Relation::Ge => ">=",
            Relation::Gt => ">",
        }
    }
}

/// A quantifier-free formula over linear real arithmetic and booleans.
#[derive(Debug, Clone)]
pub enum Formula {
    /// Constant truth value.
    Const(bool),
    /// `expr ⋈ 0`.
    Atom(LinExpr, Relation),
    /// Boolean variable.
    Bool(VarId),
    /// Negation.
    Not(Box<Formula>),
    /// Conjunction.
    And(Vec<Formula>),
    /// Disjunction.
    Or(Vec<Formula>),
    /// Implication.
    Implies(Box<Formula>, Box<Formula>),
}

impl Formula {
    /// `lhs ⋈ rhs`, folded to a constant when no variables remain.
    pub fn compare(lhs: LinExpr, relation: Relation, rhs: LinExpr) -> Self {
        let expr = (lhs - rhs).simplified();
        if expr.is_constant() {
            Formula::Const(relation.holds(expr.constant_part().as_f64()))
        } else {
            Formula::Atom(expr, relation)
        }
    }

    /// `lhs < rhs`
    pub fn lt(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Self {
        Self::compare(lhs.into(), Relation::Lt, rhs.into())
    }

    /// `lhs <= rhs`
    pub fn le(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Self {
        Self::compare(lhs.into(), Relation::Le, rhs.into())
    }

    /// `lhs = rhs`
    pub fn eq(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Self {
        Self::compare(lhs.into(), Relation::Eq, rhs.into())
    }

    /// `lhs >= rhs`
    pub fn ge(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Self {
        Self::compare(lhs.into(), Relation::Ge, rhs.into())
    }

    /// `lhs > rhs`
    pub fn gt(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Self {
        Self::compare(lhs.into(), Relation::Gt, rhs.into())
    }

    /// Flattened conjunction.
    pub fn all(parts: impl IntoIterator<Item = Formula>) -> Self {
        let mut out = Vec::new();
        for part in parts {
            match part {
                Formula::Const(true) => {}
                Formula::Const(false) => return Formula::Const(false),
                Formula::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::Const(true),
            1 => out.pop().unwrap_or(Formula::Const(true)),
            _ => Formula::And(out),
        }
    }

    /// Flattened disjunction.
    pub fn any(parts: impl IntoIterator<Item = Formula>) -> Self {
        let mut out = Vec::new();
        for part in parts {
            match part {
                Formula::Const(false) => {}
                Formula::Const(true) => return Formula::Const(true),
                Formula::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::Const(false),
            1 => out.pop().unwrap_or(Formula::Const(false)),
            _ => Formula::Or(out),
        }
    }

    /// Negation.
    pub fn negate(formula: Formula) -> Self {
        match formula {
            Formula::Const(b) => Formula::Const(!b),
            Formula::Not(inner) => *inner,
            other => Formula::Not(Box::new(other)),
        }
    }

    /// Implication `premise ⇒ conclusion`.
    pub fn implies(premise: Formula, conclusion: Formula) -> Self {
        match (&premise, &conclusion) {
            (Formula::Const(false), _) | (_, Formula::Const(true)) => Formula::Const(true),
            (Formula::Const(true), _) => conclusion,
            _ => Formula::Implies(Box::new(premise), Box::new(conclusion)),
        }
    }

    /// Negation normal form: only constants, atoms, literals, `And` and `Or`.
    pub fn to_nnf(&self) -> Formula {
        self.nnf(true)
    }

    fn nnf(&self, positive: bool) -> Formula {
        match self {
            Formula::Const(b) => Formula::Const(*b == positive),
            Formula::Atom(expr, relation) => {
                if positive {
                    Formula::Atom(expr.clone(), *relation)
                } else {
                    match relation {
                        Relation::Lt => Formula::Atom(expr.clone(), Relation::Ge),
                        Relation::Le => Formula::Atom(expr.clone(), Relation::Gt),
                        Relation::Ge => Formula::Atom(expr.clone(), Relation::Lt),
                        Relation::Gt => Formula::Atom(expr.clone(), Relation::Le),
                        Relation::Eq => Formula::Or(vec![
                            Formula::Atom(expr.clone(), Relation::Lt),
                            Formula::Atom(expr.clone(), Relation::Gt),
                        ]),
                    }
                }
            }
            Formula::Bool(v) => {
                if positive {
                    Formula::Bool(*v)
                } else {
                    Formula::Not(Box::new(Formula::Bool(*v)))
                }
            }
            Formula::Not(inner) => inner.nnf(!positive),
            Formula::And(parts) => {
                let mapped = parts.iter().map(|p| p.nnf(positive));
                if positive {
                    Formula::all(mapped)
                } else {
                    Formula::any(mapped)
                }
            }
            Formula::Or(parts) => {
                let mapped = parts.iter().map(|p| p.nnf(positive));
                if positive {
                    Formula::any(mapped)
                } else {
                    Formula::all(mapped)
                }
            }
            Formula::Implies(premise, conclusion) => {
                if positive {
                    Formula::any([premise.nnf(false), conclusion.nnf(true)])
                } else {
                    Formula::all([premise.nnf(true), conclusion.nnf(false)])
                }
            }
        }
    }

    /// Number of arithmetic atoms and boolean literals.
    pub fn size(&self) -> usize {
        match self {
            Formula::Const(_) => 0,
            Formula::Atom(..) | Formula::Bool(_) => 1,
            Formula::Not(inner) => inner.size(),
            Formula::And(parts) | Formula::Or(parts) => parts.iter().map(Formula::size).sum(),
            Formula::Implies(a, b) => a.size() + b.size(),
        }
    }

    /// Evaluates under a numeric assignment (booleans as 0/1).
    ///
    /// Returns `None` if a variable is unassigned.
    pub fn evaluate(&self, value: &dyn Fn(VarId) -> Option<f64>) -> Option<bool> {
        match self {
            Formula::Const(b) => Some(*b),
            Formula::Atom(expr, relation) => expr.evaluate(value).map(|v| relation.holds(v)),
            Formula::Bool(v) => value(*v).map(|x| x > 0.5),
            Formula::Not(inner) => inner.evaluate(value).map(|b| !b),
            Formula::And(parts) => {
                for part in parts {
                    if !part.evaluate(value)? {
                        return Some(false);
                    }
                }
                Some(true)
            }
            Formula::Or(parts) => {
                for part in parts {
                    if part.evaluate(value)? {
                        return Some(true);
                    }
                }
                Some(false)
            }
            Formula::Implies(a, b) => {
                if a.evaluate(value)? {
                    b.evaluate(value)
                } else {
                    Some(true)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i64) -> Rational {
        Rational::from_integer(n)
    }

    #[test]
    fn test_simplified_merges_terms() {
        let x = VarId(0);
        let y = VarId(1);
        let e = LinExpr::term(x, r(2))
            .plus_term(y, r(3))
            .plus_term(x, r(-2))
            .plus_const(r(5))
            .simplified();
        assert_eq!(e.terms().len(), 1);
        assert_eq!(e.terms()[0].0, y);
        assert_eq!(e.constant_part(), r(5));
    }

    #[test]
    fn test_compare_folds_constants() {
        let f = Formula::lt(LinExpr::constant(r(1)), LinExpr::constant(r(2)));
        assert!(matches!(f, Formula::Const(true)));

        let x = VarId(0);
        let f = Formula::lt(LinExpr::var(x) - LinExpr::var(x), LinExpr::constant(r(0)));
        assert!(matches!(f, Formula::Const(false)));
    }

    #[test]
    fn test_all_any_flatten() {
        let x = VarId(0);
        let a = Formula::gt(x, r(0));
        let b = Formula::lt(x, r(10));
        let f = Formula::all([a.clone(), Formula::all([b.clone(), Formula::Const(true)])]);
        assert!(matches!(&f, Formula::And(parts) if parts.len() == 2));

        let g = Formula::any([a, Formula::Const(true)]);
        assert!(matches!(g, Formula::Const(true)));

        assert!(matches!(Formula::any(Vec::new()), Formula::Const(false)));
        assert!(matches!(Formula::all(Vec::new()), Formula::Const(true)));
    }

    #[test]
    fn test_nnf_pushes_negation() {
        let x = VarId(0);
        let b = VarId(1);
        let f = Formula::negate(Formula::all([Formula::lt(x, r(3)), Formula::Bool(b)]));
        let nnf = f.to_nnf();
        match nnf {
            Formula::Or(parts) => {
                assert!(matches!(parts[0], Formula::Atom(_, Relation::Ge)));
                assert!(matches!(&parts[1], Formula::Not(inner) if matches!(**inner, Formula::Bool(_))));
            }
            other => panic!("unexpected nnf {:?}", other),
        }
    }

    #[test]
    fn test_nnf_preserves_truth() {
        let x = VarId(0);
        let b = VarId(1);
        let f = Formula::negate(Formula::implies(
            Formula::Bool(b),
            Formula::eq(x, r(2)),
        ));
        let nnf = f.to_nnf();
        for (xv, bv) in [(2.0, 1.0), (2.0, 0.0), (3.0, 1.0), (3.0, 0.0)] {
            let assign = move |v: VarId| Some(if v.index() == 0 { xv } else { bv });
            assert_eq!(f.evaluate(&assign), nnf.evaluate(&assign));
        }
    }

    #[test]
    fn test_size_counts_atoms() {
        let x = VarId(0);
        let f = Formula::any([Formula::lt(x, r(0)), Formula::gt(x, r(5))]);
        assert_eq!(f.size(), 2);
    }

    #[test]
    fn test_evaluate_unassigned() {
        let f = Formula::gt(VarId(3), r(0));
        assert_eq!(f.evaluate(&|_| None), None);
    }
}
