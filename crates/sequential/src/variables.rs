//! Decision variable registry.
//!
//! Every object of a batch owns three decision values: its X and Y
//! translation and its print time T. Objects decided in earlier batches keep
//! their values as constants, so builders see either a solver variable or a
//! number through [`Decision`].

use seqarrange_core::{Formula, LinExpr, Rational, Result, SolverSession, VarId};
use std::collections::HashMap;

/// Decision axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// X translation.
    X,
    /// Y translation.
    Y,
    /// Print time.
    T,
}

impl Axis {
    fn prefix(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::T => "T",
        }
    }
}

/// Variable name of an object's decision on one axis.
pub fn variable_name(axis: Axis, object: usize) -> String {
    format!("{}_{}", axis.prefix(), object)
}

/// Variable name of the ordering flag of an unordered pair.
pub fn ordering_name(i: usize, j: usize) -> String {
    format!("O_{}_{}", i.min(j), i.max(j))
}

/// A decision seen by constraint builders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Free solver variable.
    Free(VarId),
    /// Value fixed by an earlier batch.
    Fixed(Rational),
}

impl Decision {
    /// Linear expression of the decision.
    pub fn expr(&self) -> LinExpr {
        match *self {
            Decision::Free(var) => LinExpr::var(var),
            Decision::Fixed(value) => LinExpr::constant(value),
        }
    }

    /// Returns true for a free variable.
    pub fn is_free(&self) -> bool {
        matches!(self, Decision::Free(_))
    }

    /// Solver variable, if free.
    pub fn var(&self) -> Option<VarId> {
        match *self {
            Decision::Free(var) => Some(var),
            Decision::Fixed(_) => None,
        }
    }
}

/// Closed range of a declared decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    /// Lower bound.
    pub lower: Rational,
    /// Upper bound.
    pub upper: Rational,
}

impl Range {
    /// Creates a range.
    pub fn new(lower: Rational, upper: Rational) -> Self {
        Self { lower, upper }
    }

    /// Creates a range with integer bounds.
    pub fn integers(lower: i64, upper: i64) -> Self {
        Self::new(Rational::from_integer(lower), Rational::from_integer(upper))
    }
}

/// Ranges of a free object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectRanges {
    /// X translation.
    pub x: Range,
    /// Y translation.
    pub y: Range,
    /// Print time, absent for arrangements without ordering.
    pub t: Option<Range>,
}

#[derive(Debug, Clone, Copy)]
struct ObjectDecisions {
    x: Decision,
    y: Decision,
    t: Option<Decision>,
}

/// Decisions of one session, keyed by object index.
#[derive(Debug, Clone, Default)]
pub struct DecisionVariables {
    objects: HashMap<usize, ObjectDecisions>,
    orderings: HashMap<(usize, usize), VarId>,
}

impl DecisionVariables {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the variables of a free object.
    pub fn declare_object<S: SolverSession>(
        &mut self,
        session: &mut S,
        object: usize,
        ranges: ObjectRanges,
    ) -> Result<()> {
        let x = session.declare_real(&variable_name(Axis::X, object), ranges.x.lower, ranges.x.upper)?;
        let y = session.declare_real(&variable_name(Axis::Y, object), ranges.y.lower, ranges.y.upper)?;
        let t = match ranges.t {
            Some(range) => Some(Decision::Free(session.declare_real(
                &variable_name(Axis::T, object),
                range.lower,
                range.upper,
            )?)),
            None => None,
        };
        self.objects.insert(
            object,
            ObjectDecisions {
                x: Decision::Free(x),
                y: Decision::Free(y),
                t,
            },
        );
        Ok(())
    }

    /// Registers an object whose values are already decided.
    pub fn fix_object(&mut self, object: usize, x: Rational, y: Rational, t: Option<Rational>) {
        self.objects.insert(
            object,
            ObjectDecisions {
                x: Decision::Fixed(x),
                y: Decision::Fixed(y),
                t: t.map(Decision::Fixed),
            },
        );
    }

    /// Returns true if the object is registered.
    pub fn contains(&self, object: usize) -> bool {
        self.objects.contains_key(&object)
    }

    /// Returns true if the object has free variables.
    pub fn is_free(&self, object: usize) -> bool {
        self.objects
            .get(&object)
            .map(|o| o.x.is_free())
            .unwrap_or(false)
    }

    /// Decision of an object on one axis.
    pub fn decision(&self, object: usize, axis: Axis) -> Option<Decision> {
        let o = self.objects.get(&object)?;
        match axis {
            Axis::X => Some(o.x),
            Axis::Y => Some(o.y),
            Axis::T => o.t,
        }
    }

    /// Free variable of an object on one axis.
    pub fn variable(&self, object: usize, axis: Axis) -> Option<VarId> {
        self.decision(object, axis).and_then(|d| d.var())
    }

    /// Translation decisions of an object, fixed at zero when unknown.
    pub fn position(&self, object: usize) -> (Decision, Decision) {
        match self.objects.get(&object) {
            Some(o) => (o.x, o.y),
            None => (Decision::Fixed(Rational::ZERO), Decision::Fixed(Rational::ZERO)),
        }
    }

    /// Print time expression, if the object has one.
    pub fn time(&self, object: usize) -> Option<LinExpr> {
        self.decision(object, Axis::T).map(|d| d.expr())
    }

    /// Formula stating that `earlier` is printed before `later` (`T < T`).
    pub fn printed_before(&self, earlier: usize, later: usize) -> Formula {
        match (self.time(earlier), self.time(later)) {
            (Some(a), Some(b)) => Formula::lt(a, b),
            _ => Formula::Const(true),
        }
    }

    /// Ordering flag of a pair, declared and linked to the print times on
    /// first use. The returned literal is true when `earlier` comes first.
    pub fn ordering<S: SolverSession>(
        &mut self,
        session: &mut S,
        earlier: usize,
        later: usize,
    ) -> Result<Formula> {
        let key = (earlier.min(later), earlier.max(later));
        let var = match self.orderings.get(&key) {
            Some(var) => *var,
            None => {
                let var = session.declare_bool(&ordering_name(key.0, key.1))?;
                let (lo, hi) = key;
                let lo_first = self.printed_before(lo, hi);
                let hi_not_after = match (self.time(lo), self.time(hi)) {
                    (Some(a), Some(b)) => Formula::le(b, a),
                    _ => Formula::Const(true),
                };
                session.assert(Formula::implies(Formula::Bool(var), lo_first));
                session.assert(Formula::implies(
                    Formula::negate(Formula::Bool(var)),
                    hi_not_after,
                ));
                self.orderings.insert(key, var);
                var
            }
        };
        let literal = Formula::Bool(var);
        Ok(if earlier < later {
            literal
        } else {
            Formula::negate(literal)
        })
    }

    /// Registered objects, in ascending order.
    pub fn objects(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.objects.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of ordering flags declared.
    pub fn ordering_count(&self) -> usize {
        self.orderings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSession;

    fn ranges() -> ObjectRanges {
        ObjectRanges {
            x: Range::integers(0, 10),
            y: Range::integers(0, 10),
            t: Some(Range::integers(0, 100)),
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(variable_name(Axis::X, 3), "X_3");
        assert_eq!(variable_name(Axis::T, 12), "T_12");
        assert_eq!(ordering_name(5, 2), "O_2_5");
    }

    #[test]
    fn test_declare_object() {
        let mut session = RecordingSession::default();
        let mut vars = DecisionVariables::new();
        vars.declare_object(&mut session, 3, ranges()).unwrap();
        assert!(vars.is_free(3));
        assert_eq!(session.lookup("Y_3"), vars.variable(3, Axis::Y));
        assert!(session.lookup("T_3").is_some());
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut session = RecordingSession::default();
        let mut vars = DecisionVariables::new();
        vars.declare_object(&mut session, 1, ranges()).unwrap();
        assert!(vars.declare_object(&mut session, 1, ranges()).is_err());
    }

    #[test]
    fn test_fixed_object() {
        let mut vars = DecisionVariables::new();
        vars.fix_object(0, Rational::from_integer(4), Rational::from_integer(5), None);
        assert!(!vars.is_free(0));
        assert!(vars.time(0).is_none());
        assert_eq!(
            vars.decision(0, Axis::X),
            Some(Decision::Fixed(Rational::from_integer(4)))
        );
    }

    #[test]
    fn test_ordering_declared_once_and_linked() {
        let mut session = RecordingSession::default();
        let mut vars = DecisionVariables::new();
        vars.declare_object(&mut session, 0, ranges()).unwrap();
        vars.declare_object(&mut session, 1, ranges()).unwrap();

        let forward = vars.ordering(&mut session, 0, 1).unwrap();
        let backward = vars.ordering(&mut session, 1, 0).unwrap();
        assert_eq!(vars.ordering_count(), 1);
        assert_eq!(session.assertion_count(), 2);
        assert!(matches!(forward, Formula::Bool(_)));
        assert!(matches!(backward, Formula::Not(_)));

        let t0 = vars.variable(0, Axis::T).unwrap();
        let t1 = vars.variable(1, Axis::T).unwrap();
        let o = session.lookup("O_0_1").unwrap();
        let assignment = |v: VarId| {
            if v == t0 {
                Some(10.0)
            } else if v == t1 {
                Some(30.0)
            } else if v == o {
                Some(1.0)
            } else {
                None
            }
        };
        for formula in session.assertions() {
            assert_eq!(formula.evaluate(&assignment), Some(true));
        }
        assert_eq!(forward.evaluate(&assignment), Some(true));
        assert_eq!(backward.evaluate(&assignment), Some(false));
    }
}
