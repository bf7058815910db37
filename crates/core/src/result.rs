//! Arrangement result representation.

use crate::rational::Rational;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Why a batch attempt (or a whole round) did not produce a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FailureKind {
    /// The solver ran out of time or gave up.
    SolverTimeout,
    /// The formula was unsatisfiable.
    SolverUnsat,
    /// Models kept failing exact verification after refinement.
    GeometryVerificationFailure,
    /// The first object cannot be placed even alone on an empty plate.
    HardFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SolverTimeout => write!(f, "SolverTimeout"),
            Self::SolverUnsat => write!(f, "SolverUnsat"),
            Self::GeometryVerificationFailure => write!(f, "GeometryVerificationFailure"),
            Self::HardFailure => write!(f, "HardFailure"),
        }
    }
}

/// Decision values of all objects of a round, indexed by object.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecisionValues {
    /// X translation.
    pub x: Vec<Rational>,
    /// Y translation.
    pub y: Vec<Rational>,
    /// Print time.
    pub t: Vec<Rational>,
}

impl DecisionValues {
    /// Zero-initialised values for `n` objects.
    pub fn new(n: usize) -> Self {
        Self {
            x: vec![Rational::ZERO; n],
            y: vec![Rational::ZERO; n],
            t: vec![Rational::ZERO; n],
        }
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if there are no objects.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Position of object `i`.
    pub fn position(&self, i: usize) -> (Rational, Rational) {
        (self.x[i], self.y[i])
    }
}

/// Counters collected while solving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolveStatistics {
    /// Satisfiability checks issued.
    pub feasibility_queries: usize,
    /// Checks answered sat.
    pub sat: usize,
    /// Checks answered unsat.
    pub unsat: usize,
    /// Checks answered unknown.
    pub timeouts: usize,
    /// Refinement rounds.
    pub refinements: usize,
    /// Refinement clauses added.
    pub refinement_clauses: usize,
    /// Queries abandoned because verification kept failing.
    pub verification_failures: usize,
    /// Batches committed.
    pub batches: usize,
}

impl SolveStatistics {
    /// Adds another set of counters.
    pub fn merge(&mut self, other: &SolveStatistics) {
        self.feasibility_queries += other.feasibility_queries;
        self.sat += other.sat;
        self.unsat += other.unsat;
        self.timeouts += other.timeouts;
        self.refinements += other.refinements;
        self.refinement_clauses += other.refinement_clauses;
        self.verification_failures += other.verification_failures;
        self.batches += other.batches;
    }
}

/// Outcome of one arrangement round.
///
/// Indices refer to the polygon slice given to the optimizer. Values of
/// objects outside `decided` are meaningless.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArrangementResult {
    /// Decision values, one entry per input polygon.
    pub values: DecisionValues,
    /// Objects placed in this round, in decision order.
    pub decided: Vec<usize>,
    /// Objects left for a later round.
    pub remaining: Vec<usize>,
    /// False only on hard failure.
    pub success: bool,
    /// Reason of the last failed attempt, if any.
    pub failure: Option<FailureKind>,
    /// Solver counters.
    pub statistics: SolveStatistics,
    /// Computation time in milliseconds.
    pub computation_time_ms: u64,
}

impl ArrangementResult {
    /// Creates an empty, successful result for `n` objects.
    pub fn new(n: usize) -> Self {
        Self {
            values: DecisionValues::new(n),
            success: true,
            ..Default::default()
        }
    }

    /// Returns true if every requested object was decided.
    pub fn all_decided(&self) -> bool {
        self.success && self.remaining.is_empty()
    }

    /// Decided objects sorted by print time.
    pub fn print_order(&self) -> Vec<usize> {
        let mut order = self.decided.clone();
        order.sort_by(|&a, &b| {
            self.values.t[a]
                .partial_cmp(&self.values.t[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
    }

    /// Position of a decided object as floats.
    pub fn position_f64(&self, i: usize) -> (f64, f64) {
        (self.values.x[i].as_f64(), self.values.y[i].as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_result() {
        let result = ArrangementResult::new(3);
        assert!(result.success);
        assert_eq!(result.values.len(), 3);
        assert!(result.all_decided());
    }

    #[test]
    fn test_print_order() {
        let mut result = ArrangementResult::new(3);
        result.decided = vec![0, 1, 2];
        result.values.t = vec![
            Rational::from_integer(64),
            Rational::from_integer(32),
            Rational::from_integer(96),
        ];
        assert_eq!(result.print_order(), vec![1, 0, 2]);
    }

    #[test]
    fn test_statistics_merge() {
        let mut a = SolveStatistics {
            feasibility_queries: 2,
            sat: 1,
            ..Default::default()
        };
        let b = SolveStatistics {
            feasibility_queries: 3,
            unsat: 3,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.feasibility_queries, 5);
        assert_eq!(a.sat, 1);
        assert_eq!(a.unsat, 3);
    }

    #[test]
    fn test_failure_display() {
        assert_eq!(FailureKind::HardFailure.to_string(), "HardFailure");
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_result_serde() {
        let mut result = ArrangementResult::new(2);
        result.decided = vec![1];
        result.remaining = vec![0];
        result.values.x[1] = Rational::new(5, 2);
        result.failure = Some(FailureKind::SolverTimeout);

        let json = serde_json::to_string(&result).unwrap();
        let back: ArrangementResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.decided, vec![1]);
        assert_eq!(back.remaining, vec![0]);
        assert_eq!(back.values.x[1], Rational::new(5, 2));
        assert_eq!(back.failure, Some(FailureKind::SolverTimeout));
    }
}
