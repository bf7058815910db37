//! Counterexample-guided refinement.
//!
//! Each violation found by verification names the shapes and edge pairs that
//! met. For every edge pair not refined before, a line non-intersection
//! clause is asserted under the same guard as the weak constraint of the
//! pair. When a violation has vertex containment but no fresh crossing, all
//! remaining edge pairs of the two shapes are added at once.

use crate::constraints::{line_non_intersection, Placed};
use crate::model::ArrangementProblem;
use crate::temporal::{introduce_guarded_line, presence_guard, GuardPolicy, ObjectShape};
use crate::variables::DecisionVariables;
use crate::verify::{ShapeRef, Violation, ViolationKind};
use seqarrange_core::{Result, SolverConfiguration, SolverSession};
use std::collections::HashSet;

type EdgeKey = (ShapeRef, usize, ShapeRef, usize);

/// Tracks refined edge pairs of one session.
#[derive(Debug, Clone, Default)]
pub struct Refiner {
    seen: HashSet<EdgeKey>,
}

impl Refiner {
    /// Creates an empty refiner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clauses added so far.
    pub fn clause_count(&self) -> usize {
        self.seen.len()
    }

    /// Asserts clauses for `violations`; returns how many were new.
    pub fn refine<S: SolverSession>(
        &mut self,
        session: &mut S,
        vars: &mut DecisionVariables,
        config: &SolverConfiguration,
        problem: &ArrangementProblem<'_>,
        policy: &GuardPolicy,
        violations: &[Violation],
    ) -> Result<usize> {
        let mut added = 0;
        for violation in violations {
            if violation.kind == ViolationKind::Bed {
                continue;
            }
            let mut pairs: Vec<(usize, usize)> = violation
                .crossings
                .iter()
                .copied()
                .filter(|&(a, b)| !self.seen.contains(&(violation.first, a, violation.second, b)))
                .collect();
            if pairs.is_empty() && violation.vertex_contained {
                let n = violation.first.polygon(problem).len();
                let m = violation.second.polygon(problem).len();
                pairs = (0..n)
                    .flat_map(|a| (0..m).map(move |b| (a, b)))
                    .filter(|&(a, b)| !self.seen.contains(&(violation.first, a, violation.second, b)))
                    .collect();
            }
            for (a, b) in pairs {
                refine_edge_pair(session, vars, config, problem, policy, violation, a, b)?;
                self.seen.insert((violation.first, a, violation.second, b));
                added += 1;
            }
        }
        if added > 0 {
            log::debug!("refinement added {} line clause(s)", added);
        }
        Ok(added)
    }
}

#[allow(clippy::too_many_arguments)]
fn refine_edge_pair<S: SolverSession>(
    session: &mut S,
    vars: &mut DecisionVariables,
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    policy: &GuardPolicy,
    violation: &Violation,
    edge_first: usize,
    edge_second: usize,
) -> Result<()> {
    let first = shape(vars, problem, violation.first);
    let second = shape(vars, problem, violation.second);
    match violation.kind {
        ViolationKind::Overlap => {
            refine_overlap(session, vars, config, policy, &first, edge_first, &second, edge_second);
            Ok(())
        }
        ViolationKind::Clearance => introduce_guarded_line(
            session,
            vars,
            policy,
            &first,
            edge_first,
            &second,
            edge_second,
            config,
        ),
        ViolationKind::Bed => Ok(()),
    }
}

/// Line clause between two footprints, bound only when both are present.
#[allow(clippy::too_many_arguments)]
pub fn refine_overlap<S: SolverSession>(
    session: &mut S,
    vars: &DecisionVariables,
    config: &SolverConfiguration,
    policy: &GuardPolicy,
    first: &ObjectShape<'_>,
    edge_first: usize,
    second: &ObjectShape<'_>,
    edge_second: usize,
) {
    let body = line_non_intersection(
        &first.placed,
        edge_first,
        &second.placed,
        edge_second,
        config.intersection_repulsion,
    );
    let guard = presence_guard(vars, policy, first.object, second.object);
    session.assert(guard.guard(body, policy.encoding));
}

fn shape<'a>(
    vars: &DecisionVariables,
    problem: &ArrangementProblem<'a>,
    shape: ShapeRef,
) -> ObjectShape<'a> {
    let object = shape.object();
    let (x, y) = vars.position(object);
    ObjectShape::new(object, Placed::new(shape.polygon(problem), x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{build_weak_polygon_nonoverlapping, BatchSpec};
    use crate::temporal::Sequencing;
    use crate::testing::RecordingSession;
    use crate::verify::collect_violations;
    use seqarrange_core::{DecisionValues, LineEncoding, Polygon, Rational};

    #[test]
    fn test_refinement_excludes_cross() {
        let config = SolverConfiguration::default().with_plate_size(100, 100);
        let polygons = vec![Polygon::rectangle(10, 2), Polygon::rectangle(2, 10)];
        let problem = ArrangementProblem::plain(&polygons);
        let empty = DecisionValues::new(2);
        let mut session = RecordingSession::default();
        let mut vars = build_weak_polygon_nonoverlapping(
            &mut session,
            &config,
            &problem,
            &BatchSpec {
                fixed: &[],
                free: &[0, 1],
                values: &empty,
            },
            LineEncoding::Implicit,
        )
        .unwrap();

        for (name, value) in [("X_0", 0.0), ("Y_0", 4.0), ("X_1", 4.0), ("Y_1", 0.0)] {
            session.set_value(name, value);
        }
        assert!(session.model_satisfies(&[]));

        let mut values = DecisionValues::new(2);
        values.x[0] = Rational::from_integer(0);
        values.y[0] = Rational::from_integer(4);
        values.x[1] = Rational::from_integer(4);
        values.y[1] = Rational::from_integer(0);
        let violations = collect_violations(&config, &problem, &values, &[0, 1]);
        let policy = GuardPolicy::new(Sequencing::Unordered, LineEncoding::Implicit, &config);

        let mut refiner = Refiner::new();
        let added = refiner
            .refine(&mut session, &mut vars, &config, &problem, &policy, &violations)
            .unwrap();
        assert_eq!(added, 4);
        assert!(!session.model_satisfies(&[]));

        // Same violations again: nothing new.
        let again = refiner
            .refine(&mut session, &mut vars, &config, &problem, &policy, &violations)
            .unwrap();
        assert_eq!(again, 0);
        assert_eq!(refiner.clause_count(), 4);
    }

    #[test]
    fn test_bed_violations_not_refined() {
        let config = SolverConfiguration::default();
        let polygons = vec![Polygon::rectangle(10, 10)];
        let problem = ArrangementProblem::plain(&polygons);
        let policy = GuardPolicy::new(Sequencing::Unordered, LineEncoding::Implicit, &config);
        let violation = Violation {
            kind: ViolationKind::Bed,
            first: ShapeRef::Footprint(0),
            second: ShapeRef::Footprint(0),
            vertex_contained: false,
            crossings: Vec::new(),
        };
        let mut session = RecordingSession::default();
        let mut vars = DecisionVariables::new();
        let added = Refiner::new()
            .refine(&mut session, &mut vars, &config, &problem, &policy, &[violation])
            .unwrap();
        assert_eq!(added, 0);
    }
}
