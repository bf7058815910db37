//! Print-time constraints.
//!
//! When object `i` is printed before object `j`, the print head sweeping over
//! `j` must stay clear of `i`, so `j`'s unreachable zones may not meet `i`'s
//! footprint. Such constraints only apply under the ordering premise, which
//! is encoded in one of two ways:
//!
//! - implicit: the premise atom `T_i < T_j` is negated into the disjunction,
//! - explicit: a boolean `O_i_j`, linked to the print times once per pair,
//!   guards the constraint by implication.
//!
//! In consequential arrangements objects may also be absent from a batch
//! (print time below the absence threshold). Every pairwise constraint then
//! additionally requires both objects to be present.

use crate::constraints::{line_non_intersection, Placed};
use crate::variables::DecisionVariables;
use seqarrange_core::{Formula, LineEncoding, LinExpr, Rational, Result, SolverConfiguration, SolverSession};

/// Kind of arrangement being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sequencing {
    /// Placement only; no print times.
    Unordered,
    /// Objects printed one after another, all present.
    #[default]
    Sequential,
    /// Like sequential, but objects of a window may be left out.
    Consequential,
}

impl Sequencing {
    /// Returns true if objects carry print times.
    pub fn has_time(self) -> bool {
        !matches!(self, Sequencing::Unordered)
    }
}

/// How guards of a session are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardPolicy {
    /// Kind of arrangement.
    pub sequencing: Sequencing,
    /// Encoding of ordering premises.
    pub encoding: LineEncoding,
    /// Print times at or above this mark an object present.
    pub presence_threshold: i64,
}

impl GuardPolicy {
    /// Policy from a configuration.
    pub fn new(sequencing: Sequencing, encoding: LineEncoding, config: &SolverConfiguration) -> Self {
        Self {
            sequencing,
            encoding,
            presence_threshold: config.temporal_presence_threshold,
        }
    }
}

/// Premises under which a pairwise constraint applies.
#[derive(Debug, Clone, Default)]
pub struct OrderGuard {
    premises: Vec<Formula>,
}

impl OrderGuard {
    /// Unconditional guard.
    pub fn always() -> Self {
        Self::default()
    }

    /// Guard on an ordering premise.
    pub fn before(premise: Formula) -> Self {
        Self {
            premises: vec![premise],
        }
    }

    /// Adds a presence premise.
    pub fn with_presence(mut self, presence: Formula) -> Self {
        self.premises.push(presence);
        self
    }

    /// Applies the guard to a constraint.
    pub fn guard(&self, body: Formula, encoding: LineEncoding) -> Formula {
        match encoding {
            LineEncoding::Implicit => Formula::any(
                self.premises
                    .iter()
                    .cloned()
                    .map(Formula::negate)
                    .chain(std::iter::once(body)),
            ),
            LineEncoding::Explicit => Formula::implies(Formula::all(self.premises.iter().cloned()), body),
        }
    }
}

/// `T ≥ presence_threshold`, or true when the object has no time.
pub fn presence(vars: &DecisionVariables, object: usize, threshold: i64) -> Formula {
    match vars.time(object) {
        Some(t) => Formula::ge(t, Rational::from_integer(threshold)),
        None => Formula::Const(true),
    }
}

/// Builds the guard of "`earlier` printed before `later`".
pub fn ordered_guard<S: SolverSession>(
    session: &mut S,
    vars: &mut DecisionVariables,
    policy: &GuardPolicy,
    earlier: usize,
    later: usize,
) -> Result<OrderGuard> {
    let premise = match policy.sequencing {
        Sequencing::Unordered => return Ok(OrderGuard::always()),
        Sequencing::Sequential | Sequencing::Consequential => match policy.encoding {
            LineEncoding::Implicit => vars.printed_before(earlier, later),
            LineEncoding::Explicit => {
                if vars.is_free(earlier) || vars.is_free(later) {
                    vars.ordering(session, earlier, later)?
                } else {
                    vars.printed_before(earlier, later)
                }
            }
        },
    };
    let mut guard = OrderGuard::before(premise);
    if policy.sequencing == Sequencing::Consequential {
        guard = guard
            .with_presence(presence(vars, earlier, policy.presence_threshold))
            .with_presence(presence(vars, later, policy.presence_threshold));
    }
    Ok(guard)
}

/// Guard requiring only presence of both objects.
pub fn presence_guard(vars: &DecisionVariables, policy: &GuardPolicy, a: usize, b: usize) -> OrderGuard {
    match policy.sequencing {
        Sequencing::Consequential => OrderGuard::always()
            .with_presence(presence(vars, a, policy.presence_threshold))
            .with_presence(presence(vars, b, policy.presence_threshold)),
        _ => OrderGuard::always(),
    }
}

/// `T_i + spread < T_j ∨ T_j + spread < T_i`.
pub fn temporal_separation(ti: LinExpr, tj: LinExpr, spread: i64) -> Formula {
    let spread = Rational::from_integer(spread);
    Formula::any([
        Formula::lt(ti.clone().plus_const(spread), tj.clone()),
        Formula::lt(tj.plus_const(spread), ti),
    ])
}

fn separation_of(vars: &DecisionVariables, i: usize, j: usize, spread: i64) -> Formula {
    match (vars.time(i), vars.time(j)) {
        (Some(ti), Some(tj)) => temporal_separation(ti, tj, spread),
        _ => Formula::Const(true),
    }
}

/// Pairwise separation of the print times of `objects`.
pub fn introduce_temporal_ordering<S: SolverSession>(
    session: &mut S,
    vars: &DecisionVariables,
    objects: &[usize],
    spread: i64,
) {
    for (k, &i) in objects.iter().enumerate() {
        for &j in &objects[k + 1..] {
            session.assert(separation_of(vars, i, j, spread));
        }
    }
}

/// Separation of free print times from already decided ones.
pub fn introduce_sequential_temporal_ordering_against_fixed<S: SolverSession>(
    session: &mut S,
    vars: &DecisionVariables,
    free: &[usize],
    fixed: &[usize],
    spread: i64,
) {
    for &i in free {
        for &j in fixed {
            session.assert(separation_of(vars, i, j, spread));
        }
    }
}

/// Pairwise separation among present objects of a window.
pub fn introduce_consequential_temporal_ordering<S: SolverSession>(
    session: &mut S,
    vars: &DecisionVariables,
    objects: &[usize],
    config: &SolverConfiguration,
) {
    let policy = GuardPolicy::new(Sequencing::Consequential, LineEncoding::Implicit, config);
    for (k, &i) in objects.iter().enumerate() {
        for &j in &objects[k + 1..] {
            let guard = presence_guard(vars, &policy, i, j);
            session.assert(guard.guard(
                separation_of(vars, i, j, config.temporal_spread),
                LineEncoding::Implicit,
            ));
        }
    }
}

/// Separation of present window objects from already decided ones.
pub fn introduce_consequential_temporal_ordering_against_fixed<S: SolverSession>(
    session: &mut S,
    vars: &DecisionVariables,
    free: &[usize],
    fixed: &[usize],
    config: &SolverConfiguration,
) {
    for &i in free {
        let present = presence(vars, i, config.temporal_presence_threshold);
        for &j in fixed {
            session.assert(Formula::implies(
                present.clone(),
                separation_of(vars, i, j, config.temporal_spread),
            ));
        }
    }
}

/// Presence assumptions of a consequential batch.
pub fn assume_consequential_object_presence(
    vars: &DecisionVariables,
    present: &[usize],
    missing: &[usize],
    config: &SolverConfiguration,
) -> Vec<Formula> {
    let mut assumptions = Vec::with_capacity(present.len() + missing.len());
    for &i in present {
        assumptions.push(presence(vars, i, config.temporal_presence_threshold));
    }
    for &i in missing {
        if let Some(t) = vars.time(i) {
            assumptions.push(Formula::le(
                t,
                Rational::from_integer(config.temporal_absence_threshold),
            ));
        }
    }
    assumptions
}

/// A placed shape that belongs to an object.
#[derive(Debug, Clone, Copy)]
pub struct ObjectShape<'a> {
    /// Owning object.
    pub object: usize,
    /// Placed polygon.
    pub placed: Placed<'a>,
}

impl<'a> ObjectShape<'a> {
    /// Creates a shape.
    pub fn new(object: usize, placed: Placed<'a>) -> Self {
        Self { object, placed }
    }
}

/// Edge `edge_f` of the earlier object's footprint does not meet edge
/// `edge_z` of the later object's zone, provided `earlier` is printed first.
#[allow(clippy::too_many_arguments)]
pub fn introduce_sequential_line_non_intersection<S: SolverSession>(
    session: &mut S,
    vars: &mut DecisionVariables,
    encoding: LineEncoding,
    footprint: &ObjectShape<'_>,
    edge_f: usize,
    zone: &ObjectShape<'_>,
    edge_z: usize,
    config: &SolverConfiguration,
) -> Result<()> {
    let policy = GuardPolicy::new(Sequencing::Sequential, encoding, config);
    introduce_guarded_line(session, vars, &policy, footprint, edge_f, zone, edge_z, config)
}

/// Consequential counterpart of [`introduce_sequential_line_non_intersection`]:
/// the clause only binds when both objects are present.
#[allow(clippy::too_many_arguments)]
pub fn introduce_consequential_line_non_intersection<S: SolverSession>(
    session: &mut S,
    vars: &mut DecisionVariables,
    encoding: LineEncoding,
    footprint: &ObjectShape<'_>,
    edge_f: usize,
    zone: &ObjectShape<'_>,
    edge_z: usize,
    config: &SolverConfiguration,
) -> Result<()> {
    let policy = GuardPolicy::new(Sequencing::Consequential, encoding, config);
    introduce_guarded_line(session, vars, &policy, footprint, edge_f, zone, edge_z, config)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn introduce_guarded_line<S: SolverSession>(
    session: &mut S,
    vars: &mut DecisionVariables,
    policy: &GuardPolicy,
    footprint: &ObjectShape<'_>,
    edge_f: usize,
    zone: &ObjectShape<'_>,
    edge_z: usize,
    config: &SolverConfiguration,
) -> Result<()> {
    let body = line_non_intersection(
        &footprint.placed,
        edge_f,
        &zone.placed,
        edge_z,
        config.intersection_repulsion,
    );
    let guard = ordered_guard(session, vars, policy, footprint.object, zone.object)?;
    session.assert(guard.guard(body, policy.encoding));
    Ok(())
}
