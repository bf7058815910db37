//! Batch optimizer.
//!
//! A batch is a handful of objects decided together while all earlier
//! decisions stay fixed. Deciding a batch is a sequence of feasibility
//! queries:
//!
//! 1. the whole plate, which decides whether the batch fits at all,
//! 2. centred boxes of shrinking size, which pull the batch toward the plate
//!    centre and leave room for later batches.
//!
//! Each query is a refinement loop: a model is decoded, verified exactly,
//! and on failure the offending edge pairs are added as clauses before the
//! solver is asked again.

use crate::decoder::{clamp_to_plate, extract_decision_values_from_model};
use crate::model::{
    assume_batch_box, build_weak_polygon_nonoverlapping, centered_box, full_half_extent,
    ArrangementProblem, BatchSpec,
};
use crate::refine::Refiner;
use crate::temporal::{assume_consequential_object_presence, GuardPolicy, Sequencing};
use crate::variables::DecisionVariables;
use crate::verify::collect_violations;
use seqarrange_core::{
    BoxSearch, CheckResult, DecisionValues, FailureKind, Formula, LineEncoding, Result,
    SolveStatistics, SolverBackend, SolverConfiguration, SolverSession,
};

/// Bisection of the half-extent of the centred box.
///
/// The upper end is known to be feasible. Each recorded candidate strictly
/// shrinks `[lo, hi]`, and the search stops once the interval is no wider
/// than the resolution, so it takes `O(log((hi - lo) / resolution))` queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxSearcher {
    lo: i64,
    hi: i64,
    resolution: i64,
    queries: usize,
}

impl BoxSearcher {
    /// Starts a search over `[lo, hi]` with `hi` feasible.
    pub fn new(lo: i64, hi: i64, resolution: i64) -> Self {
        Self {
            lo: lo.max(0),
            hi,
            resolution: resolution.max(1),
            queries: 0,
        }
    }

    /// Next half-extent to try, or `None` when done.
    pub fn next_candidate(&self) -> Option<i64> {
        (self.hi - self.lo > self.resolution).then(|| self.lo + (self.hi - self.lo) / 2)
    }

    /// Records the answer for a candidate.
    pub fn record(&mut self, candidate: i64, feasible: bool) {
        self.queries += 1;
        if feasible {
            self.hi = candidate;
        } else {
            self.lo = candidate + 1;
        }
    }

    /// Smallest half-extent known to be feasible.
    pub fn best(&self) -> i64 {
        self.hi
    }

    /// Probes recorded so far.
    pub fn queries(&self) -> usize {
        self.queries
    }
}

/// Result of one feasibility query or batch.
#[derive(Debug, Clone)]
pub enum BatchVerdict {
    /// Verified decision values (all objects of the round).
    Placed(DecisionValues),
    /// Reason the query failed.
    Failed(FailureKind),
}

impl BatchVerdict {
    /// Returns true for a placement.
    pub fn is_placed(&self) -> bool {
        matches!(self, BatchVerdict::Placed(_))
    }

    /// Failure kind, if any.
    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            BatchVerdict::Placed(_) => None,
            BatchVerdict::Failed(kind) => Some(*kind),
        }
    }
}

/// Verdict of a batch with the statistics it produced.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Verdict.
    pub verdict: BatchVerdict,
    /// Solver counters.
    pub statistics: SolveStatistics,
}

/// Session state of one batch.
struct BatchRun<'a, S: SolverSession> {
    session: S,
    vars: DecisionVariables,
    config: &'a SolverConfiguration,
    problem: ArrangementProblem<'a>,
    policy: GuardPolicy,
    refiner: Refiner,
    statistics: SolveStatistics,
    /// Objects decided in this batch.
    free: Vec<usize>,
    /// Objects checked by verification.
    checked: Vec<usize>,
    values: DecisionValues,
}

impl<'a, S: SolverSession> BatchRun<'a, S> {
    fn open<B: SolverBackend<Session = S>>(
        backend: &B,
        config: &'a SolverConfiguration,
        problem: ArrangementProblem<'a>,
        batch: &BatchSpec<'_>,
        encoding: LineEncoding,
    ) -> Result<Self> {
        let mut session = backend.open_session(config.optimization_timeout_ms)?;
        let vars = build_weak_polygon_nonoverlapping(&mut session, config, &problem, batch, encoding)?;
        let checked = batch.fixed.iter().chain(batch.free).copied().collect();
        Ok(Self {
            session,
            vars,
            config,
            problem,
            policy: GuardPolicy::new(problem.sequencing, encoding, config),
            refiner: Refiner::new(),
            statistics: SolveStatistics::default(),
            free: batch.free.to_vec(),
            checked,
            values: batch.values.clone(),
        })
    }

    /// Feasibility query with refinement.
    fn query(&mut self, assumptions: &[Formula]) -> Result<BatchVerdict> {
        for round in 0..=self.config.max_refinements {
            self.statistics.feasibility_queries += 1;
            match self.session.check_assuming(assumptions)? {
                CheckResult::Sat => self.statistics.sat += 1,
                CheckResult::Unsat => {
                    self.statistics.unsat += 1;
                    return Ok(BatchVerdict::Failed(FailureKind::SolverUnsat));
                }
                CheckResult::Unknown => {
                    self.statistics.timeouts += 1;
                    return Ok(BatchVerdict::Failed(FailureKind::SolverTimeout));
                }
            }

            if !extract_decision_values_from_model(&self.session, &self.vars, &self.free, &mut self.values) {
                self.statistics.timeouts += 1;
                return Ok(BatchVerdict::Failed(FailureKind::SolverTimeout));
            }
            clamp_to_plate(self.config, &self.problem, &mut self.values, &self.free);

            let violations = collect_violations(self.config, &self.problem, &self.values, &self.checked);
            if violations.is_empty() {
                return Ok(BatchVerdict::Placed(self.values.clone()));
            }
            if round == self.config.max_refinements {
                break;
            }

            let added = self.refiner.refine(
                &mut self.session,
                &mut self.vars,
                self.config,
                &self.problem,
                &self.policy,
                &violations,
            )?;
            self.statistics.refinements += 1;
            self.statistics.refinement_clauses += added;
            if added == 0 {
                log::debug!("no refinement possible for {} violation(s)", violations.len());
                break;
            }
        }
        self.statistics.verification_failures += 1;
        Ok(BatchVerdict::Failed(FailureKind::GeometryVerificationFailure))
    }

    /// Whole-plate query followed by the configured box search.
    fn search(&mut self, search: BoxSearch, base: &[Formula]) -> Result<BatchVerdict> {
        let mut best = match self.query(base)? {
            BatchVerdict::Placed(values) => values,
            failed => return Ok(failed),
        };

        let full = full_half_extent(self.config);
        let min_half = self.config.minimum_bounding_box_size / 2;
        match search {
            BoxSearch::Full => {}
            BoxSearch::Linear => {
                let step = self.config.bounding_box_size_optimization_step.max(1);
                let mut half = full - step;
                while half >= min_half {
                    match self.query_box(base, half)? {
                        BatchVerdict::Placed(values) => best = values,
                        BatchVerdict::Failed(_) => break,
                    }
                    half -= step;
                }
            }
            BoxSearch::Binary => {
                let mut searcher = BoxSearcher::new(min_half, full, self.config.bounding_box_resolution);
                while let Some(candidate) = searcher.next_candidate() {
                    let feasible = match self.query_box(base, candidate)? {
                        BatchVerdict::Placed(values) => {
                            best = values;
                            true
                        }
                        BatchVerdict::Failed(_) => false,
                    };
                    searcher.record(candidate, feasible);
                }
                log::debug!(
                    "box search settled on half-extent {} after {} candidate(s)",
                    searcher.best(),
                    searcher.queries()
                );
            }
        }
        Ok(BatchVerdict::Placed(best))
    }

    fn query_box(&mut self, base: &[Formula], half: i64) -> Result<BatchVerdict> {
        let bounds = centered_box(self.config, half);
        let mut assumptions = base.to_vec();
        assumptions.push(assume_batch_box(&self.vars, &self.problem, &self.free, &bounds));
        self.query(&assumptions)
    }
}

/// Decides `free` with `fixed` held at their values.
///
/// An implicit attempt that times out is repeated with the explicit encoding
/// when the configuration allows it.
pub fn optimize_batch<B: SolverBackend>(
    backend: &B,
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    batch: &BatchSpec<'_>,
) -> Result<BatchOutcome> {
    let mut statistics = SolveStatistics::default();
    let mut encoding = config.line_encoding;
    loop {
        let mut run = BatchRun::open(backend, config, *problem, batch, encoding)?;
        let verdict = run.search(config.box_search, &[])?;
        statistics.merge(&run.statistics);

        let retry = encoding == LineEncoding::Implicit
            && config.explicit_fallback
            && verdict.failure() == Some(FailureKind::SolverTimeout);
        if !retry {
            return Ok(BatchOutcome {
                verdict,
                statistics,
            });
        }
        log::info!(
            "{}: implicit batch of {} timed out, retrying with explicit ordering",
            backend.name(),
            batch.free.len()
        );
        encoding = LineEncoding::Explicit;
    }
}

fn with_search(config: &SolverConfiguration, search: BoxSearch) -> SolverConfiguration {
    config.clone().with_box_search(search)
}

/// Places `free` anywhere on the plate, without print order.
pub fn optimize_weak_polygon_nonoverlapping<B: SolverBackend>(
    backend: &B,
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    batch: &BatchSpec<'_>,
) -> Result<BatchOutcome> {
    let plain = ArrangementProblem::plain(problem.polygons);
    optimize_batch(backend, &with_search(config, BoxSearch::Full), &plain, batch)
}

/// Sequential batch pulled toward the centre by a linear box search.
pub fn optimize_sequential_weak_polygon_nonoverlapping_centered<B: SolverBackend>(
    backend: &B,
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    batch: &BatchSpec<'_>,
) -> Result<BatchOutcome> {
    optimize_batch(backend, &with_search(config, BoxSearch::Linear), problem, batch)
}

/// Sequential batch pulled toward the centre by bisection.
pub fn optimize_sequential_weak_polygon_nonoverlapping_binary_centered<B: SolverBackend>(
    backend: &B,
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    batch: &BatchSpec<'_>,
) -> Result<BatchOutcome> {
    optimize_batch(backend, &with_search(config, BoxSearch::Binary), problem, batch)
}

/// Outcome of a consequential window.
#[derive(Debug, Clone)]
pub struct WindowOutcome {
    /// Number of leading window objects placed (zero on failure).
    pub placed: usize,
    /// Verdict of the largest successful prefix, or the last failure.
    pub verdict: BatchVerdict,
    /// Solver counters.
    pub statistics: SolveStatistics,
}

/// Decides the longest prefix of `window` that fits.
///
/// The window formula is built once; each prefix length is tried inside its
/// own assertion frame with the prefix present and the rest missing.
pub fn optimize_consequential_weak_polygon_nonoverlapping_binary_centered<B: SolverBackend>(
    backend: &B,
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    fixed: &[usize],
    window: &[usize],
    values: &DecisionValues,
) -> Result<WindowOutcome> {
    let problem = ArrangementProblem {
        sequencing: Sequencing::Consequential,
        ..*problem
    };
    let batch = BatchSpec {
        fixed,
        free: window,
        values,
    };
    let mut statistics = SolveStatistics::default();
    let mut encoding = config.line_encoding;
    loop {
        let mut run = BatchRun::open(backend, config, problem, &batch, encoding)?;
        let mut last = BatchVerdict::Failed(FailureKind::SolverUnsat);
        let mut placed = 0;

        for size in (1..=window.len()).rev() {
            let (present, missing) = window.split_at(size);
            run.session.push();
            for assumption in assume_consequential_object_presence(&run.vars, present, missing, config) {
                run.session.assert(assumption);
            }
            run.free = present.to_vec();
            run.checked = fixed.iter().chain(present).copied().collect();
            run.refiner = Refiner::new();

            last = run.search(BoxSearch::Binary, &[])?;
            run.session.pop()?;
            if last.is_placed() {
                placed = size;
                break;
            }
            log::debug!("window prefix of {} failed: {:?}", size, last.failure());
        }
        statistics.merge(&run.statistics);

        let retry = placed == 0
            && encoding == LineEncoding::Implicit
            && config.explicit_fallback
            && last.failure() == Some(FailureKind::SolverTimeout);
        if !retry {
            return Ok(WindowOutcome {
                placed,
                verdict: last,
                statistics,
            });
        }
        log::info!(
            "{}: consequential window timed out, retrying with explicit ordering",
            backend.name()
        );
        encoding = LineEncoding::Explicit;
    }
}
