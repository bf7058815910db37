//! Subglobal arrangement drivers.
//!
//! Objects are decided in batches of at most `object_group_size`. A batch
//! that cannot be placed is retried with one object less; objects decided by
//! earlier batches stay fixed. The round ends when a single object cannot be
//! added, leaving the rest for the next plate.

use std::time::Instant;

use crate::decoder::augment_temporal_spread;
use crate::model::{ArrangementProblem, BatchSpec};
use crate::optimizer::{
    optimize_consequential_weak_polygon_nonoverlapping_binary_centered, optimize_batch,
    optimize_weak_polygon_nonoverlapping, BatchOutcome, BatchVerdict,
};
use crate::temporal::Sequencing;
use crate::verify::{check_area, check_extents};
use seqarrange_core::{
    ArrangementResult, FailureKind, Polygon, ProgressInfo, ProgressReporter, Result, SolveStatistics,
    SolverBackend, SolverConfiguration,
};

/// Decision state of a round.
struct Round<'a> {
    config: &'a SolverConfiguration,
    problem: ArrangementProblem<'a>,
    objects: &'a [usize],
    result: ArrangementResult,
    /// Index into `objects` of the first undecided object.
    curr: usize,
    start: Instant,
}

impl<'a> Round<'a> {
    fn new(config: &'a SolverConfiguration, problem: ArrangementProblem<'a>, objects: &'a [usize]) -> Self {
        Self {
            config,
            problem,
            objects,
            result: ArrangementResult::new(problem.len()),
            curr: 0,
            start: Instant::now(),
        }
    }

    fn rest(&self) -> &'a [usize] {
        &self.objects[self.curr..]
    }

    /// Pre-checks that skip hopeless solver calls.
    fn hopeless(&self, free: &[usize]) -> bool {
        if let Some(&i) = free
            .iter()
            .find(|&&i| !check_extents(self.config, &self.problem.polygons[i]))
        {
            log::debug!("object {} does not fit the plate", i);
            return true;
        }
        let all: Vec<usize> = self.result.decided.iter().chain(free).copied().collect();
        if !check_area(self.config, self.problem.polygons, &all) {
            log::debug!("{} object(s) exceed the plate area", all.len());
            return true;
        }
        false
    }

    fn commit<R: ProgressReporter + ?Sized>(&mut self, placed: &[usize], outcome: BatchOutcome, reporter: &R) {
        self.result.statistics.merge(&outcome.statistics);
        if let BatchVerdict::Placed(values) = outcome.verdict {
            self.result.values = values;
        }
        self.result.decided.extend_from_slice(placed);
        if self.problem.sequencing.has_time() {
            augment_temporal_spread(self.config, &mut self.result.values, &self.result.decided);
        }
        self.result.statistics.batches += 1;
        self.curr += placed.len();
        log::info!(
            "decided {} object(s), {}/{} done",
            placed.len(),
            self.result.decided.len(),
            self.objects.len()
        );
        reporter.report(
            ProgressInfo::new()
                .with_objects(self.result.decided.len(), self.objects.len())
                .with_elapsed(self.elapsed_ms())
                .with_phase(format!("batch {}", self.result.statistics.batches)),
        );
    }

    fn fail(&mut self, kind: Option<FailureKind>, statistics: &SolveStatistics) {
        self.result.statistics.merge(statistics);
        if kind.is_some() {
            self.result.failure = kind;
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn finish<R: ProgressReporter + ?Sized>(mut self, reporter: &R) -> ArrangementResult {
        if self.curr < self.objects.len() {
            if self.result.decided.is_empty() {
                log::warn!(
                    "object {} cannot be placed on an empty plate",
                    self.objects[self.curr]
                );
                self.result.success = false;
                self.result.failure = Some(FailureKind::HardFailure);
                self.result.remaining = self.objects.to_vec();
            } else {
                self.result.remaining = self.rest().to_vec();
            }
        }
        self.result.computation_time_ms = self.elapsed_ms();
        reporter.report(
            ProgressInfo::new()
                .with_objects(self.result.decided.len(), self.objects.len())
                .with_elapsed(self.result.computation_time_ms)
                .with_phase("done")
                .finished(),
        );
        self.result
    }
}

fn arrange_in_batches<B, R>(
    backend: &B,
    config: &SolverConfiguration,
    problem: ArrangementProblem<'_>,
    objects: &[usize],
    reporter: &R,
) -> Result<ArrangementResult>
where
    B: SolverBackend,
    R: ProgressReporter + ?Sized,
{
    config.validate()?;
    let mut round = Round::new(config, problem, objects);

    while round.curr < objects.len() {
        let rest = round.rest();
        let mut committed = false;

        for size in (1..=config.object_group_size.min(rest.len())).rev() {
            let free = &rest[..size];
            if round.hopeless(free) {
                round.fail(Some(FailureKind::SolverUnsat), &SolveStatistics::default());
                continue;
            }
            let batch = BatchSpec {
                fixed: &round.result.decided,
                free,
                values: &round.result.values,
            };
            let outcome = match problem.sequencing {
                Sequencing::Unordered => optimize_weak_polygon_nonoverlapping(backend, config, &problem, &batch)?,
                _ => optimize_batch(backend, config, &problem, &batch)?,
            };
            if outcome.verdict.is_placed() {
                round.commit(free, outcome, reporter);
                committed = true;
                break;
            }
            log::debug!(
                "batch of {} failed: {:?}",
                size,
                outcome.verdict.failure()
            );
            round.fail(outcome.verdict.failure(), &outcome.statistics);
        }

        if !committed {
            break;
        }
    }
    Ok(round.finish(reporter))
}

/// Places `objects` without print order, as many as fit on one plate.
pub fn optimize_subglobal_polygon_nonoverlapping<B, R>(
    backend: &B,
    config: &SolverConfiguration,
    polygons: &[Polygon],
    objects: &[usize],
    reporter: &R,
) -> Result<ArrangementResult>
where
    B: SolverBackend,
    R: ProgressReporter + ?Sized,
{
    arrange_in_batches(backend, config, ArrangementProblem::plain(polygons), objects, reporter)
}

/// Places and orders `objects` for sequential printing, as many as fit on
/// one plate.
///
/// `zones[i]` are the unreachable zones of object `i` relative to its
/// reference point. Decided print times are spaced by the temporal gap.
pub fn optimize_subglobal_sequential_polygon_nonoverlapping<B, R>(
    backend: &B,
    config: &SolverConfiguration,
    polygons: &[Polygon],
    zones: &[Vec<Polygon>],
    objects: &[usize],
    reporter: &R,
) -> Result<ArrangementResult>
where
    B: SolverBackend,
    R: ProgressReporter + ?Sized,
{
    arrange_in_batches(
        backend,
        config,
        ArrangementProblem::sequential(polygons, zones),
        objects,
        reporter,
    )
}

/// Sequential arrangement where each window of objects is encoded once and
/// its prefixes are tried through presence assumptions.
pub fn optimize_subglobal_consequential_polygon_nonoverlapping<B, R>(
    backend: &B,
    config: &SolverConfiguration,
    polygons: &[Polygon],
    zones: &[Vec<Polygon>],
    objects: &[usize],
    reporter: &R,
) -> Result<ArrangementResult>
where
    B: SolverBackend,
    R: ProgressReporter + ?Sized,
{
    config.validate()?;
    let problem = ArrangementProblem::consequential(polygons, zones);
    let mut round = Round::new(config, problem, objects);

    while round.curr < objects.len() {
        let rest = round.rest();
        let mut window = &rest[..config.object_group_size.min(rest.len())];
        while !window.is_empty() && round.hopeless(window) {
            window = &window[..window.len() - 1];
        }
        if window.is_empty() {
            round.fail(Some(FailureKind::SolverUnsat), &SolveStatistics::default());
            break;
        }

        let outcome = optimize_consequential_weak_polygon_nonoverlapping_binary_centered(
            backend,
            config,
            &problem,
            &round.result.decided,
            window,
            &round.result.values,
        )?;
        if outcome.placed == 0 {
            round.fail(outcome.verdict.failure(), &outcome.statistics);
            break;
        }
        round.commit(
            &window[..outcome.placed],
            BatchOutcome {
                verdict: outcome.verdict,
                statistics: outcome.statistics,
            },
            reporter,
        );
    }
    Ok(round.finish(reporter))
}
