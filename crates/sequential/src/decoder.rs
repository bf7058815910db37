//! Model decoding.

use crate::model::ArrangementProblem;
use crate::variables::{Axis, DecisionVariables};
use seqarrange_core::{DecisionValues, Rational, SolverConfiguration, SolverSession};

/// Reads the X, Y and (if present) T values of `objects` from the last model.
///
/// Values are snapped onto the rational grid. Returns false if the model
/// lacks a value of some free variable.
pub fn extract_decision_values_from_model<S: SolverSession>(
    session: &S,
    vars: &DecisionVariables,
    objects: &[usize],
    values: &mut DecisionValues,
) -> bool {
    for &i in objects {
        for axis in [Axis::X, Axis::Y, Axis::T] {
            let Some(var) = vars.variable(i, axis) else {
                continue;
            };
            let Some(value) = session.model_value(var) else {
                log::warn!("model has no value for object {} on {:?}", i, axis);
                return false;
            };
            let decoded = Rational::from_model_value(&value).normalize();
            match axis {
                Axis::X => values.x[i] = decoded,
                Axis::Y => values.y[i] = decoded,
                Axis::T => values.t[i] = decoded,
            }
        }
    }
    true
}

/// Pulls decoded translations back onto the plate box.
///
/// Solvers working in floating point may return values a few tolerances off
/// the bounds. Objects wider than the plate are left alone.
pub fn clamp_to_plate(
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    values: &mut DecisionValues,
    objects: &[usize],
) {
    if config.plate_bounding_polygon.is_some() {
        return;
    }
    let plate = config.plate_bounding_box();
    for &i in objects {
        let bb = problem.polygons[i].bounding_box();
        values.x[i] = clamp(
            values.x[i],
            plate.min.x - bb.min.x,
            plate.max.x - bb.max.x,
        );
        values.y[i] = clamp(
            values.y[i],
            plate.min.y - bb.min.y,
            plate.max.y - bb.max.y,
        );
    }
}

fn clamp(value: Rational, lower: i64, upper: i64) -> Rational {
    if lower > upper {
        return value;
    }
    let (lo, hi) = (Rational::from_integer(lower), Rational::from_integer(upper));
    if value < lo {
        lo
    } else if value > hi {
        hi
    } else {
        value
    }
}

/// Re-grids decided print times.
///
/// Objects keep their relative order; the earliest gets the ground presence
/// time and each following one the temporal gap more, which leaves room for
/// a full batch between any two neighbours.
pub fn augment_temporal_spread(
    config: &SolverConfiguration,
    values: &mut DecisionValues,
    decided: &[usize],
) {
    let mut order = decided.to_vec();
    order.sort_by(|&a, &b| {
        values.t[a]
            .partial_cmp(&values.t[b])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let gap = config.temporal_gap();
    for (rank, &i) in order.iter().enumerate() {
        values.t[i] = Rational::from_integer(config.ground_presence_time + rank as i64 * gap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSession;
    use crate::variables::{ObjectRanges, Range};
    use seqarrange_core::{CheckResult, Polygon};

    #[test]
    fn test_extract_values() {
        let mut session = RecordingSession::default();
        let mut vars = DecisionVariables::new();
        vars.declare_object(
            &mut session,
            1,
            ObjectRanges {
                x: Range::integers(0, 10),
                y: Range::integers(0, 10),
                t: Some(Range::integers(0, 100)),
            },
        )
        .unwrap();
        vars.fix_object(0, Rational::from_integer(3), Rational::from_integer(4), None);
        session.answer_with(CheckResult::Sat);
        session.set_value("X_1", 2.5);
        session.set_value("Y_1", 1.0 / 3.0);
        session.set_value("T_1", 48.0);

        let mut values = DecisionValues::new(2);
        assert!(extract_decision_values_from_model(&session, &vars, &[0, 1], &mut values));
        assert_eq!(values.x[1], Rational::new(5, 2));
        assert_eq!(values.y[1].numerator, 333_333);
        assert_eq!(values.t[1], Rational::from_integer(48));
        // Fixed objects are not touched.
        assert!(values.x[0].is_zero());
    }

    #[test]
    fn test_extract_missing_value() {
        let mut session = RecordingSession::default();
        let mut vars = DecisionVariables::new();
        vars.declare_object(
            &mut session,
            0,
            ObjectRanges {
                x: Range::integers(0, 10),
                y: Range::integers(0, 10),
                t: None,
            },
        )
        .unwrap();
        session.set_value("X_0", 1.0);
        let mut values = DecisionValues::new(1);
        assert!(!extract_decision_values_from_model(&session, &vars, &[0], &mut values));
    }

    #[test]
    fn test_clamp_to_plate() {
        let config = SolverConfiguration::default().with_plate_size(100, 100);
        let polygons = vec![Polygon::rectangle(10, 10)];
        let problem = ArrangementProblem::plain(&polygons);
        let mut values = DecisionValues::new(1);
        values.x[0] = Rational::new(-1, 1000);
        values.y[0] = Rational::new(90_001, 1000);
        clamp_to_plate(&config, &problem, &mut values, &[0]);
        assert!(values.x[0].is_zero());
        assert_eq!(values.y[0], Rational::from_integer(90));
    }

    #[test]
    fn test_augment_temporal_spread() {
        let config = SolverConfiguration::default();
        let mut values = DecisionValues::new(3);
        values.t[0] = Rational::from_integer(90);
        values.t[1] = Rational::from_integer(10);
        values.t[2] = Rational::from_integer(50);
        augment_temporal_spread(&config, &mut values, &[0, 1, 2]);
        let gap = config.temporal_gap();
        assert_eq!(values.t[1], Rational::from_integer(32));
        assert_eq!(values.t[2], Rational::from_integer(32 + gap));
        assert_eq!(values.t[0], Rational::from_integer(32 + 2 * gap));
    }
}
