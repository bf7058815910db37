//! # seqarrange core
//!
//! Shared types of the sequential print arrangement engine.
//!
//! This crate provides the pieces that do not depend on a particular solver
//! backend or constraint encoding:
//!
//! ## Core Components
//!
//! - **Geometry**: [`Point`], [`Polygon`], [`BoundingBox`] with integer coordinates
//! - **Predicates**: [`robust`] - segment intersection (general / closed / open),
//!   half-plane and point-in-polygon tests, floating and exact
//! - **Rational**: [`Rational`] - fixed-precision decision values
//! - **Formulas**: [`Formula`], [`LinExpr`] - backend-agnostic constraints
//! - **Sessions**: [`SolverSession`], [`SolverBackend`] - incremental solving
//! - **Configuration**: [`SolverConfiguration`] and progress reporting
//! - **Results**: [`ArrangementResult`], [`FailureKind`], [`SolveStatistics`]
//!
//! ## Configuration
//!
//! ```rust
//! use seqarrange_core::{DecimationPrecision, SolverConfiguration};
//!
//! let config = SolverConfiguration::new()
//!     .with_plate_size(2500, 2100)
//!     .with_temporal_spread(16)
//!     .with_decimation_precision(DecimationPrecision::High)
//!     .with_timeout(8000);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization support

pub mod error;
pub mod formula;
pub mod geometry;
pub mod rational;
pub mod result;
pub mod robust;
pub mod session;
pub mod solver;

// Re-exports
pub use error::{Error, Result};
pub use formula::{Formula, LinExpr, Relation, Sort, VarId};
pub use geometry::{convex_hull_of, BoundingBox, Coord, Line, Point, Polygon};
pub use rational::{Rational, EPSILON, RATIONAL_PRECISION};
pub use result::{ArrangementResult, DecisionValues, FailureKind, SolveStatistics};
pub use crate::robust::{Orientation, PointLocation};
pub use session::{AssertionStack, CheckResult, Declaration, ModelValue, SolverBackend, SolverSession};
pub use solver::{
    BoxSearch, ChannelReporter, DecimationPrecision, LineEncoding, NoProgress, ProgressInfo,
    ProgressReporter, SolverConfiguration, PROGRESS_RANGE,
};
