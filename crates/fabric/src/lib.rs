//! # Fabric
//!
//! Topology model for declarative leaf/spine fabrics.
//!
//! This crate is the pure side of the engine: it turns a high-level
//! [`FabricSpec`] (device counts, redundancy policy, port preferences)
//! into a concrete [`DesiredStateGraph`] of devices, interfaces and
//! cables with stable identities.
//!
//! ## Pipeline
//!
//! 1. [`validate`](validate::validate) a raw [`FabricSpec`] into a
//!    [`ValidatedSpec`], collecting every violation at once.
//! 2. [`calculate`](plan::calculate) the [`TopologyPlan`] - leaf/spine
//!    counts and breakout assignments.
//! 3. [`generate`](generate::generate) the desired-state graph.
//!
//! Everything here is deterministic: identical inputs produce
//! byte-identical graphs, every invocation. There is no I/O, no clock,
//! no randomness, and no map-iteration-order dependence.

pub mod breakout;
pub mod generate;
pub mod graph;
pub mod plan;
pub mod spec;
pub mod validate;

pub use breakout::{BreakoutMode, modes_for, select_breakout};
pub use generate::{GenerateError, generate};
pub use graph::{DesiredObject, DesiredStateGraph, ObjectKind, StableId, fields};
pub use plan::{CalculationError, TopologyPlan, calculate};
pub use spec::{
    FabricSpec, LeafClassSpec, RedundancyPolicy, ServerClassSpec, SpineClassSpec, ValidatedSpec,
};
pub use validate::{ValidationError, ValidationErrorKind, validate};
