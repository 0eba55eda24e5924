//! Formulation blocks.
//!
//! Each block exposes `build(model, system, group)`: it appends the variables,
//! constraints and cost terms for one homogeneous group of topology elements
//! produced by [`classify`](crate::grouping::classify). Blocks validate their
//! whole group before touching the model, so a failing block leaves no
//! variables behind.

pub mod bus;
pub mod discrete;
pub mod electrical;
pub mod flow;
pub mod investment_flow;
pub mod investment_storage;
pub mod storage;
pub mod transformer;
