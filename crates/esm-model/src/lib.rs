//! # esm-model: Energy System Optimisation Models
//!
//! Turns an [`EnergySystem`](esm_core::EnergySystem) into a time-indexed
//! linear (or mixed-integer) optimisation model and hands it to a solver.
//!
//! ## Building a model
//!
//! [`build_model`] classifies every node and flow into a block group
//! ([`classify`]), creates one flow variable per edge and timestep, and then
//! lets each formulation block append its variables, constraints and cost
//! terms in [`ComponentKind::BUILD_ORDER`]. Constraints live in named families
//! (`"bus.balance"`, `"storage.balance"`, ...) keyed by the topology element
//! and timestep they belong to, so a built model can be inspected without a
//! solver.
//!
//! ## Solving
//!
//! [`solve`] translates the model into a `good_lp` problem for the backend
//! chosen in [`ModelConfig`]. Clarabel (default feature `solver-clarabel`) is a
//! pure-Rust interior point solver without integer support, so binary status
//! variables are relaxed to `[0, 1]` unless HiGHS (`solver-highs`) is used.
//!
//! ## Quick Start
//!
//! ```rust
//! use esm_core::{Bus, EnergySystem, Flow, Sink, Source};
//! use esm_model::{build_model, solve, ModelConfig, TimeIndex};
//!
//! let mut es = EnergySystem::new();
//! let bus = es.add_node(Bus::new("el")).unwrap();
//! let gas = es.add_node(Source::new("gas_plant")).unwrap();
//! let demand = es.add_node(Sink::new("demand")).unwrap();
//! es.connect(gas, bus, Flow::new().with_nominal_value(20.0).with_variable_costs(3.0))
//!     .unwrap();
//! es.connect(bus, demand, Flow::new().with_nominal_value(10.0).fixed_to(vec![0.5, 1.0]))
//!     .unwrap();
//!
//! let time = TimeIndex::uniform(2, 1.0).unwrap();
//! let model = build_model(&es, time, ModelConfig::default()).unwrap();
//! println!("{}", model.stats());
//!
//! # #[cfg(feature = "solver-clarabel")]
//! # {
//! let outcome = solve(&model).unwrap();
//! let results = outcome.results.unwrap();
//! assert!((results.flow(gas, bus, 1).unwrap() - 10.0).abs() < 1e-4);
//! assert!((results.objective() - 45.0).abs() < 1e-3);
//! # }
//! ```

pub mod blocks;
pub mod builder;
pub mod config;
pub mod error;
pub mod expr;
pub mod flows;
pub mod grouping;
pub mod model;
pub mod solve;
pub mod time;

pub use builder::build_model;
pub use config::{ModelConfig, SolverKind};
pub use error::{ModelError, ModelResult};
pub use expr::{LinearConstraint, LinearExpr, Sense, VarId};
pub use flows::{register_flows, FlowKey};
pub use grouping::{classify, ComponentKind, Groups, LineEntry, StorageEntry, TransformerEntry};
pub use model::{ConstraintFamily, ConstraintKey, Model, ModelStats, VarDef, VarKind};
pub use solve::{solve, ModelResults, SolveOutcome, SolveStatus};
pub use time::TimeIndex;
