//! Solver hand-off and result queries.
//!
//! The model keeps its own linear representation; translation into a
//! `good_lp` problem happens only here. Which backends exist depends on the
//! `solver-clarabel` and `solver-highs` features.

use std::fmt;
use std::time::{Duration, Instant};

use esm_core::NodeIndex;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use tracing::{debug, info, warn};

use crate::config::SolverKind;
use crate::error::{ModelError, ModelResult};
use crate::expr::{LinearExpr, Sense, VarId};
use crate::flows::FlowKey;
use crate::model::{Model, VarKind};

/// Termination status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Timeout,
    IterationLimit,
    NumericalError,
    Error,
}

impl SolveStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Unbounded => "unbounded",
            SolveStatus::Timeout => "timeout",
            SolveStatus::IterationLimit => "iteration_limit",
            SolveStatus::NumericalError => "numerical_error",
            SolveStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// What came back from the solver. `results` is present only on success.
#[derive(Debug)]
pub struct SolveOutcome<'m> {
    pub status: SolveStatus,
    pub message: Option<String>,
    pub results: Option<ModelResults<'m>>,
    pub solve_time: Duration,
}

impl<'m> SolveOutcome<'m> {
    fn failed(status: SolveStatus, message: String, solve_time: Duration) -> Self {
        Self {
            status,
            message: Some(message),
            results: None,
            solve_time,
        }
    }
}

/// Variable values of a solved model, queryable by topology element.
#[derive(Debug, Clone)]
pub struct ModelResults<'m> {
    model: &'m Model,
    values: Vec<f64>,
}

impl<'m> ModelResults<'m> {
    /// Wrap externally obtained values, one per model variable.
    pub fn from_values(model: &'m Model, values: Vec<f64>) -> ModelResult<Self> {
        if values.len() != model.num_variables() {
            return Err(ModelError::config(format!(
                "expected {} values, got {}",
                model.num_variables(),
                values.len()
            )));
        }
        Ok(Self { model, values })
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, var: VarId) -> Option<f64> {
        self.values.get(var.index()).copied()
    }

    pub fn flow(&self, source: NodeIndex, target: NodeIndex, t: usize) -> Option<f64> {
        self.value(self.model.flow_var(FlowKey::new(source, target), t)?)
    }

    pub fn storage_capacity(&self, node: NodeIndex, t: usize) -> Option<f64> {
        self.value(self.model.storage_capacity_var(node, t)?)
    }

    pub fn invest_flow(&self, source: NodeIndex, target: NodeIndex) -> Option<f64> {
        self.value(self.model.invest_flow_var(FlowKey::new(source, target))?)
    }

    pub fn invest_storage(&self, node: NodeIndex) -> Option<f64> {
        self.value(self.model.invest_storage_var(node)?)
    }

    pub fn status(&self, source: NodeIndex, target: NodeIndex, t: usize) -> Option<f64> {
        self.value(self.model.status_var(FlowKey::new(source, target), t)?)
    }

    pub fn voltage_angle(&self, bus: NodeIndex, t: usize) -> Option<f64> {
        self.value(self.model.voltage_angle_var(bus, t)?)
    }

    /// Objective value at these values.
    pub fn objective(&self) -> f64 {
        self.model.objective().eval(&self.values)
    }

    /// Value of one named cost expression, e.g. `"flow.variable_costs"`.
    pub fn expression(&self, name: &str) -> Option<f64> {
        self.model.cost(name).map(|e| e.eval(&self.values))
    }
}

/// Solve `model` with the backend selected in its configuration.
///
/// Solver-side failures (infeasible, unbounded, limits) are reported through
/// [`SolveOutcome::status`]; an `Err` means the model could not be handed to
/// the solver at all.
pub fn solve(model: &Model) -> ModelResult<SolveOutcome<'_>> {
    let solver = model.config().solver;
    if !solver.is_available() {
        return Err(ModelError::unsupported(format!(
            "solver '{}' is not compiled in (available: {:?})",
            solver,
            SolverKind::available()
        )));
    }
    let relax = model.config().relax_binaries();
    let binaries = model.stats().binaries;
    if binaries > 0 && !relax && !solver.supports_integers() {
        return Err(ModelError::unsupported(format!(
            "solver '{}' cannot handle {} binary variables; enable relax_binaries or use highs",
            solver, binaries
        )));
    }

    let start = Instant::now();
    if model.num_variables() == 0 {
        return Ok(SolveOutcome {
            status: SolveStatus::Optimal,
            message: None,
            results: Some(ModelResults::from_values(model, Vec::new())?),
            solve_time: start.elapsed(),
        });
    }

    info!(
        solver = %solver,
        variables = model.num_variables(),
        binaries,
        relax,
        "solving model"
    );
    let result = dispatch(model, solver, relax);
    let solve_time = start.elapsed();

    match result {
        Ok(values) => {
            let results = ModelResults::from_values(model, values)?;
            info!(
                objective = results.objective(),
                time_ms = solve_time.as_millis() as u64,
                "solve finished"
            );
            Ok(SolveOutcome {
                status: SolveStatus::Optimal,
                message: None,
                results: Some(results),
                solve_time,
            })
        }
        Err(err) => {
            let status = status_of(&err);
            warn!(%status, error = %err, "solve failed");
            Ok(SolveOutcome::failed(status, err.to_string(), solve_time))
        }
    }
}

#[allow(unreachable_patterns)]
fn dispatch(model: &Model, solver: SolverKind, relax: bool) -> Result<Vec<f64>, ResolutionError> {
    let (problem, vars) = variables_of(model, relax);
    let objective = expression_of(&model.objective(), &vars);
    let unsolved = problem.minimise(objective);
    match solver {
        #[cfg(feature = "solver-clarabel")]
        SolverKind::Clarabel => run(
            unsolved.using(good_lp::solvers::clarabel::clarabel),
            model,
            &vars,
        ),
        #[cfg(feature = "solver-highs")]
        SolverKind::Highs => run(unsolved.using(good_lp::solvers::highs::highs), model, &vars),
        _ => Err(ResolutionError::Str(format!(
            "solver '{}' is not compiled in",
            solver
        ))),
    }
}

fn variables_of(model: &Model, relax: bool) -> (ProblemVariables, Vec<Variable>) {
    let mut problem = ProblemVariables::new();
    let vars = model
        .variables()
        .iter()
        .map(|def| {
            let mut v = variable().name(def.name.clone());
            if def.kind == VarKind::Binary && !relax {
                v = v.binary();
            } else if !def.is_fixed() {
                if def.lower.is_finite() {
                    v = v.min(def.lower);
                }
                if def.upper.is_finite() {
                    v = v.max(def.upper);
                }
            }
            problem.add(v)
        })
        .collect();
    (problem, vars)
}

fn expression_of(expr: &LinearExpr, vars: &[Variable]) -> Expression {
    let mut out = Expression::from(expr.constant_term());
    for &(var, coef) in expr.terms() {
        out.add_mul(coef, vars[var.index()]);
    }
    out
}

fn run<M>(mut problem: M, model: &Model, vars: &[Variable]) -> Result<Vec<f64>, ResolutionError>
where
    M: SolverModel<Error = ResolutionError>,
{
    // fixed variables enter as equalities so interior point solvers do not
    // face an empty box
    for (def, &var) in model.variables().iter().zip(vars) {
        if def.is_fixed() && def.kind == VarKind::Continuous {
            problem.add_constraint(constraint!(var == def.lower));
        }
    }

    let mut rows = 0usize;
    for (_, family) in model.families() {
        for (_, c) in family.iter() {
            if c.is_trivial() {
                continue;
            }
            let lhs = expression_of(&c.expr, vars);
            let row = match c.sense {
                Sense::Eq => constraint!(lhs == 0.0),
                Sense::Le => constraint!(lhs <= 0.0),
                Sense::Ge => constraint!(lhs >= 0.0),
            };
            problem.add_constraint(row);
            rows += 1;
        }
    }
    debug!(rows, "constraints handed to solver");

    let solution = problem.solve()?;
    Ok(vars.iter().map(|&v| solution.value(v)).collect())
}

fn status_of(err: &ResolutionError) -> SolveStatus {
    match err {
        ResolutionError::Infeasible => SolveStatus::Infeasible,
        ResolutionError::Unbounded => SolveStatus::Unbounded,
        ResolutionError::Other(msg) => match *msg {
            "Time limit reached" | "ReachedTimeLimit" => SolveStatus::Timeout,
            "Max iterations reached" | "ReachedIterationLimit" => SolveStatus::IterationLimit,
            "Numerical error" | "No progress" => SolveStatus::NumericalError,
            _ => SolveStatus::Error,
        },
        ResolutionError::Str(_) => SolveStatus::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::expr::LinearConstraint;
    use crate::time::TimeIndex;

    fn model() -> Model {
        Model::new(TimeIndex::uniform(1, 1.0).unwrap(), ModelConfig::default())
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SolveStatus::Optimal.to_string(), "optimal");
        assert_eq!(SolveStatus::IterationLimit.to_string(), "iteration_limit");
        assert!(SolveStatus::Optimal.is_success());
        assert!(SolveStatus::Infeasible.is_failure());
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(status_of(&ResolutionError::Infeasible), SolveStatus::Infeasible);
        assert_eq!(
            status_of(&ResolutionError::Other("Time limit reached")),
            SolveStatus::Timeout
        );
        assert_eq!(
            status_of(&ResolutionError::Other("Max iterations reached")),
            SolveStatus::IterationLimit
        );
        assert_eq!(
            status_of(&ResolutionError::Str("boom".into())),
            SolveStatus::Error
        );
    }

    #[cfg(feature = "solver-clarabel")]
    #[test]
    fn test_empty_model_is_optimal() {
        let m = model();
        let outcome = solve(&m).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_eq!(outcome.results.map(|r| r.objective()), Some(0.0));
    }

    #[test]
    fn test_results_queries() {
        let mut m = model();
        let x = m.add_variable("x", 0.0, 10.0);
        m.add_cost("flow.variable_costs", x * 3.0);
        let results = ModelResults::from_values(&m, vec![2.0]).unwrap();
        assert_eq!(results.value(x), Some(2.0));
        assert_eq!(results.objective(), 6.0);
        assert_eq!(results.expression("flow.variable_costs"), Some(6.0));
        assert_eq!(results.expression("storage.fixed_costs"), None);
        assert!(ModelResults::from_values(&m, vec![]).is_err());
    }

    #[cfg(feature = "solver-clarabel")]
    #[test]
    fn test_binaries_need_relaxation_on_clarabel() {
        let mut m = Model::new(
            TimeIndex::uniform(1, 1.0).unwrap(),
            ModelConfig::default().with_relax_binaries(false),
        );
        m.add_binary("on");
        assert!(solve(&m).unwrap_err().is_unsupported());
    }

    #[cfg(feature = "solver-clarabel")]
    #[test]
    fn test_small_lp() {
        let mut m = model();
        let x = m.add_variable("x", 0.0, f64::INFINITY);
        let y = m.add_variable("y", 0.0, 4.0);
        m.add_constraint(
            "test.sum",
            crate::model::ConstraintKey::NodeTime(NodeIndex::new(0), 0),
            LinearConstraint::ge(x + y, 10.0),
        );
        m.add_cost("flow.variable_costs", x * 2.0 + y * 1.0);

        let outcome = solve(&m).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        let results = outcome.results.unwrap();
        assert!((results.value(y).unwrap() - 4.0).abs() < 1e-5);
        assert!((results.objective() - 16.0).abs() < 1e-4);
    }

    #[cfg(feature = "solver-clarabel")]
    #[test]
    fn test_infeasible_is_reported() {
        let mut m = model();
        let x = m.add_variable("x", 0.0, 1.0);
        m.add_constraint(
            "test.low",
            crate::model::ConstraintKey::NodeTime(NodeIndex::new(0), 0),
            LinearConstraint::ge(x, 5.0),
        );
        m.add_cost("flow.variable_costs", x * 1.0);
        let outcome = solve(&m).unwrap();
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.results.is_none());
        assert!(outcome.message.is_some());
    }
}
