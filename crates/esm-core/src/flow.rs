//! Flow (edge) attribute bundles
//!
//! A [`Flow`] is the weight of a directed edge `source -> target`. Fractions
//! such as `min`, `max` and the gradient limits are relative to
//! `nominal_value`, or to the sizing variable when the flow carries an
//! [`Investment`].

use serde::{Deserialize, Serialize};

use crate::Sequence;

/// Capacity sizing parameters.
///
/// `ep_costs` is optional in the data model so that a missing value can be
/// reported as a configuration error when a model is built, rather than
/// silently defaulting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Investment {
    /// Upper bound on the sized capacity
    pub maximum: f64,
    /// Cost per unit of sized capacity (equivalent periodical costs)
    pub ep_costs: Option<f64>,
    /// Fixed costs per unit of sized capacity
    pub fixed_costs: Option<f64>,
}

impl Default for Investment {
    fn default() -> Self {
        Self {
            maximum: f64::INFINITY,
            ep_costs: None,
            fixed_costs: None,
        }
    }
}

impl Investment {
    /// Investment with the given per-unit cost and no upper limit.
    pub fn new(ep_costs: f64) -> Self {
        Self {
            ep_costs: Some(ep_costs),
            ..Self::default()
        }
    }

    pub fn with_maximum(mut self, maximum: f64) -> Self {
        self.maximum = maximum;
        self
    }

    pub fn with_fixed_costs(mut self, fixed_costs: f64) -> Self {
        self.fixed_costs = Some(fixed_costs);
        self
    }
}

/// Unit-commitment parameters of a flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Discrete {
    /// Costs per start-up of the unit
    pub start_costs: Option<f64>,
}

impl Discrete {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_costs(mut self, start_costs: f64) -> Self {
        self.start_costs = Some(start_costs);
        self
    }
}

/// Ramp limit: per-step change as a fraction of the nominal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradient {
    /// Largest allowed change per timestep, as a fraction of nominal value
    pub ub: Sequence,
    /// Costs per unit of ramping
    pub costs: Option<f64>,
}

impl Gradient {
    pub fn new(ub: impl Into<Sequence>) -> Self {
        Self {
            ub: ub.into(),
            costs: None,
        }
    }

    pub fn with_costs(mut self, costs: f64) -> Self {
        self.costs = Some(costs);
        self
    }
}

/// Attribute bundle of a directed flow between two nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Flow {
    /// Nominal (installed) value; absent when sized by investment
    pub nominal_value: Option<f64>,
    /// Minimum fraction of nominal value per timestep (defaults to 0)
    pub min: Option<Sequence>,
    /// Maximum fraction of nominal value per timestep (defaults to 1)
    pub max: Option<Sequence>,
    /// Lower bound on the time-integrated flow, as multiple of nominal value
    pub summed_min: Option<f64>,
    /// Upper bound on the time-integrated flow, as multiple of nominal value
    pub summed_max: Option<f64>,
    pub positive_gradient: Option<Gradient>,
    pub negative_gradient: Option<Gradient>,
    /// Costs per unit of nominal value
    pub fixed_costs: Option<f64>,
    /// Costs per unit of flow and hour, per timestep
    pub variable_costs: Option<Sequence>,
    /// Required profile, as fraction of nominal value, when `fixed` is set
    pub actual_value: Option<Sequence>,
    pub fixed: bool,
    pub investment: Option<Investment>,
    pub discrete: Option<Discrete>,
}

impl Flow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nominal_value(mut self, nominal_value: f64) -> Self {
        self.nominal_value = Some(nominal_value);
        self
    }

    pub fn with_min(mut self, min: impl Into<Sequence>) -> Self {
        self.min = Some(min.into());
        self
    }

    pub fn with_max(mut self, max: impl Into<Sequence>) -> Self {
        self.max = Some(max.into());
        self
    }

    pub fn with_summed_min(mut self, summed_min: f64) -> Self {
        self.summed_min = Some(summed_min);
        self
    }

    pub fn with_summed_max(mut self, summed_max: f64) -> Self {
        self.summed_max = Some(summed_max);
        self
    }

    pub fn with_positive_gradient(mut self, gradient: Gradient) -> Self {
        self.positive_gradient = Some(gradient);
        self
    }

    pub fn with_negative_gradient(mut self, gradient: Gradient) -> Self {
        self.negative_gradient = Some(gradient);
        self
    }

    pub fn with_fixed_costs(mut self, fixed_costs: f64) -> Self {
        self.fixed_costs = Some(fixed_costs);
        self
    }

    pub fn with_variable_costs(mut self, costs: impl Into<Sequence>) -> Self {
        self.variable_costs = Some(costs.into());
        self
    }

    /// Pin the flow to `actual_value[t]` times its nominal value (or sized capacity).
    pub fn fixed_to(mut self, actual_value: impl Into<Sequence>) -> Self {
        self.actual_value = Some(actual_value.into());
        self.fixed = true;
        self
    }

    pub fn with_investment(mut self, investment: Investment) -> Self {
        self.investment = Some(investment);
        self
    }

    pub fn with_discrete(mut self, discrete: Discrete) -> Self {
        self.discrete = Some(discrete);
        self
    }

    /// Minimum fraction at timestep `t`, 0 when undeclared.
    #[inline]
    pub fn min_at(&self, t: usize) -> f64 {
        self.min.as_ref().map_or(0.0, |s| s.at(t))
    }

    /// Maximum fraction at timestep `t`, 1 when undeclared.
    #[inline]
    pub fn max_at(&self, t: usize) -> f64 {
        self.max.as_ref().map_or(1.0, |s| s.at(t))
    }

    pub fn is_invested(&self) -> bool {
        self.investment.is_some()
    }

    pub fn is_discrete(&self) -> bool {
        self.discrete.is_some()
    }

    pub fn has_gradient(&self) -> bool {
        self.positive_gradient.is_some() || self.negative_gradient.is_some()
    }

    /// Every per-timestep attribute of this flow, with its attribute name.
    pub fn sequences(&self) -> impl Iterator<Item = (&'static str, &Sequence)> {
        [
            ("min", self.min.as_ref()),
            ("max", self.max.as_ref()),
            ("variable_costs", self.variable_costs.as_ref()),
            ("actual_value", self.actual_value.as_ref()),
            (
                "positive_gradient",
                self.positive_gradient.as_ref().map(|g| &g.ub),
            ),
            (
                "negative_gradient",
                self.negative_gradient.as_ref().map(|g| &g.ub),
            ),
        ]
        .into_iter()
        .filter_map(|(name, seq)| seq.map(|s| (name, s)))
    }
}
