//! Solver-independent linear expressions and constraints.
//!
//! Blocks write into this small IR instead of into `good_lp` directly, so a
//! built model can be inspected (coefficients, constraint counts, residuals
//! under a given assignment) without a solver. Translation to `good_lp` happens
//! once in [`crate::solve`].

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Handle of a decision variable in a [`Model`](crate::Model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

impl VarId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Affine expression `sum(coef * var) + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn term(var: VarId, coef: f64) -> Self {
        Self {
            terms: vec![(var, coef)],
            constant: 0.0,
        }
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) {
        self.terms.push((var, coef));
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    /// `self += scale * other`
    pub fn add_scaled(&mut self, other: &LinearExpr, scale: f64) {
        self.terms
            .extend(other.terms.iter().map(|&(v, c)| (v, c * scale)));
        self.constant += other.constant * scale;
    }

    /// Terms in insertion order; a variable may appear more than once.
    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant_term(&self) -> f64 {
        self.constant
    }

    /// Total coefficient of `var`.
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms
            .iter()
            .filter(|(v, _)| *v == var)
            .map(|(_, c)| c)
            .sum()
    }

    /// Merge duplicate variables and drop zero coefficients; terms end up sorted.
    pub fn normalized(&self) -> Self {
        let mut merged: BTreeMap<VarId, f64> = BTreeMap::new();
        for &(v, c) in &self.terms {
            *merged.entry(v).or_insert(0.0) += c;
        }
        Self {
            terms: merged.into_iter().filter(|(_, c)| *c != 0.0).collect(),
            constant: self.constant,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.terms.iter().all(|(_, c)| *c == 0.0)
    }

    /// Value under an assignment indexed by [`VarId::index`].
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(v, c)| c * values.get(v.0).copied().unwrap_or(f64::NAN))
            .sum::<f64>()
            + self.constant
    }
}

impl From<VarId> for LinearExpr {
    fn from(var: VarId) -> Self {
        LinearExpr::term(var, 1.0)
    }
}

impl From<f64> for LinearExpr {
    fn from(value: f64) -> Self {
        LinearExpr::constant(value)
    }
}

impl<T: Into<LinearExpr>> AddAssign<T> for LinearExpr {
    fn add_assign(&mut self, rhs: T) {
        let rhs = rhs.into();
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl<T: Into<LinearExpr>> SubAssign<T> for LinearExpr {
    fn sub_assign(&mut self, rhs: T) {
        self.add_scaled(&rhs.into(), -1.0);
    }
}

impl<T: Into<LinearExpr>> Add<T> for LinearExpr {
    type Output = LinearExpr;

    fn add(mut self, rhs: T) -> LinearExpr {
        self += rhs;
        self
    }
}

impl<T: Into<LinearExpr>> Sub<T> for LinearExpr {
    type Output = LinearExpr;

    fn sub(mut self, rhs: T) -> LinearExpr {
        self -= rhs;
        self
    }
}

impl Mul<f64> for LinearExpr {
    type Output = LinearExpr;

    fn mul(mut self, rhs: f64) -> LinearExpr {
        for (_, c) in &mut self.terms {
            *c *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

impl Neg for LinearExpr {
    type Output = LinearExpr;

    fn neg(self) -> LinearExpr {
        self * -1.0
    }
}

impl Mul<f64> for VarId {
    type Output = LinearExpr;

    fn mul(self, rhs: f64) -> LinearExpr {
        LinearExpr::term(self, rhs)
    }
}

impl Mul<VarId> for f64 {
    type Output = LinearExpr;

    fn mul(self, rhs: VarId) -> LinearExpr {
        LinearExpr::term(rhs, self)
    }
}

impl<T: Into<LinearExpr>> Add<T> for VarId {
    type Output = LinearExpr;

    fn add(self, rhs: T) -> LinearExpr {
        LinearExpr::from(self) + rhs
    }
}

impl<T: Into<LinearExpr>> Sub<T> for VarId {
    type Output = LinearExpr;

    fn sub(self, rhs: T) -> LinearExpr {
        LinearExpr::from(self) - rhs
    }
}

impl std::iter::Sum for LinearExpr {
    fn sum<I: Iterator<Item = LinearExpr>>(iter: I) -> Self {
        iter.fold(LinearExpr::new(), |acc, e| acc + e)
    }
}

/// Relation between the two sides of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Eq,
    Le,
    Ge,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sense::Eq => "==",
            Sense::Le => "<=",
            Sense::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Linear constraint stored as `expr (sense) 0`, with `expr = lhs - rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub expr: LinearExpr,
    pub sense: Sense,
}

impl LinearConstraint {
    pub fn new(lhs: impl Into<LinearExpr>, sense: Sense, rhs: impl Into<LinearExpr>) -> Self {
        let expr = (lhs.into() - rhs.into()).normalized();
        Self { expr, sense }
    }

    pub fn eq(lhs: impl Into<LinearExpr>, rhs: impl Into<LinearExpr>) -> Self {
        Self::new(lhs, Sense::Eq, rhs)
    }

    pub fn le(lhs: impl Into<LinearExpr>, rhs: impl Into<LinearExpr>) -> Self {
        Self::new(lhs, Sense::Le, rhs)
    }

    pub fn ge(lhs: impl Into<LinearExpr>, rhs: impl Into<LinearExpr>) -> Self {
        Self::new(lhs, Sense::Ge, rhs)
    }

    /// `lhs - rhs` under the given assignment.
    pub fn residual(&self, values: &[f64]) -> f64 {
        self.expr.eval(values)
    }

    pub fn is_satisfied(&self, values: &[f64], tol: f64) -> bool {
        let r = self.residual(values);
        match self.sense {
            Sense::Eq => r.abs() <= tol,
            Sense::Le => r <= tol,
            Sense::Ge => r >= -tol,
        }
    }

    /// No variable left after normalisation (e.g. `0 == 0`).
    pub fn is_trivial(&self) -> bool {
        self.expr.is_constant()
    }

    pub fn coefficient(&self, var: VarId) -> f64 {
        self.expr.coefficient(var)
    }
}

impl fmt::Display for LinearConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (v, c)) in self.expr.terms().iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{}*x{}", c, v.0)?;
        }
        write!(f, " + {} {} 0", self.expr.constant_term(), self.sense)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_moves_rhs_and_merges_terms() {
        let x = VarId(0);
        let y = VarId(1);
        let c = LinearConstraint::eq(x * 2.0 + y, LinearExpr::from(x) + 3.0);
        assert_eq!(c.coefficient(x), 1.0);
        assert_eq!(c.coefficient(y), 1.0);
        assert_eq!(c.expr.constant_term(), -3.0);
        assert_eq!(c.expr.terms().len(), 2);
    }

    #[test]
    fn test_residual_and_satisfaction() {
        let x = VarId(0);
        let y = VarId(1);
        let c = LinearConstraint::le(x - y, 1.0);
        assert_eq!(c.residual(&[3.0, 1.0]), 1.0);
        assert!(c.is_satisfied(&[3.0, 1.0], 1e-9));
        assert!(!c.is_satisfied(&[4.0, 1.0], 1e-9));

        let g = LinearConstraint::ge(x, y);
        assert!(g.is_satisfied(&[2.0, 2.0], 0.0));
    }

    #[test]
    fn test_cancelled_terms_are_trivial() {
        let x = VarId(0);
        let c = LinearConstraint::eq(x * 1.0, x * 1.0);
        assert!(c.is_trivial());
    }

    #[test]
    fn test_sum_and_scale() {
        let exprs = vec![VarId(0) * 1.0, VarId(1) * 2.0, LinearExpr::constant(1.0)];
        let total: LinearExpr = exprs.into_iter().sum();
        assert_eq!(total.eval(&[1.0, 1.0]), 4.0);
        assert_eq!((-total).eval(&[1.0, 1.0]), -4.0);
    }

    #[test]
    fn test_display() {
        let c = LinearConstraint::ge(VarId(2) * 0.5, 1.0);
        assert_eq!(c.to_string(), "0.5*x2 + -1 >= 0");
    }
}
