//! An owned algebraic representation of the single-level problem.
//!
//! Variables are grouped by name (e.g. `energy_PV`) and every group and row is tagged with the
//! role it plays in the reformulation, so consumers can inspect and extract the problem group by
//! group. The problem is only handed to a solver at the very end, by a [`SolverOracle`].
//!
//! [`SolverOracle`]: crate::solver::SolverOracle
use crate::model::ObjectiveKind;
use anyhow::{Context, Result, bail, ensure};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of unique problem IDs
static NEXT_PROBLEM_ID: AtomicU64 = AtomicU64::new(0);

/// A decision variable in the problem.
///
/// Note that this type does **not** include the value of the variable; it just refers to a
/// particular column of the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(usize);

impl Variable {
    /// The column index of this variable
    pub fn index(self) -> usize {
        self.0
    }
}

/// The part of the reformulation a variable group or row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum Role {
    /// The dispatch LP
    #[strum(serialize = "primal")]
    Primal,
    /// The dual of the dispatch LP
    #[strum(serialize = "dual")]
    Dual,
    /// Fortuny-Amat indicators and their linking rows
    #[strum(serialize = "big-M")]
    BigM,
}

/// Whether an objective is minimised or maximised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    /// Minimise the objective
    Minimise,
    /// Maximise the objective
    Maximise,
}

/// An affine expression: a weighted sum of variables plus a constant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(Variable, f64)>,
    constant: f64,
}

impl LinearExpr {
    /// An expression consisting of a single constant
    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    /// An expression consisting of a single term
    pub fn term(variable: Variable, coeff: f64) -> Self {
        Self {
            terms: vec![(variable, coeff)],
            constant: 0.0,
        }
    }

    /// Add a term to the expression
    pub fn with_term(mut self, variable: Variable, coeff: f64) -> Self {
        self.terms.push((variable, coeff));
        self
    }

    /// Add several terms to the expression
    pub fn with_terms<I>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = (Variable, f64)>,
    {
        self.terms.extend(terms);
        self
    }

    /// Add a constant to the expression
    pub fn with_constant(mut self, value: f64) -> Self {
        self.constant += value;
        self
    }

    /// The variable terms of the expression
    pub fn terms(&self) -> &[(Variable, f64)] {
        &self.terms
    }

    /// The constant part of the expression
    pub fn constant_value(&self) -> f64 {
        self.constant
    }

    /// Evaluate the expression for the given column values
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|(var, coeff)| coeff * values[var.0])
                .sum::<f64>()
    }

    /// Merge repeated variables and drop zero coefficients.
    ///
    /// Repeated variables occur when a period is its own predecessor (a one-period horizon).
    pub fn normalised(&self) -> Self {
        let mut merged: IndexMap<Variable, f64> = IndexMap::new();
        for &(var, coeff) in &self.terms {
            *merged.entry(var).or_insert(0.0) += coeff;
        }

        Self {
            terms: merged.into_iter().filter(|(_, coeff)| *coeff != 0.0).collect(),
            constant: self.constant,
        }
    }
}

/// A named group of variables, either a single scalar or one per period.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableGroup {
    name: String,
    role: Role,
    variables: Vec<Variable>,
    is_series: bool,
}

impl VariableGroup {
    /// The name of the group
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The role of the group in the reformulation
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the group has one variable per period (rather than being a scalar)
    pub fn is_series(&self) -> bool {
        self.is_series
    }

    /// The variables in this group, in period order
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }
}

/// A column of the problem
#[derive(Debug, Clone, PartialEq)]
struct Column {
    lower: f64,
    upper: f64,
    is_binary: bool,
}

/// Identifies a linear row of the problem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowId(usize);

impl RowId {
    /// The position of this row in [`Problem::rows`]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A linear row: `lower <= sum of terms <= upper`
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// The variable terms; constants are folded into the bounds
    pub expr: LinearExpr,
    /// Lower bound of the row
    pub lower: f64,
    /// Upper bound of the row
    pub upper: f64,
    /// The role of the row in the reformulation
    pub role: Role,
    /// The constraint family the row belongs to (e.g. `limit_PV`)
    pub family: String,
}

/// A product-zero row: `lhs * rhs == 0`
#[derive(Debug, Clone, PartialEq)]
pub struct BilinearRow {
    /// The first factor
    pub lhs: LinearExpr,
    /// The second factor
    pub rhs: LinearExpr,
    /// The complementarity family the row belongs to
    pub family: String,
}

impl BilinearRow {
    /// The value of the product for the given column values
    pub fn product(&self, values: &[f64]) -> f64 {
        self.lhs.evaluate(values) * self.rhs.evaluate(values)
    }
}

/// A linear objective
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    /// The objective expression
    pub expr: LinearExpr,
    /// Whether to minimise or maximise
    pub sense: Sense,
}

/// Identifies which [`Problem`] a block of variables was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemId(u64);

/// The single-level problem, built up group by group.
#[derive(Debug)]
pub struct Problem {
    id: ProblemId,
    columns: Vec<Column>,
    groups: IndexMap<String, VariableGroup>,
    rows: Vec<Row>,
    bilinear_rows: Vec<BilinearRow>,
    objectives: IndexMap<ObjectiveKind, Objective>,
    active_objective: Option<ObjectiveKind>,
}

impl Default for Problem {
    fn default() -> Self {
        Self {
            id: ProblemId(NEXT_PROBLEM_ID.fetch_add(1, Ordering::Relaxed)),
            columns: Vec::new(),
            groups: IndexMap::new(),
            rows: Vec::new(),
            bilinear_rows: Vec::new(),
            objectives: IndexMap::new(),
            active_objective: None,
        }
    }
}

impl Problem {
    /// The unique ID of this problem
    pub fn id(&self) -> ProblemId {
        self.id
    }

    /// Add a group of variables with one variable per period
    pub fn add_series(
        &mut self,
        name: &str,
        role: Role,
        len: usize,
        lower: f64,
        upper: f64,
    ) -> Result<Vec<Variable>> {
        self.add_group(name, role, len, true, lower, upper, false)
    }

    /// Add a group containing a single variable
    pub fn add_scalar(&mut self, name: &str, role: Role, lower: f64, upper: f64) -> Result<Variable> {
        let vars = self.add_group(name, role, 1, false, lower, upper, false)?;
        Ok(vars[0])
    }

    /// Add a group of binary variables with one variable per period
    pub fn add_binary_series(&mut self, name: &str, role: Role, len: usize) -> Result<Vec<Variable>> {
        self.add_group(name, role, len, true, 0.0, 1.0, true)
    }

    /// Add a group containing a single binary variable
    pub fn add_binary_scalar(&mut self, name: &str, role: Role) -> Result<Variable> {
        let vars = self.add_group(name, role, 1, false, 0.0, 1.0, true)?;
        Ok(vars[0])
    }

    #[allow(clippy::too_many_arguments)]
    fn add_group(
        &mut self,
        name: &str,
        role: Role,
        len: usize,
        is_series: bool,
        lower: f64,
        upper: f64,
        is_binary: bool,
    ) -> Result<Vec<Variable>> {
        ensure!(
            !self.groups.contains_key(name),
            "Variable group {name} has already been added to the problem"
        );
        ensure!(lower <= upper, "Bad bounds for variable group {name}");

        let start = self.columns.len();
        self.columns.extend((0..len).map(|_| Column {
            lower,
            upper,
            is_binary,
        }));
        let variables: Vec<_> = (start..self.columns.len()).map(Variable).collect();

        self.groups.insert(
            name.to_string(),
            VariableGroup {
                name: name.to_string(),
                role,
                variables: variables.clone(),
                is_series,
            },
        );

        Ok(variables)
    }

    /// Add a linear row `lower <= expr <= upper`.
    ///
    /// The constant part of `expr` is moved into the bounds.
    pub fn add_row(
        &mut self,
        role: Role,
        family: &str,
        expr: &LinearExpr,
        lower: f64,
        upper: f64,
    ) -> RowId {
        let expr = expr.normalised();
        let constant = expr.constant;
        let id = RowId(self.rows.len());
        self.rows.push(Row {
            expr: LinearExpr {
                terms: expr.terms,
                constant: 0.0,
            },
            lower: lower - constant,
            upper: upper - constant,
            role,
            family: family.to_string(),
        });

        id
    }

    /// Add the row `expr <= upper`
    pub fn add_le_row(&mut self, role: Role, family: &str, expr: &LinearExpr, upper: f64) -> RowId {
        self.add_row(role, family, expr, f64::NEG_INFINITY, upper)
    }

    /// Add the row `expr == rhs`
    pub fn add_eq_row(&mut self, role: Role, family: &str, expr: &LinearExpr, rhs: f64) -> RowId {
        self.add_row(role, family, expr, rhs, rhs)
    }

    /// Add a product-zero row `lhs * rhs == 0`
    pub fn add_bilinear_row(&mut self, family: &str, lhs: &LinearExpr, rhs: &LinearExpr) {
        self.bilinear_rows.push(BilinearRow {
            lhs: lhs.normalised(),
            rhs: rhs.normalised(),
            family: family.to_string(),
        });
    }

    /// Change the bounds of an existing row
    pub fn set_row_bounds(&mut self, row: RowId, lower: f64, upper: f64) {
        let row = &mut self.rows[row.0];
        row.lower = lower;
        row.upper = upper;
    }

    /// Define (or replace) an objective.
    ///
    /// The first objective defined becomes the active one.
    pub fn set_objective(&mut self, kind: ObjectiveKind, sense: Sense, expr: &LinearExpr) {
        self.objectives.insert(
            kind,
            Objective {
                expr: expr.normalised(),
                sense,
            },
        );
        self.active_objective.get_or_insert(kind);
    }

    /// Change the coefficient of a variable in an existing objective
    pub fn set_objective_coefficient(
        &mut self,
        kind: ObjectiveKind,
        variable: Variable,
        coeff: f64,
    ) -> Result<()> {
        let objective = self
            .objectives
            .get_mut(&kind)
            .with_context(|| format!("No {kind:?} objective has been defined"))?;
        objective.expr.terms.retain(|(var, _)| *var != variable);
        if coeff != 0.0 {
            objective.expr.terms.push((variable, coeff));
        }

        Ok(())
    }

    /// Make the specified objective the active one
    pub fn activate_objective(&mut self, kind: ObjectiveKind) -> Result<()> {
        if !self.objectives.contains_key(&kind) {
            bail!("Cannot activate {kind:?} objective: it has not been defined");
        }
        self.active_objective = Some(kind);

        Ok(())
    }

    /// The active objective, if any objective has been defined
    pub fn active_objective(&self) -> Option<(ObjectiveKind, &Objective)> {
        let kind = self.active_objective?;
        Some((kind, &self.objectives[&kind]))
    }

    /// Get an objective by kind, whether or not it is active
    pub fn objective(&self, kind: ObjectiveKind) -> Option<&Objective> {
        self.objectives.get(&kind)
    }

    /// The total number of variables
    pub fn num_variables(&self) -> usize {
        self.columns.len()
    }

    /// Iterate over every variable in column order
    pub fn iter_variables(&self) -> impl Iterator<Item = Variable> + use<> {
        (0..self.columns.len()).map(Variable)
    }

    /// Bounds of a variable as `(lower, upper)`
    pub fn bounds(&self, variable: Variable) -> (f64, f64) {
        let column = &self.columns[variable.0];
        (column.lower, column.upper)
    }

    /// Whether a variable is binary
    pub fn is_binary(&self, variable: Variable) -> bool {
        self.columns[variable.0].is_binary
    }

    /// Whether the problem contains any binary variables
    pub fn has_binaries(&self) -> bool {
        self.columns.iter().any(|column| column.is_binary)
    }

    /// Look up a variable group by name
    pub fn group(&self, name: &str) -> Option<&VariableGroup> {
        self.groups.get(name)
    }

    /// Iterate over variable groups in the order in which they were added
    pub fn iter_groups(&self) -> impl Iterator<Item = &VariableGroup> {
        self.groups.values()
    }

    /// Iterate over variable groups with the given role
    pub fn iter_groups_with_role(&self, role: Role) -> impl Iterator<Item = &VariableGroup> {
        self.groups.values().filter(move |group| group.role == role)
    }

    /// The linear rows of the problem
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The linear rows with the given role
    pub fn iter_rows_with_role(&self, role: Role) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(move |row| row.role == role)
    }

    /// The product-zero rows of the problem
    pub fn bilinear_rows(&self) -> &[BilinearRow] {
        &self.bilinear_rows
    }

    /// Whether every row of the problem is linear
    pub fn is_linear(&self) -> bool {
        self.bilinear_rows.is_empty()
    }
}
