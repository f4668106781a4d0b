use serde::Serialize;

/// Counts from the "Case dimensions" block of a run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaseDimensions {
    pub parameters: usize,
    pub adjustable_parameters: usize,
    pub parameter_groups: usize,
    pub observations: usize,
    pub prior_information: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub name: String,
    pub value: f64,
    pub weight: f64,
    pub group: String,
}

/// Objective function terms reported in regularisation mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegularisationTerms {
    pub weight_factor: f64,
    pub measurement_phi: f64,
    pub regularisation_phi: f64,
}

/// One tested Marquardt lambda. `phi` is NaN when the model run failed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LambdaTrial {
    pub lambda: f64,
    pub phi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    /// 0 for the initial conditions.
    pub iteration: usize,
    pub model_calls: Option<u64>,
    pub phi: f64,
    pub regularisation: Option<RegularisationTerms>,
    /// Phi contribution per observation group, in group order.
    pub group_contributions: Vec<f64>,
    /// Lambda with the lowest phi; `None` for the initial record.
    pub lambda: Option<f64>,
    pub lambda_trials: Vec<LambdaTrial>,
    /// Parameter values, in the order of the history's parameter names.
    pub parameter_values: Vec<f64>,
}

impl IterationRecord {
    pub fn label(&self) -> String {
        iteration_label(self.iteration)
    }
}

pub(crate) fn iteration_label(iteration: usize) -> String {
    if iteration == 0 {
        "Initial".to_owned()
    } else {
        format!("Iteration {iteration}")
    }
}

/// Everything extracted from a run record file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationHistory {
    pub pest_version: f64,
    /// The run mode line as written, e.g. `Regularisation mode`.
    pub run_mode: String,
    pub dimensions: CaseDimensions,
    pub observations: Vec<Observation>,
    /// Distinct groups of `observations`, in order of first appearance.
    pub observation_groups: Vec<String>,
    pub parameter_names: Vec<String>,
    pub records: Vec<IterationRecord>,
    /// Population variance of the parameter change since the initial record, one
    /// entry per non-initial record.
    pub variances: Vec<f64>,
}

impl OptimizationHistory {
    pub fn is_regularisation(&self) -> bool {
        self.run_mode == crate::rec::REGULARISATION_MODE
    }

    /// Number of completed optimisation iterations, not counting the initial record.
    pub fn iteration_count(&self) -> usize {
        self.records.len().saturating_sub(1)
    }

    pub fn phi(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.phi).collect()
    }

    /// Chosen lambdas of the non-initial records.
    pub fn lambdas(&self) -> Vec<f64> {
        self.records.iter().filter_map(|r| r.lambda).collect()
    }

    /// Phi contribution of one observation group across all records.
    pub fn group_contribution(&self, group: &str) -> Option<Vec<f64>> {
        let pos = self.observation_groups.iter().position(|g| g == group)?;
        Some(
            self.records
                .iter()
                .map(|r| r.group_contributions[pos])
                .collect(),
        )
    }

    /// Parameter values with one column per record: `Initial`, `Iteration 1`, ...
    pub fn parameter_table(&self) -> ParameterTable {
        ParameterTable {
            parameters: self.parameter_names.clone(),
            columns: self
                .records
                .iter()
                .map(|r| ParameterColumn {
                    label: r.label(),
                    values: r.parameter_values.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterColumn {
    pub label: String,
    pub values: Vec<f64>,
}

/// Numeric columns over a shared parameter-name index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterTable {
    pub parameters: Vec<String>,
    pub columns: Vec<ParameterColumn>,
}

impl ParameterTable {
    pub fn labels(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.label.as_str()).collect()
    }

    pub fn column(&self, label: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.values.as_slice())
    }

    /// Every column's value for one parameter.
    pub fn row(&self, parameter: &str) -> Option<Vec<f64>> {
        let pos = self.parameters.iter().position(|p| p == parameter)?;
        Some(self.columns.iter().map(|c| c.values[pos]).collect())
    }
}

/// Values and sensitivities of every parameter at one iteration of a
/// sensitivity file. Iterations are numbered from 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityIterationRecord {
    pub iteration: usize,
    pub values: Vec<f64>,
    pub sensitivities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeSensitivityRow {
    pub parameter: String,
    pub group: String,
    pub value: f64,
    pub sensitivity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "rows")]
pub enum CompositeSensitivity {
    Present(Vec<CompositeSensitivityRow>),
    /// The group has no observations or prior information with non-zero weight.
    NoContribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationGroupSensitivity {
    /// Group name; `All` for the composite over every group.
    pub group: String,
    pub sensitivity: CompositeSensitivity,
}

/// Everything extracted from a sensitivity file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityHistory {
    pub parameter_names: Vec<String>,
    /// Group of each parameter, as first reported.
    pub parameter_groups: Vec<String>,
    pub iterations: Vec<SensitivityIterationRecord>,
    pub observation_groups: Vec<ObservationGroupSensitivity>,
}

impl SensitivityHistory {
    pub fn iteration_count(&self) -> usize {
        self.iterations.len()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_names.len()
    }

    /// Distinct parameter groups in order of first appearance.
    pub fn distinct_parameter_groups(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for group in &self.parameter_groups {
            if !seen.contains(&group.as_str()) {
                seen.push(group);
            }
        }
        seen
    }

    /// Parameter values with columns `Value_1`, `Value_2`, ...
    pub fn value_table(&self) -> ParameterTable {
        self.table("Value", |r| &r.values)
    }

    /// Parameter sensitivities with columns `Sensitivity_1`, `Sensitivity_2`, ...
    pub fn sensitivity_table(&self) -> ParameterTable {
        self.table("Sensitivity", |r| &r.sensitivities)
    }

    fn table(
        &self,
        prefix: &str,
        pick: impl Fn(&SensitivityIterationRecord) -> &Vec<f64>,
    ) -> ParameterTable {
        ParameterTable {
            parameters: self.parameter_names.clone(),
            columns: self
                .iterations
                .iter()
                .map(|r| ParameterColumn {
                    label: format!("{prefix}_{}", r.iteration),
                    values: pick(r).clone(),
                })
                .collect(),
        }
    }

    pub fn group(&self, name: &str) -> Option<&CompositeSensitivity> {
        self.observation_groups
            .iter()
            .find(|g| g.group == name)
            .map(|g| &g.sensitivity)
    }

    /// Composite sensitivity of one parameter in every group that has a table.
    ///
    /// Groups without contribution are left out. Returns `None` for a parameter
    /// the file never listed. A present table lacking the parameter yields NaN
    /// for that group.
    pub fn parameter_sensitivity(&self, parameter: &str) -> Option<Vec<(String, f64)>> {
        if !self.parameter_names.iter().any(|p| p == parameter) {
            return None;
        }
        let by_group = self
            .observation_groups
            .iter()
            .filter_map(|g| match &g.sensitivity {
                CompositeSensitivity::Present(rows) => {
                    let sensitivity = rows
                        .iter()
                        .find(|r| r.parameter == parameter)
                        .map_or(f64::NAN, |r| r.sensitivity);
                    Some((g.group.clone(), sensitivity))
                }
                CompositeSensitivity::NoContribution => None,
            })
            .collect();
        Some(by_group)
    }
}
