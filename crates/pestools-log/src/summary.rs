//! Per-iteration summary of an optimisation history.

use std::fmt;

use serde::Serialize;

use crate::ir::OptimizationHistory;

/// Population variance (divides by `n`). NaN for an empty slice.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub label: String,
    pub phi: f64,
    /// `None` for the initial record.
    pub variance: Option<f64>,
    /// Regularisation weight factor, regularisation mode only.
    pub weight_multiplier: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub regularisation: bool,
    pub rows: Vec<SummaryRow>,
}

impl OptimizationHistory {
    /// One row per record. `None` when the run has no completed iteration.
    pub fn summary(&self) -> Option<Summary> {
        if self.iteration_count() == 0 {
            return None;
        }
        let regularisation = self.is_regularisation();
        let rows = self
            .records
            .iter()
            .map(|r| SummaryRow {
                label: r.label(),
                phi: r.phi,
                variance: r
                    .iteration
                    .checked_sub(1)
                    .and_then(|i| self.variances.get(i).copied()),
                weight_multiplier: r
                    .regularisation
                    .filter(|_| regularisation)
                    .map(|t| t.weight_factor),
            })
            .collect();
        Some(Summary {
            regularisation,
            rows,
        })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<12}{:>14}{:>14}", "Iteration", "Phi", "Variance")?;
        if self.regularisation {
            write!(f, "{:>14}", "Weight")?;
        }
        writeln!(f)?;

        for row in &self.rows {
            let variance = row.variance.map_or_else(|| "-".to_owned(), |v| format!("{v:.4}"));
            write!(f, "{:<12}{:>14.4}{:>14}", row.label, row.phi, variance)?;
            if self.regularisation {
                let weight = row
                    .weight_multiplier
                    .map_or_else(|| "-".to_owned(), |w| format!("{w:.4}"));
                write!(f, "{weight:>14}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
