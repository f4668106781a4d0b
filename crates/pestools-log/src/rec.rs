//! Run record (`.rec`) extraction.
//!
//! The record is walked in a fixed order: header, observation table, the initial
//! conditions, then one record per optimisation iteration until no further
//! iteration marker exists.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::Path;

use crate::cursor::{Case, Landing, ScanCursor, split_field};
use crate::error::{Result, ScanError, SectionContext};
use crate::ir::{
    CaseDimensions, IterationRecord, LambdaTrial, Observation, OptimizationHistory,
    RegularisationTerms, iteration_label,
};
use crate::summary::population_variance;
use crate::table::{ColumnSpec, parse_number};

/// Run mode line that switches on the regularisation preamble.
pub const REGULARISATION_MODE: &str = "Regularisation mode";

const ITERATION_MARKER: &str = "OPTIMISATION ITERATION NO";
/// First token of the phi reported for a failed model run ("cannot compute").
const FAILED_RUN_SENTINEL: &str = "cannot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecState {
    Header,
    Observations,
    InitialIterationRecord,
    RepeatIterationRecord,
    Done,
}

/// Drives a [`ScanCursor`] through a run record and collects its iteration history.
pub struct OptimizationLogExtractor<R> {
    cursor: ScanCursor<R>,
    state: RecState,
    pest_version: f64,
    run_mode: String,
    dimensions: CaseDimensions,
    observations: Vec<Observation>,
    observation_groups: Vec<String>,
    parameter_names: Vec<String>,
    records: Vec<IterationRecord>,
}

impl OptimizationLogExtractor<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ScanCursor::open(path)?))
    }
}

/// Reads a run record file.
pub fn read_rec(path: impl AsRef<Path>) -> Result<OptimizationHistory> {
    OptimizationLogExtractor::open(path)?.extract()
}

impl<R: BufRead + Seek> OptimizationLogExtractor<R> {
    pub fn new(cursor: ScanCursor<R>) -> Self {
        Self {
            cursor,
            state: RecState::Header,
            pest_version: f64::NAN,
            run_mode: String::new(),
            dimensions: CaseDimensions {
                parameters: 0,
                adjustable_parameters: 0,
                parameter_groups: 0,
                observations: 0,
                prior_information: 0,
            },
            observations: Vec::new(),
            observation_groups: Vec::new(),
            parameter_names: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Runs the extraction to the end of the record. The cursor is released when
    /// this returns, whether or not it succeeded.
    pub fn extract(mut self) -> Result<OptimizationHistory> {
        loop {
            let next = match self.state {
                RecState::Header => {
                    self.read_header().in_section("header")?;
                    RecState::Observations
                }
                RecState::Observations => {
                    self.read_observations().in_section("observations")?;
                    RecState::InitialIterationRecord
                }
                RecState::InitialIterationRecord => {
                    self.read_initial_record().in_section("initial conditions")?;
                    RecState::RepeatIterationRecord
                }
                RecState::RepeatIterationRecord => {
                    if self.read_next_record().in_section("optimisation iteration")? {
                        RecState::RepeatIterationRecord
                    } else {
                        RecState::Done
                    }
                }
                RecState::Done => break,
            };
            log::debug!(
                "{:?} -> {:?} at byte {}",
                self.state,
                next,
                self.cursor.offset()
            );
            self.state = next;
        }

        log::info!(
            "End of record file reached, {} iterations",
            self.records.len().saturating_sub(1)
        );
        Ok(self.finish())
    }

    fn is_regularisation(&self) -> bool {
        self.run_mode == REGULARISATION_MODE
    }

    fn read_header(&mut self) -> Result<()> {
        let version = self
            .cursor
            .find_phrase("version", Landing::LineStart, Case::Insensitive)?;
        let token = self.cursor.read_field(2)?;
        self.pest_version = parse_number(token.trim_end_matches(['.', ',']), version.offset)?;

        self.cursor
            .find_phrase("PEST run mode", Landing::AfterLine, Case::Insensitive)?;
        self.cursor.advance_to_next_nonblank()?;
        self.run_mode = self.cursor.read_clean_line()?;

        self.cursor
            .find_phrase("Case dimensions", Landing::AfterLine, Case::Insensitive)?;
        self.cursor.advance_to_next_nonblank()?;
        self.dimensions = CaseDimensions {
            parameters: self.read_dimension()?,
            adjustable_parameters: self.read_dimension()?,
            parameter_groups: self.read_dimension()?,
            observations: self.read_dimension()?,
            prior_information: self.read_dimension()?,
        };
        log::debug!(
            "PEST {} in {:?}: {:?}",
            self.pest_version,
            self.run_mode,
            self.dimensions
        );
        Ok(())
    }

    /// Reads `label   :   count`, taking the field after the lone colon.
    fn read_dimension(&mut self) -> Result<usize> {
        let offset = self.cursor.offset();
        let line = self.cursor.read_clean_line()?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let index = fields
            .iter()
            .position(|f| *f == ":")
            .map_or(fields.len(), |colon| colon + 1);
        let Some(count) = fields.get(index) else {
            return Err(ScanError::MalformedLine {
                index: index as isize,
                line,
                offset,
            });
        };
        count.parse().map_err(|_| ScanError::NumericConversion {
            token: (*count).to_owned(),
            offset,
        })
    }

    fn read_observations(&mut self) -> Result<()> {
        self.cursor
            .find_phrase("Observations:", Landing::AfterLine, Case::Insensitive)?;
        self.cursor.advance_to_next_nonblank()?;
        self.cursor.skip_lines(1)?;

        let spec = ColumnSpec::new(["Observation name", "Observation", "Weight", "Group"]).index(0);
        let table = self
            .cursor
            .read_table(Some(self.dimensions.observations), &spec, true)?;

        let names = table.column("Observation name")?;
        let values = table.numeric_column("Observation")?;
        let weights = table.numeric_column("Weight")?;
        let groups = table.column("Group")?;

        for group in &groups {
            if !self.observation_groups.iter().any(|g| g == group) {
                self.observation_groups.push((*group).to_owned());
            }
        }
        self.observations = names
            .into_iter()
            .zip(values)
            .zip(weights)
            .zip(groups)
            .map(|(((name, value), weight), group)| Observation {
                name: name.to_owned(),
                value,
                weight,
                group: group.to_owned(),
            })
            .collect();

        log::debug!(
            "{} observations in groups {:?}",
            self.observations.len(),
            self.observation_groups
        );
        Ok(())
    }

    fn read_initial_record(&mut self) -> Result<()> {
        self.cursor
            .find_phrase("OPTIMISATION RECORD", Landing::AfterLine, Case::Sensitive)?;
        self.cursor.advance_to_next_nonblank()?;
        // INITIAL CONDITIONS:
        self.cursor.skip_lines(1)?;
        self.read_record(None)
    }

    /// Reads the next iteration record. `false` once no iteration marker remains.
    fn read_next_record(&mut self) -> Result<bool> {
        if self
            .cursor
            .probe_phrase(ITERATION_MARKER, Landing::AfterLine, Case::Sensitive)?
            .is_none()
        {
            return Ok(false);
        }
        let offset = self.cursor.offset();
        let token = self.cursor.read_field(-1)?;
        let Ok(model_calls) = token.parse::<u64>() else {
            return Err(ScanError::NumericConversion { token, offset });
        };
        self.read_record(Some(model_calls))?;
        Ok(true)
    }

    fn read_record(&mut self, model_calls: Option<u64>) -> Result<()> {
        let iteration = self.records.len();

        let regularisation = if self.is_regularisation() {
            let terms = RegularisationTerms {
                weight_factor: self.cursor.read_number(-1)?,
                measurement_phi: self.cursor.read_number(-1)?,
                regularisation_phi: self.cursor.read_number(-1)?,
            };
            let anchor = if iteration == 0 {
                "Sum of squared weighted residuals"
            } else {
                "Starting phi"
            };
            self.cursor
                .find_phrase(anchor, Landing::LineStart, Case::Insensitive)?;
            Some(terms)
        } else {
            None
        };

        let phi = self.cursor.read_number(-1)?;
        let mut group_contributions = Vec::with_capacity(self.observation_groups.len());
        for _ in 0..self.observation_groups.len() {
            group_contributions.push(self.cursor.read_number(-1)?);
        }

        let (lambda, lambda_trials) = if iteration == 0 {
            (None, Vec::new())
        } else {
            let trials = self.read_lambdas(iteration)?;
            let best = select_lambda(&trials).ok_or(ScanError::NoSuccessfulLambda { iteration })?;
            (Some(best), trials)
        };

        self.cursor
            .find_phrase("Current parameter values", Landing::AfterLine, Case::Insensitive)?;
        let label = iteration_label(iteration);
        let spec = ColumnSpec::new(["Parameter", label.as_str()])
            .use_columns(&[0, 1])
            .index(0);
        let table = self
            .cursor
            .read_table(Some(self.dimensions.parameters), &spec, true)?;

        let parameter_values = if iteration == 0 {
            self.parameter_names = table
                .column("Parameter")?
                .into_iter()
                .map(str::to_owned)
                .collect();
            table.numeric_column(&label)?
        } else {
            table.aligned_numeric_column("Parameter", &label, &self.parameter_names)?
        };

        log::debug!("{label}: phi {phi}, lambda {lambda:?}");
        self.records.push(IterationRecord {
            iteration,
            model_calls,
            phi,
            regularisation,
            group_contributions,
            lambda,
            lambda_trials,
            parameter_values,
        });
        Ok(())
    }

    /// Collects every lambda tested in one iteration.
    ///
    /// The first two are always present. Further candidates follow until either
    /// "No more lambdas" (consumed) or a line mentioning "Current" (left for the
    /// parameter table search).
    fn read_lambdas(&mut self, iteration: usize) -> Result<Vec<LambdaTrial>> {
        let mut trials = Vec::new();
        for _ in 0..2 {
            self.cursor
                .find_phrase("Lambda =", Landing::LineStart, Case::Insensitive)?;
            let lambda = self.cursor.read_number(2)?;
            let phi = self.read_trial_phi()?;
            trials.push(LambdaTrial { lambda, phi });
        }

        loop {
            let offset = self.cursor.offset();
            if self.cursor.at_end() {
                return Err(ScanError::UnrecognizedLambdaTerminator { iteration, offset });
            }
            let line = self.cursor.read_clean_line()?;

            if line.contains("No more lambdas") {
                break;
            }
            if line.contains("Current") {
                self.cursor.rewind_to(offset)?;
                break;
            }
            if line.contains(ITERATION_MARKER) {
                return Err(ScanError::UnrecognizedLambdaTerminator { iteration, offset });
            }
            if line.to_lowercase().starts_with("lambda =") {
                let token = split_field(&line, 2).ok_or_else(|| ScanError::MalformedLine {
                    index: 2,
                    line: line.clone(),
                    offset,
                })?;
                let lambda = parse_number(token, offset)?;
                let phi = self.read_trial_phi()?;
                trials.push(LambdaTrial { lambda, phi });
            }
        }
        Ok(trials)
    }

    fn read_trial_phi(&mut self) -> Result<f64> {
        let offset = self.cursor.offset();
        let token = self.cursor.read_field(2)?;
        if token.eq_ignore_ascii_case(FAILED_RUN_SENTINEL) {
            log::debug!("failed model run reported at byte {offset}");
            return Ok(f64::NAN);
        }
        parse_number(&token, offset)
    }

    fn finish(self) -> OptimizationHistory {
        let variances = match self.records.split_first() {
            Some((initial, rest)) => rest
                .iter()
                .map(|r| {
                    let deltas: Vec<f64> = r
                        .parameter_values
                        .iter()
                        .zip(&initial.parameter_values)
                        .map(|(current, start)| current - start)
                        .collect();
                    population_variance(&deltas)
                })
                .collect(),
            None => Vec::new(),
        };

        OptimizationHistory {
            pest_version: self.pest_version,
            run_mode: self.run_mode,
            dimensions: self.dimensions,
            observations: self.observations,
            observation_groups: self.observation_groups,
            parameter_names: self.parameter_names,
            records: self.records,
            variances,
        }
    }
}

/// Lambda with the lowest finite phi; ties keep the earliest. `None` if every
/// run failed.
pub fn select_lambda(trials: &[LambdaTrial]) -> Option<f64> {
    trials
        .iter()
        .filter(|t| !t.phi.is_nan())
        .fold(None::<&LambdaTrial>, |best, t| match best {
            Some(b) if b.phi <= t.phi => Some(b),
            _ => Some(t),
        })
        .map(|t| t.lambda)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(lambda: f64, phi: f64) -> LambdaTrial {
        LambdaTrial { lambda, phi }
    }

    #[test]
    fn test_select_lambda_lowest_phi() {
        let trials = [trial(5.0, 4.2), trial(2.0, 4.0)];
        assert_eq!(select_lambda(&trials), Some(2.0));
    }

    #[test]
    fn test_select_lambda_skips_failed_runs() {
        let trials = [trial(5.0, 4.2), trial(2.0, f64::NAN), trial(1.0, 4.3)];
        assert_eq!(select_lambda(&trials), Some(5.0));
    }

    #[test]
    fn test_select_lambda_ties_keep_first() {
        let trials = [trial(5.0, 1.0), trial(2.0, 1.0)];
        assert_eq!(select_lambda(&trials), Some(5.0));
    }

    #[test]
    fn test_select_lambda_all_failed() {
        let trials = [trial(5.0, f64::NAN), trial(2.0, f64::NAN)];
        assert_eq!(select_lambda(&trials), None);
    }
}
