//! Sensitivity file (`.sen`) extraction.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::Path;

use crate::cursor::{Case, DEFAULT_COMMENT_PREFIXES, Landing, PhraseMatch, ScanCursor};
use crate::error::{Result, ScanError, SectionContext};
use crate::ir::{
    CompositeSensitivity, CompositeSensitivityRow, ObservationGroupSensitivity,
    SensitivityHistory, SensitivityIterationRecord,
};
use crate::table::{ColumnSpec, TableBlock};

/// Group name given to the composite over all observations and prior information.
pub const ALL_GROUPS: &str = "All";

const COMPOSITE_PHRASE: &str = "Composite";
const GROUP_NAME_FIELD: isize = 5;
/// The all-groups line has "...prior info" where a group line has its quoted
/// name. Tied to the tool's wording; kept as written.
const ALL_GROUPS_TOKEN: &str = "info";

/// Drives a [`ScanCursor`] through a sensitivity file.
pub struct SensitivityLogExtractor<R> {
    cursor: ScanCursor<R>,
    parameter_names: Vec<String>,
    parameter_groups: Vec<String>,
    iterations: Vec<SensitivityIterationRecord>,
    observation_groups: Vec<ObservationGroupSensitivity>,
}

impl SensitivityLogExtractor<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ScanCursor::open(path)?))
    }
}

/// Reads a sensitivity file.
pub fn read_sen(path: impl AsRef<Path>) -> Result<SensitivityHistory> {
    SensitivityLogExtractor::open(path)?.extract()
}

impl<R: BufRead + Seek> SensitivityLogExtractor<R> {
    pub fn new(cursor: ScanCursor<R>) -> Self {
        Self {
            cursor,
            parameter_names: Vec::new(),
            parameter_groups: Vec::new(),
            iterations: Vec::new(),
            observation_groups: Vec::new(),
        }
    }

    pub fn extract(mut self) -> Result<SensitivityHistory> {
        self.read_iterations().in_section("parameter sensitivities")?;
        log::info!(
            "Read parameters and sensitivities for {} iterations",
            self.iterations.len()
        );

        self.read_observation_groups()
            .in_section("composite sensitivities")?;
        log::info!(
            "Read composite sensitivities for {} observation groups",
            self.observation_groups.len()
        );

        Ok(SensitivityHistory {
            parameter_names: self.parameter_names,
            parameter_groups: self.parameter_groups,
            iterations: self.iterations,
            observation_groups: self.observation_groups,
        })
    }

    fn read_iterations(&mut self) -> Result<()> {
        while self
            .cursor
            .probe_phrase("iteration", Landing::AfterLine, Case::Insensitive)?
            .is_some()
        {
            let iteration = self.iterations.len() + 1;
            let value_label = format!("Value_{iteration}");
            let sensitivity_label = format!("Sensitivity_{iteration}");
            // Column headers
            self.cursor.skip_lines(1)?;

            let offset = self.cursor.offset();
            let count = self.cursor.measure_block_length(DEFAULT_COMMENT_PREFIXES)?;
            let (values, sensitivities) = if iteration == 1 {
                if count == 0 {
                    return Err(ScanError::EmptyTable { offset });
                }
                log::debug!("{count} parameters in the first iteration table");
                let spec = ColumnSpec::new([
                    "Parameter",
                    "Param_Group",
                    value_label.as_str(),
                    sensitivity_label.as_str(),
                ])
                .index(0);
                let table = self.cursor.read_table(Some(count), &spec, true)?;
                self.parameter_names = owned(table.column("Parameter")?);
                self.parameter_groups = owned(table.column("Param_Group")?);
                (
                    table.numeric_column(&value_label)?,
                    table.numeric_column(&sensitivity_label)?,
                )
            } else {
                if count != self.parameter_names.len() {
                    return Err(ScanError::RowCount {
                        expected: self.parameter_names.len(),
                        found: count,
                        offset,
                    });
                }
                let spec = ColumnSpec::new([
                    "Parameter",
                    value_label.as_str(),
                    sensitivity_label.as_str(),
                ])
                .use_columns(&[0, 2, 3])
                .index(0);
                let table = self.cursor.read_table(Some(count), &spec, true)?;
                (
                    table.aligned_numeric_column("Parameter", &value_label, &self.parameter_names)?,
                    table.aligned_numeric_column(
                        "Parameter",
                        &sensitivity_label,
                        &self.parameter_names,
                    )?,
                )
            };

            self.iterations.push(SensitivityIterationRecord {
                iteration,
                values,
                sensitivities,
            });
        }
        Ok(())
    }

    fn read_observation_groups(&mut self) -> Result<()> {
        loop {
            let offset = self.cursor.offset();
            let Some(hit) =
                self.cursor
                    .probe_phrase(COMPOSITE_PHRASE, Landing::AfterLine, Case::Insensitive)?
            else {
                if self.observation_groups.is_empty() {
                    log::warn!("no composite sensitivities after byte {offset}");
                    return Ok(());
                }
                return Err(ScanError::EndOfInput {
                    expected: COMPOSITE_PHRASE.to_owned(),
                    offset,
                });
            };

            let group = group_name(&hit)?;
            let sensitivity = if self.has_contribution()? {
                // Column headers
                self.cursor.skip_lines(1)?;
                CompositeSensitivity::Present(self.read_composite_table()?)
            } else {
                CompositeSensitivity::NoContribution
            };
            log::debug!("composite sensitivities for {group:?}");

            let done = group == ALL_GROUPS;
            self.observation_groups
                .push(ObservationGroupSensitivity { group, sensitivity });
            if done {
                return Ok(());
            }
        }
    }

    /// Whether the line after the next "observations" line does not start with "No".
    fn has_contribution(&mut self) -> Result<bool> {
        self.cursor
            .find_phrase("observations", Landing::AfterLine, Case::Insensitive)?;
        let offset = self.cursor.offset();
        let next = self.cursor.read_clean_line()?;
        self.cursor.rewind_to(offset)?;
        Ok(!next.starts_with("No"))
    }

    fn read_composite_table(&mut self) -> Result<Vec<CompositeSensitivityRow>> {
        let count = if self.iterations.is_empty() {
            self.cursor.measure_block_length(DEFAULT_COMMENT_PREFIXES)?
        } else {
            self.parameter_names.len()
        };
        let spec = ColumnSpec::new(["Parameter", "Param_Group", "Value", "Sensitivity"]).index(0);
        let table = self.cursor.read_table(Some(count), &spec, true)?;

        if self.iterations.is_empty() && self.parameter_names.is_empty() {
            self.parameter_names = owned(table.column("Parameter")?);
            self.parameter_groups = owned(table.column("Param_Group")?);
        }
        composite_rows(&table)
    }
}

fn composite_rows(table: &TableBlock) -> Result<Vec<CompositeSensitivityRow>> {
    let parameters = table.column("Parameter")?;
    let groups = table.column("Param_Group")?;
    let values = table.numeric_column("Value")?;
    let sensitivities = table.numeric_column("Sensitivity")?;
    Ok(parameters
        .into_iter()
        .zip(groups)
        .zip(values)
        .zip(sensitivities)
        .map(|(((parameter, group), value), sensitivity)| CompositeSensitivityRow {
            parameter: parameter.to_owned(),
            group: group.to_owned(),
            value,
            sensitivity,
        })
        .collect())
}

/// Group name from a "Composite" line, unquoted; [`ALL_GROUPS`] for the
/// all-groups line.
fn group_name(hit: &PhraseMatch) -> Result<String> {
    let token = hit
        .field(GROUP_NAME_FIELD)
        .ok_or_else(|| ScanError::MalformedLine {
            index: GROUP_NAME_FIELD,
            line: hit.line.trim().to_owned(),
            offset: hit.offset,
        })?;
    let name = token.trim_matches(['"', '\'']);
    if name == ALL_GROUPS_TOKEN {
        Ok(ALL_GROUPS.to_owned())
    } else {
        Ok(name.to_owned())
    }
}

fn owned(column: Vec<&str>) -> Vec<String> {
    column.into_iter().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(line: &str) -> PhraseMatch {
        PhraseMatch {
            offset: 0,
            line: line.to_owned(),
        }
    }

    #[test]
    fn test_group_name_strips_quotes() {
        let line = " Composite sensitivities for observation group \"head\" ----->";
        assert_eq!(group_name(&hit(line)).unwrap(), "head");
        let line = " Composite sensitivities for observation group 'flow' ----->";
        assert_eq!(group_name(&hit(line)).unwrap(), "flow");
    }

    #[test]
    fn test_group_name_all_sentinel() {
        let line = " Composite sensitivities for all observations/prior info ----->";
        assert_eq!(group_name(&hit(line)).unwrap(), ALL_GROUPS);
    }

    #[test]
    fn test_group_name_short_line() {
        let err = group_name(&hit("Composite sensitivities")).unwrap_err();
        assert!(matches!(err, ScanError::MalformedLine { index: 5, .. }));
    }
}
