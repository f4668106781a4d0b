use crate::error::{Result, ScanError};

/// Column layout for a whitespace-delimited table.
///
/// `names` label the columns that are kept. Without a column subset the row must
/// carry exactly one field per name; with `use_columns` the listed field
/// positions are picked (in order) and anything else on the row is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    names: Vec<String>,
    use_columns: Option<Vec<usize>>,
    index_column: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowMode {
    /// Extra fields are an error.
    Strict,
    /// Extra fields are kept positionally after the named ones.
    Headerless,
}

impl ColumnSpec {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            use_columns: None,
            index_column: None,
        }
    }

    /// Keeps only the fields at these positions, in this order.
    pub fn use_columns(mut self, columns: &[usize]) -> Self {
        self.use_columns = Some(columns.to_vec());
        self
    }

    /// Marks one of the named columns as the row key.
    pub fn index(mut self, column: usize) -> Self {
        self.index_column = Some(column);
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_column(&self) -> Option<usize> {
        self.index_column
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(columns) = &self.use_columns
            && columns.len() != self.names.len()
        {
            return Err(ScanError::Configuration(format!(
                "{} column names given for {} selected columns",
                self.names.len(),
                columns.len()
            )));
        }
        if let Some(index) = self.index_column
            && index >= self.names.len()
        {
            return Err(ScanError::Configuration(format!(
                "index column {index} is out of range for {} columns",
                self.names.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn select(&self, fields: &[&str], offset: u64, mode: RowMode) -> Result<TableRow> {
        if let Some(columns) = &self.use_columns {
            let needed = columns.iter().max().map_or(0, |max| max + 1);
            if fields.len() < needed {
                return Err(ScanError::MalformedTable {
                    expected: needed,
                    found: fields.len(),
                    offset,
                });
            }
            return Ok(TableRow {
                offset,
                values: columns.iter().map(|&c| fields[c].to_owned()).collect(),
                extra: Vec::new(),
            });
        }

        let expected = self.names.len();
        let too_many = fields.len() > expected && mode == RowMode::Strict;
        if fields.len() < expected || too_many {
            return Err(ScanError::MalformedTable {
                expected,
                found: fields.len(),
                offset,
            });
        }
        Ok(TableRow {
            offset,
            values: fields[..expected].iter().map(|f| (*f).to_owned()).collect(),
            extra: fields[expected..].iter().map(|f| (*f).to_owned()).collect(),
        })
    }
}

/// One table row. `extra` holds unnamed trailing fields from a headerless reread.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub offset: u64,
    pub values: Vec<String>,
    pub extra: Vec<String>,
}

/// Rows read by [`ScanCursor::read_table`](crate::cursor::ScanCursor::read_table).
///
/// `end_offset` is the byte position of the first line after the table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBlock {
    pub columns: Vec<String>,
    pub index_column: Option<usize>,
    pub rows: Vec<TableRow>,
    pub start_offset: u64,
    pub end_offset: u64,
}

impl TableBlock {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ScanError::Configuration(format!("table has no column named {name:?}")))
    }

    /// Values of the named column, top to bottom.
    pub fn column(&self, name: &str) -> Result<Vec<&str>> {
        let pos = self.position(name)?;
        Ok(self.rows.iter().map(|r| r.values[pos].as_str()).collect())
    }

    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let pos = self.position(name)?;
        self.rows
            .iter()
            .map(|r| parse_number(&r.values[pos], r.offset))
            .collect()
    }

    /// Values of `value` reordered to follow `order`, matching rows on `key`.
    ///
    /// A key missing from `order` is an error; an entry of `order` with no row
    /// stays NaN.
    pub fn aligned_numeric_column(&self, key: &str, value: &str, order: &[String]) -> Result<Vec<f64>> {
        let key_pos = self.position(key)?;
        let value_pos = self.position(value)?;
        let mut out = vec![f64::NAN; order.len()];
        for row in &self.rows {
            let name = &row.values[key_pos];
            let slot = order
                .iter()
                .position(|p| p == name)
                .ok_or_else(|| ScanError::UnknownParameter {
                    name: name.clone(),
                    offset: row.offset,
                })?;
            out[slot] = parse_number(&row.values[value_pos], row.offset)?;
        }
        Ok(out)
    }

    /// Row keys, if the table was read with an index column.
    pub fn index(&self) -> Option<Vec<&str>> {
        let pos = self.index_column?;
        Some(self.rows.iter().map(|r| r.values[pos].as_str()).collect())
    }
}

/// Parses a numeric token, accepting Fortran `D` exponents.
pub fn parse_number(token: &str, offset: u64) -> Result<f64> {
    token
        .parse::<f64>()
        .or_else(|_| token.replace(['D', 'd'], "E").parse::<f64>())
        .map_err(|_| ScanError::NumericConversion {
            token: token.to_owned(),
            offset,
        })
}
