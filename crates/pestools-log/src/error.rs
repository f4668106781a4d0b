use thiserror::Error;

/// Errors raised while scanning a log or assembling records from it.
///
/// Offsets are byte positions in the source at the point of failure.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The source ran out before `expected` was seen.
    #[error("end of input at byte {offset} while looking for {expected:?}")]
    EndOfInput { expected: String, offset: u64 },

    #[error("line at byte {offset} has no field {index}: {line:?}")]
    MalformedLine {
        index: isize,
        line: String,
        offset: u64,
    },

    #[error("table row at byte {offset} has {found} fields, expected {expected}")]
    MalformedTable {
        expected: usize,
        found: usize,
        offset: u64,
    },

    #[error("no table rows at byte {offset}")]
    EmptyTable { offset: u64 },

    /// A table's row count disagrees with the count established earlier in the file.
    #[error("table at byte {offset} has {found} rows, expected {expected}")]
    RowCount {
        expected: usize,
        found: usize,
        offset: u64,
    },

    #[error("invalid cursor request: {0}")]
    Configuration(String),

    #[error("expected a number at byte {offset}, found {token:?}")]
    NumericConversion { token: String, offset: u64 },

    /// The lambda search ran past its terminal markers.
    #[error("lambda search in iteration {iteration} ended without a recognized terminator at byte {offset}")]
    UnrecognizedLambdaTerminator { iteration: usize, offset: u64 },

    /// Every lambda tested in an iteration reported a failed model run.
    #[error("no lambda in iteration {iteration} produced a finite phi")]
    NoSuccessfulLambda { iteration: usize },

    #[error("parameter {name:?} at byte {offset} is not in the initial parameter table")]
    UnknownParameter { name: String, offset: u64 },

    #[error("in {section}")]
    InSection {
        section: &'static str,
        #[source]
        source: Box<ScanError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Returns the innermost error, looking through section wrappers.
    pub fn root(&self) -> &ScanError {
        match self {
            ScanError::InSection { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Attaches the name of the extractor section a failure occurred in.
pub(crate) trait SectionContext<T> {
    fn in_section(self, section: &'static str) -> Result<T>;
}

impl<T> SectionContext<T> for Result<T> {
    fn in_section(self, section: &'static str) -> Result<T> {
        self.map_err(|source| match source {
            // Keep the innermost section name.
            wrapped @ ScanError::InSection { .. } => wrapped,
            source => ScanError::InSection {
                section,
                source: Box::new(source),
            },
        })
    }
}
