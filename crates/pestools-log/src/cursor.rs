use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Result, ScanError};
use crate::table::{ColumnSpec, RowMode, TableBlock, parse_number};

/// Line prefixes treated as comments by [`ScanCursor::measure_block_length`].
pub const DEFAULT_COMMENT_PREFIXES: &[&str] = &["C", "c", "*"];

/// Where a successful phrase search leaves the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    /// After the matching line.
    AfterLine,
    /// At the first byte of the matching line.
    LineStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Sensitive,
    Insensitive,
}

/// A line located by a phrase search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseMatch {
    /// Byte offset of the start of the line.
    pub offset: u64,
    /// The line without its terminator.
    pub line: String,
}

impl PhraseMatch {
    pub fn field(&self, index: isize) -> Option<&str> {
        split_field(&self.line, index)
    }
}

struct RawLine {
    start: u64,
    text: String,
}

/// A byte-position-aware sequential reader over one text source.
///
/// The cursor only moves forward, except through [`rewind_to`](Self::rewind_to)
/// with an offset it has already reported. Dropping the cursor releases the
/// source, whichever way the caller exits.
pub struct ScanCursor<R> {
    reader: R,
    len: u64,
    offset: u64,
    buf: Vec<u8>,
}

impl ScanCursor<BufReader<File>> {
    /// Opens a file for scanning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: BufRead + Seek> ScanCursor<R> {
    /// Wraps a seekable reader. Scanning starts at the reader's current position.
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let offset = reader.stream_position()?;
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            reader,
            len,
            offset,
            buf: Vec::new(),
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total byte length of the source when it was opened.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn at_end(&self) -> bool {
        self.offset >= self.len
    }

    /// Moves back (or forward) to an offset previously reported by this cursor.
    pub fn rewind_to(&mut self, offset: u64) -> Result<()> {
        if offset > self.len {
            return Err(ScanError::Configuration(format!(
                "offset {offset} is past the end of a {}-byte source",
                self.len
            )));
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    fn next_line(&mut self) -> Result<Option<RawLine>> {
        self.buf.clear();
        let start = self.offset;
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.offset += n as u64;
        let text = String::from_utf8_lossy(&self.buf);
        Ok(Some(RawLine {
            start,
            text: text.trim_end_matches(['\n', '\r']).to_owned(),
        }))
    }

    fn expect_line(&mut self) -> Result<RawLine> {
        let offset = self.offset;
        self.next_line()?.ok_or_else(|| ScanError::EndOfInput {
            expected: "a line".to_owned(),
            offset,
        })
    }

    /// Reads one line with surrounding whitespace removed.
    pub fn read_clean_line(&mut self) -> Result<String> {
        Ok(self.expect_line()?.text.trim().to_owned())
    }

    /// Reads one line and returns its whitespace-separated field `index`.
    ///
    /// Negative indices count from the end of the line, `-1` being the last field.
    pub fn read_field(&mut self, index: isize) -> Result<String> {
        let line = self.expect_line()?;
        match split_field(&line.text, index) {
            Some(field) => Ok(field.to_owned()),
            None => Err(ScanError::MalformedLine {
                index,
                line: line.text.trim().to_owned(),
                offset: line.start,
            }),
        }
    }

    /// Like [`read_field`](Self::read_field), parsed as a number.
    pub fn read_number(&mut self, index: isize) -> Result<f64> {
        let offset = self.offset;
        let field = self.read_field(index)?;
        parse_number(&field, offset)
    }

    /// Moves past `n` lines without looking at them. Stops quietly at the end of input.
    pub fn skip_lines(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            if self.next_line()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Positions the cursor at the start of the next line with visible content.
    pub fn advance_to_next_nonblank(&mut self) -> Result<()> {
        let origin = self.offset;
        while let Some(line) = self.next_line()? {
            if !line.text.trim().is_empty() {
                return self.rewind_to(line.start);
            }
        }
        Err(ScanError::EndOfInput {
            expected: "a non-blank line".to_owned(),
            offset: origin,
        })
    }

    /// Looks for the next line containing `phrase`.
    ///
    /// Returns `None` when the source is exhausted without a match, in which case
    /// the cursor is back where the probe started.
    pub fn probe_phrase(
        &mut self,
        phrase: &str,
        landing: Landing,
        case: Case,
    ) -> Result<Option<PhraseMatch>> {
        let origin = self.offset;
        let needle = match case {
            Case::Sensitive => phrase.to_owned(),
            Case::Insensitive => phrase.to_lowercase(),
        };

        while let Some(line) = self.next_line()? {
            let hit = match case {
                Case::Sensitive => line.text.contains(&needle),
                Case::Insensitive => line.text.to_lowercase().contains(&needle),
            };
            if hit {
                if landing == Landing::LineStart {
                    self.rewind_to(line.start)?;
                }
                return Ok(Some(PhraseMatch {
                    offset: line.start,
                    line: line.text,
                }));
            }
        }

        self.rewind_to(origin)?;
        Ok(None)
    }

    /// Like [`probe_phrase`](Self::probe_phrase), but a miss is an
    /// [`EndOfInput`](ScanError::EndOfInput) error carrying the phrase.
    pub fn find_phrase(&mut self, phrase: &str, landing: Landing, case: Case) -> Result<PhraseMatch> {
        let origin = self.offset;
        self.probe_phrase(phrase, landing, case)?
            .ok_or_else(|| ScanError::EndOfInput {
                expected: phrase.to_owned(),
                offset: origin,
            })
    }

    /// Counts the data lines ahead of the cursor without moving it.
    ///
    /// Counting stops at a blank line, a line starting with one of
    /// `comment_prefixes`, or the end of input.
    pub fn measure_block_length(&mut self, comment_prefixes: &[&str]) -> Result<usize> {
        let origin = self.offset;
        let mut count = 0;
        while let Some(line) = self.next_line()? {
            let is_comment = comment_prefixes.iter().any(|p| line.text.starts_with(p));
            if is_comment || line.text.trim().is_empty() {
                break;
            }
            count += 1;
        }
        self.rewind_to(origin)?;
        Ok(count)
    }

    /// Reads a whitespace-delimited table.
    ///
    /// With a `row_count`, exactly that many non-blank rows are read and the cursor
    /// ends on the first line after the last row. Without one, rows run to the
    /// first blank line (which is consumed) or the end of input; `exact_rewind`
    /// cannot be honoured then and is rejected.
    ///
    /// A row with more fields than named columns makes the strict read fail; the
    /// same byte range is then reread keeping the extra fields positionally.
    pub fn read_table(
        &mut self,
        row_count: Option<usize>,
        spec: &ColumnSpec,
        exact_rewind: bool,
    ) -> Result<TableBlock> {
        if exact_rewind && row_count.is_none() {
            return Err(ScanError::Configuration(
                "exact rewind requested for a table without a row count".to_owned(),
            ));
        }
        spec.validate()?;

        let start = self.offset;
        match self.read_rows(row_count, spec, RowMode::Strict) {
            Err(ScanError::MalformedTable {
                expected,
                found,
                offset,
            }) if found > expected => {
                log::debug!(
                    "row at byte {offset} has {found} fields for {expected} columns, rereading without header"
                );
                self.rewind_to(start)?;
                self.read_rows(row_count, spec, RowMode::Headerless)
            }
            other => other,
        }
    }

    fn read_rows(
        &mut self,
        row_count: Option<usize>,
        spec: &ColumnSpec,
        mode: RowMode,
    ) -> Result<TableBlock> {
        let start_offset = self.offset;
        let mut rows = Vec::with_capacity(row_count.unwrap_or(0));

        loop {
            if let Some(n) = row_count
                && rows.len() == n
            {
                break;
            }
            let Some(line) = self.next_line()? else {
                if let Some(n) = row_count {
                    return Err(ScanError::EndOfInput {
                        expected: format!("{n} table rows, found {}", rows.len()),
                        offset: self.offset,
                    });
                }
                break;
            };

            let fields: Vec<&str> = line.text.split_whitespace().collect();
            if fields.is_empty() {
                if row_count.is_none() && !rows.is_empty() {
                    break;
                }
                continue;
            }
            rows.push(spec.select(&fields, line.start, mode)?);
        }

        Ok(TableBlock {
            columns: spec.names().to_vec(),
            index_column: spec.index_column(),
            rows,
            start_offset,
            end_offset: self.offset,
        })
    }
}

/// Returns whitespace-separated field `index` of `line`; negative indices count
/// from the end.
pub fn split_field(line: &str, index: isize) -> Option<&str> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let pos = if index < 0 {
        fields.len().checked_sub(index.unsigned_abs())?
    } else {
        index as usize
    };
    fields.get(pos).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cursor(text: &str) -> ScanCursor<Cursor<Vec<u8>>> {
        ScanCursor::from_reader(Cursor::new(text.as_bytes().to_vec())).unwrap()
    }

    #[test]
    fn test_split_field_negative_index() {
        assert_eq!(split_field("a b  c", -1), Some("c"));
        assert_eq!(split_field("a b  c", -3), Some("a"));
        assert_eq!(split_field("a b  c", -4), None);
        assert_eq!(split_field("a b  c", 3), None);
    }

    #[test]
    fn test_at_end_tracks_offset() {
        let mut c = cursor("one\ntwo\n");
        assert_eq!(c.len(), 8);
        assert!(!c.at_end());
        c.skip_lines(1).unwrap();
        assert_eq!(c.offset(), 4);
        c.skip_lines(5).unwrap();
        assert!(c.at_end());
        assert_eq!(c.offset(), 8);
    }

    #[test]
    fn test_read_clean_line_and_fields() {
        let mut c = cursor("  Lambda =  5.0000  ----->  \r\nlast\n");
        assert_eq!(c.read_field(2).unwrap(), "5.0000");
        let err = c.read_field(1).unwrap_err();
        assert!(matches!(err, ScanError::MalformedLine { index: 1, offset: 30, .. }));
        assert!(matches!(c.read_clean_line(), Err(ScanError::EndOfInput { .. })));
    }

    #[test]
    fn test_read_number_reports_token() {
        let mut c = cursor("Phi = cannot compute\n");
        match c.read_number(2) {
            Err(ScanError::NumericConversion { token, .. }) => assert_eq!(token, "cannot"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_advance_to_next_nonblank() {
        let mut c = cursor("\n   \nvalue\n");
        c.advance_to_next_nonblank().unwrap();
        assert_eq!(c.offset(), 5);
        assert_eq!(c.read_clean_line().unwrap(), "value");
        assert!(matches!(
            c.advance_to_next_nonblank(),
            Err(ScanError::EndOfInput { .. })
        ));
    }

    #[test]
    fn test_advance_to_final_line_without_newline() {
        let mut c = cursor("\n\nlast");
        c.advance_to_next_nonblank().unwrap();
        assert_eq!(c.read_clean_line().unwrap(), "last");
    }

    #[test]
    fn test_find_phrase_landing() {
        let text = "header\nPEST Version: 17.2\nrest\n";
        let mut c = cursor(text);
        let hit = c.find_phrase("version", Landing::LineStart, Case::Insensitive).unwrap();
        assert_eq!(hit.offset, 7);
        assert_eq!(c.offset(), 7);
        assert_eq!(hit.field(2), Some("17.2"));

        let mut c = cursor(text);
        c.find_phrase("Version", Landing::AfterLine, Case::Sensitive).unwrap();
        assert_eq!(c.read_clean_line().unwrap(), "rest");
    }

    #[test]
    fn test_find_phrase_case_sensitivity() {
        let mut c = cursor("optimisation record\n");
        let err = c
            .find_phrase("OPTIMISATION RECORD", Landing::AfterLine, Case::Sensitive)
            .unwrap_err();
        match err {
            ScanError::EndOfInput { expected, offset } => {
                assert_eq!(expected, "OPTIMISATION RECORD");
                assert_eq!(offset, 0);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(c
            .find_phrase("OPTIMISATION RECORD", Landing::AfterLine, Case::Insensitive)
            .is_ok());
    }

    #[test]
    fn test_probe_miss_restores_position() {
        let mut c = cursor("a\nb\nc\n");
        c.skip_lines(1).unwrap();
        assert!(c.probe_phrase("zzz", Landing::AfterLine, Case::Insensitive).unwrap().is_none());
        assert_eq!(c.offset(), 2);
        assert_eq!(c.read_clean_line().unwrap(), "b");
    }

    #[test]
    fn test_measure_block_length_is_non_destructive() {
        let mut c = cursor(" p1 g 1 2\n p2 g 1 2\n\n p3 g 1 2\n");
        assert_eq!(c.measure_block_length(DEFAULT_COMMENT_PREFIXES).unwrap(), 2);
        assert_eq!(c.offset(), 0);

        let mut c = cursor(" p1\n p2\n* comment\n p3\n");
        assert_eq!(c.measure_block_length(DEFAULT_COMMENT_PREFIXES).unwrap(), 2);

        let mut c = cursor(" p1\n p2");
        assert_eq!(c.measure_block_length(&[]).unwrap(), 2);
    }

    #[test]
    fn test_read_table_exact_landing() {
        let text = "  k1  1.5\n\n  k2  2.5\nNEXT\n";
        let mut c = cursor(text);
        let spec = ColumnSpec::new(["Parameter", "Value"]).index(0);
        let table = c.read_table(Some(2), &spec, true).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.index().unwrap(), vec!["k1", "k2"]);
        assert_eq!(table.numeric_column("Value").unwrap(), vec![1.5, 2.5]);
        assert_eq!(table.end_offset, c.offset());
        assert_eq!(c.read_clean_line().unwrap(), "NEXT");
    }

    #[test]
    fn test_read_table_extra_fields_reread() {
        let text = "k1 1.5 k1 1.0\nk2 2.5 k2 2.0\nNEXT\n";
        let mut c = cursor(text);
        let spec = ColumnSpec::new(["Parameter", "Value"]);
        let table = c.read_table(Some(2), &spec, true).unwrap();
        assert_eq!(table.column("Parameter").unwrap(), vec!["k1", "k2"]);
        assert_eq!(table.rows[1].extra, vec!["k2", "2.0"]);
        assert_eq!(c.read_clean_line().unwrap(), "NEXT");
    }

    #[test]
    fn test_read_table_exact_rewind_needs_row_count() {
        let mut c = cursor("k1 1\n");
        let spec = ColumnSpec::new(["Parameter", "Value"]);
        assert!(matches!(
            c.read_table(None, &spec, true),
            Err(ScanError::Configuration(_))
        ));
        assert_eq!(c.offset(), 0);
    }

    #[test]
    fn test_read_table_until_blank() {
        let mut c = cursor("\nk1 1\nk2 2\n\nafter\n");
        let spec = ColumnSpec::new(["Parameter", "Value"]);
        let table = c.read_table(None, &spec, false).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(c.read_clean_line().unwrap(), "after");
    }

    #[test]
    fn test_read_table_short_input() {
        let mut c = cursor("k1 1\n");
        let spec = ColumnSpec::new(["Parameter", "Value"]);
        assert!(matches!(
            c.read_table(Some(3), &spec, true),
            Err(ScanError::EndOfInput { .. })
        ));
    }

    #[test]
    fn test_rewind_past_end_rejected() {
        let mut c = cursor("abc\n");
        assert!(matches!(c.rewind_to(99), Err(ScanError::Configuration(_))));
        c.skip_lines(1).unwrap();
        c.rewind_to(0).unwrap();
        assert_eq!(c.read_clean_line().unwrap(), "abc");
    }
}
