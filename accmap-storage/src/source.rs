//! Reader for two-column classification source files.
//!
//! Each line holds `accession<TAB>value`. Blank lines are ignored, a trailing
//! `\r` is stripped and the first line may be a header depending on the
//! [`HeaderPolicy`]. Anything else that does not fit the shape is a hard
//! error naming the offending line.

use accmap_core::{AccmapResult, HeaderPolicy, SourceError, ABSENT};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// One parsed line of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// 1-based line number in the source file
    pub line: usize,
    pub accession: String,
    pub value: i64,
}

impl SourceRecord {
    pub fn is_absent(&self) -> bool {
        self.value == ABSENT
    }
}

/// Streaming reader over a classification source file.
pub struct SourceReader<R> {
    path: PathBuf,
    lines: Lines<R>,
    line: usize,
    header: HeaderPolicy,
}

impl SourceReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, header: HeaderPolicy) -> AccmapResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SourceError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(BufReader::new(file), path, header))
    }
}

impl<R: BufRead> SourceReader<R> {
    /// Wrap any buffered reader; `path` is only used in error messages.
    pub fn new(reader: R, path: impl Into<PathBuf>, header: HeaderPolicy) -> Self {
        Self {
            path: path.into(),
            lines: reader.lines(),
            line: 0,
            header,
        }
    }

    fn malformed(&self, reason: String) -> SourceError {
        SourceError::MalformedLine {
            path: self.path.clone(),
            line: self.line,
            reason,
        }
    }

    fn parse(&self, text: &str) -> Result<SourceRecord, SourceError> {
        let fields: Vec<&str> = text.split('\t').collect();
        if fields.len() != 2 {
            return Err(self.malformed(format!(
                "expected 2 tab-separated fields, found {}",
                fields.len()
            )));
        }
        let accession = fields[0].trim();
        if accession.is_empty() {
            return Err(self.malformed("empty accession".to_string()));
        }
        let raw = fields[1].trim();
        let value = raw
            .parse::<i64>()
            .map_err(|_| self.malformed(format!("value {:?} is not an integer", raw)))?;
        Ok(SourceRecord {
            line: self.line,
            accession: accession.to_string(),
            value,
        })
    }

    fn is_header(&self, text: &str) -> bool {
        if self.line != 1 {
            return false;
        }
        match self.header {
            HeaderPolicy::Skip => true,
            HeaderPolicy::None => false,
            HeaderPolicy::Auto => {
                let fields: Vec<&str> = text.split('\t').collect();
                fields.len() == 2 && fields[1].trim().parse::<i64>().is_err()
            }
        }
    }
}

impl<R: BufRead> Iterator for SourceReader<R> {
    type Item = AccmapResult<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => {
                    return Some(Err(SourceError::Unreadable {
                        path: self.path.clone(),
                        reason: e.to_string(),
                    }
                    .into()))
                }
            };
            self.line += 1;

            let text = text.strip_suffix('\r').unwrap_or(&text);
            if self.is_header(text) || text.trim().is_empty() {
                continue;
            }
            return Some(self.parse(text).map_err(Into::into));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accmap_core::AccmapError;
    use std::io::Cursor;

    fn read_all(text: &str, header: HeaderPolicy) -> AccmapResult<Vec<SourceRecord>> {
        SourceReader::new(Cursor::new(text.to_string()), "mem.tsv", header).collect()
    }

    #[test]
    fn test_parses_records_with_line_numbers() {
        let records = read_all("acc1\t100\n\nacc2\t0\r\nacc3\t42\n", HeaderPolicy::Auto)
            .expect("valid file parses");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].accession, "acc1");
        assert_eq!(records[0].value, 100);
        assert_eq!(records[1].line, 3);
        assert!(records[1].is_absent());
        assert_eq!(records[2].line, 4);
    }

    #[test]
    fn test_auto_header_skips_textual_first_line() {
        let records = read_all("accession\ttaxid\nacc1\t5\n", HeaderPolicy::Auto)
            .expect("header is skipped");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].line, 2);
    }

    #[test]
    fn test_auto_header_keeps_numeric_first_line() {
        let records = read_all("acc1\t5\nacc2\t6\n", HeaderPolicy::Auto).expect("parses");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_auto_header_needs_two_fields() {
        let err = read_all("acc1\nacc2\t6\n", HeaderPolicy::Auto).expect_err("one field");
        match err {
            AccmapError::Source(SourceError::MalformedLine { line, reason, .. }) => {
                assert_eq!(line, 1);
                assert!(reason.contains("found 1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = read_all("accession\ttaxid\textra\nacc1\t5\n", HeaderPolicy::Auto)
            .expect_err("three fields");
        assert!(matches!(
            err,
            AccmapError::Source(SourceError::MalformedLine { line: 1, .. })
        ));
    }

    #[test]
    fn test_skip_policy_always_drops_first_line() {
        let records = read_all("acc1\t5\nacc2\t6\n", HeaderPolicy::Skip).expect("parses");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].accession, "acc2");
    }

    #[test]
    fn test_none_policy_rejects_header() {
        let err = read_all("accession\ttaxid\nacc1\t5\n", HeaderPolicy::None)
            .expect_err("header is not an integer");
        assert!(matches!(
            err,
            AccmapError::Source(SourceError::MalformedLine { line: 1, .. })
        ));
    }

    #[test]
    fn test_wrong_column_count_fails() {
        let err = read_all("acc1\t5\nacc2\t6\t7\n", HeaderPolicy::Auto).expect_err("three fields");
        match err {
            AccmapError::Source(SourceError::MalformedLine { line, reason, .. }) => {
                assert_eq!(line, 2);
                assert!(reason.contains("found 3"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_value_fails() {
        let err = read_all("acc1\t5\nacc2\tabc\n", HeaderPolicy::Auto).expect_err("not numeric");
        assert!(matches!(
            err,
            AccmapError::Source(SourceError::MalformedLine { line: 2, .. })
        ));
    }

    #[test]
    fn test_empty_accession_fails() {
        let err = read_all("acc1\t5\n\t6\n", HeaderPolicy::Auto).expect_err("empty accession");
        assert!(format!("{}", err).contains("empty accession"));
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let result = SourceReader::open("/nonexistent/accmap/source.tsv", HeaderPolicy::Auto);
        assert!(matches!(
            result,
            Err(AccmapError::Source(SourceError::Unreadable { .. }))
        ));
    }
}
