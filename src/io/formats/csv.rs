//! CSV table parsing and writing.
//!
//! Import reads the whole upload into an immutable [`CsvTable`]; export
//! streams header and data rows through [`CsvExportSink`].

use crate::{Error, Result};
use std::io::{Read, Write};

/// Byte order mark some spreadsheet tools prepend to UTF-8 files.
const UTF8_BOM: char = '\u{feff}';

/// Options controlling how raw text is split into a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    /// Field delimiter.
    pub delimiter: u8,
    /// Maximum number of data rows accepted (`None` = unlimited).
    pub max_rows: Option<usize>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            max_rows: None,
        }
    }
}

impl CsvOptions {
    /// Sets the field delimiter.
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the row limit.
    #[must_use]
    pub const fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }
}

/// A parsed upload: one header row and the data rows below it.
///
/// Every row has exactly `headers.len()` cells. Rows of a different length
/// and rows whose cells are all empty are dropped during parsing and counted
/// in [`CsvTable::dropped_rows`]. Kept rows remember their 1-based
/// position among the file's data rows, see [`CsvTable::source_row`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    source_rows: Vec<usize>,
    dropped_rows: usize,
}

impl CsvTable {
    /// Parses comma-delimited text with no row limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upload`] if the text is malformed or has no header
    /// or no data rows.
    pub fn parse(raw: &str) -> Result<Self> {
        Self::parse_with(raw, CsvOptions::default())
    }

    /// Parses delimited text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upload`] if the text is malformed, has no header or
    /// no data rows, or has more data rows than `options.max_rows`.
    pub fn parse_with(raw: &str, options: CsvOptions) -> Result<Self> {
        let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .delimiter(options.delimiter)
            .from_reader(raw.as_bytes());

        let mut records = reader.records();
        let headers: Vec<String> = match records.next() {
            Some(record) => record
                .map_err(|e| Error::Upload(format!("unreadable header row: {e}")))?
                .iter()
                .map(clean_cell)
                .collect(),
            None => return Err(Error::Upload("file is empty".to_string())),
        };

        let mut rows = Vec::new();
        let mut source_rows = Vec::new();
        let mut dropped_rows = 0;
        for (index, record) in records.enumerate() {
            let record = record.map_err(|e| Error::Upload(format!("malformed row: {e}")))?;
            let cells: Vec<String> = record.iter().map(clean_cell).collect();
            if cells.len() != headers.len() || cells.iter().all(String::is_empty) {
                dropped_rows += 1;
                continue;
            }
            rows.push(cells);
            source_rows.push(index + 1);
        }

        if rows.is_empty() {
            return Err(Error::Upload(
                "file must contain a header row and at least one data row".to_string(),
            ));
        }
        if let Some(max) = options.max_rows
            && rows.len() > max
        {
            return Err(Error::Upload(format!(
                "file has {} data rows, the limit is {max}",
                rows.len()
            )));
        }

        if dropped_rows > 0 {
            tracing::debug!(dropped_rows, "Dropped malformed or empty CSV rows");
        }

        Ok(Self {
            headers,
            rows,
            source_rows,
            dropped_rows,
        })
    }

    /// Parses raw bytes, rejecting input that is not UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upload`] for non-UTF-8 input or any
    /// [`CsvTable::parse_with`] failure.
    pub fn from_bytes(bytes: &[u8], options: CsvOptions) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::Upload(format!("file is not valid UTF-8: {e}")))?;
        Self::parse_with(text, options)
    }

    /// Reads and parses an upload from a reader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upload`] if the reader fails or the content is not
    /// a valid table.
    pub fn from_reader<R: Read>(mut reader: R, options: CsvOptions) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| Error::Upload(format!("file is unreadable: {e}")))?;
        Self::from_bytes(&bytes, options)
    }

    /// Column headers in file order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows in file order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// 1-based data-row position in the uploaded file of the kept row at
    /// `index`, counting dropped rows. The header is not counted.
    #[must_use]
    pub fn source_row(&self, index: usize) -> Option<usize> {
        self.source_rows.get(index).copied()
    }

    /// Number of rows discarded while parsing.
    #[must_use]
    pub const fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    /// Returns the position of a header.
    #[must_use]
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Iterates a column's cells.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |row| row.get(index).map(String::as_str))
    }
}

fn clean_cell(cell: &str) -> String {
    cell.trim().trim_matches('"').trim().to_string()
}

/// CSV export sink.
///
/// Writes comma-delimited output with RFC 4180 quoting.
pub struct CsvExportSink<W: Write> {
    writer: csv::Writer<W>,
    rows_written: usize,
}

impl<W: Write> CsvExportSink<W> {
    /// Creates a sink and writes the header line.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    pub fn new<I, S>(writer: W, headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        writer
            .write_record(headers)
            .map_err(|e| Error::operation("write_csv_headers", e))?;
        Ok(Self {
            writer,
            rows_written: 0,
        })
    }

    /// Writes one data line.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be written.
    pub fn write_row<I, S>(&mut self, cells: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.writer
            .write_record(cells)
            .map_err(|e| Error::operation("write_csv", e))?;
        self.rows_written += 1;
        Ok(())
    }

    /// Number of data lines written.
    #[must_use]
    pub const fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::operation("flush_csv", e.error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_csv() {
        let table = CsvTable::parse("First Name,Last Name\nJane,Doe\nJohn,Smith\n").unwrap();
        assert_eq!(table.headers(), ["First Name", "Last Name"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows()[1], ["John", "Smith"]);
    }

    #[test]
    fn test_parse_quoted_cells() {
        let table = CsvTable::parse("name,notes\n\"Acme, Inc\",\" padded \"\n").unwrap();
        assert_eq!(table.rows()[0], ["Acme, Inc", "padded"]);
    }

    #[test]
    fn test_parse_strips_bom() {
        let table = CsvTable::parse("\u{feff}name\nAcme\n").unwrap();
        assert_eq!(table.headers(), ["name"]);
    }

    #[test]
    fn test_parse_drops_mismatched_and_empty_rows() {
        let table = CsvTable::parse("a,b\n1,2\n3\n,\n4,5,6\n7,8\n").unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.dropped_rows(), 3);
        assert!(table.rows().iter().all(|r| r.len() == 2));
        assert_eq!(table.source_row(0), Some(1));
        assert_eq!(table.source_row(1), Some(5));
        assert_eq!(table.source_row(2), None);
    }

    #[test]
    fn test_parse_requires_data_rows() {
        assert!(matches!(CsvTable::parse(""), Err(Error::Upload(_))));
        assert!(matches!(CsvTable::parse("name\n"), Err(Error::Upload(_))));
        assert!(matches!(CsvTable::parse("a,b\n1\n"), Err(Error::Upload(_))));
    }

    #[test]
    fn test_parse_row_limit() {
        let options = CsvOptions::default().with_max_rows(1);
        let result = CsvTable::parse_with("name\nA\nB\n", options);
        assert!(matches!(result, Err(Error::Upload(_))));
    }

    #[test]
    fn test_parse_custom_delimiter() {
        let options = CsvOptions::default().with_delimiter(b';');
        let table = CsvTable::parse_with("name;domain\nAcme;acme.com\n", options).unwrap();
        assert_eq!(table.rows()[0], ["Acme", "acme.com"]);
    }

    #[test]
    fn test_from_bytes_rejects_invalid_utf8() {
        let result = CsvTable::from_bytes(&[0xff, 0xfe, 0x00], CsvOptions::default());
        assert!(matches!(result, Err(Error::Upload(_))));
    }

    #[test]
    fn test_column() {
        let table = CsvTable::parse("a,b\n1,\n2,x\n").unwrap();
        let idx = table.column_index("b").unwrap();
        assert_eq!(table.column(idx).collect::<Vec<_>>(), vec!["", "x"]);
    }

    #[test]
    fn test_export_sink_quotes() {
        let mut sink = CsvExportSink::new(Vec::new(), ["Name", "Notes"]).unwrap();
        sink.write_row(["Acme, Inc", "said \"hi\""]).unwrap();
        assert_eq!(sink.rows_written(), 1);
        let out = String::from_utf8(sink.finish().unwrap()).unwrap();
        assert_eq!(out, "Name,Notes\n\"Acme, Inc\",\"said \"\"hi\"\"\"\n");
    }
}
