//! Delimited table handler
//!
//! One handler type serves both `table:csv` and `table:tsv`; the delimiter
//! byte is the only difference. Payloads must be UTF-8 with a non-empty
//! header row and the same cell count in every row. Cell values are kept as
//! strings, no quoting or escaping is interpreted.

use super::{PartData, PartError, PartHandler, PartResult};
use edl_core_manifest::DataPartRef;
use std::fs;
use std::path::Path;

/// Parsed delimited table
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    /// Column names from the header row
    pub columns: Vec<String>,

    /// Data rows, each with one cell per column
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    /// Parse delimited text into a table
    pub fn parse(bytes: &[u8], delimiter: u8) -> PartResult<TableData> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| PartError::malformed(format!("table is not valid UTF-8: {}", e)))?;
        let sep = delimiter as char;

        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| PartError::malformed("table has no header row"))?;
        let columns: Vec<String> = header.split(sep).map(str::to_string).collect();
        if columns.iter().all(|c| c.trim().is_empty()) {
            return Err(PartError::malformed("table header row is empty"));
        }

        let mut rows = Vec::new();
        for (idx, line) in lines.enumerate() {
            let cells: Vec<String> = line.split(sep).map(str::to_string).collect();
            if cells.len() != columns.len() {
                return Err(PartError::malformed(format!(
                    "row {} has {} cells, expected {}",
                    idx + 1,
                    cells.len(),
                    columns.len()
                )));
            }
            rows.push(cells);
        }

        Ok(TableData { columns, rows })
    }

    /// Emit the table as delimited text with a trailing newline per row
    ///
    /// Cells are written without quoting, so a table whose column name or
    /// cell contains the output delimiter cannot be represented and is
    /// rejected as malformed.
    pub fn emit(&self, delimiter: u8) -> PartResult<Vec<u8>> {
        let sep = delimiter as char;
        if let Some(column) = self.columns.iter().find(|c| c.contains(sep)) {
            return Err(PartError::malformed(format!(
                "column name '{}' contains the output delimiter",
                column
            )));
        }
        for (idx, row) in self.rows.iter().enumerate() {
            if row.iter().any(|cell| cell.contains(sep)) {
                return Err(PartError::malformed(format!(
                    "row {} contains the output delimiter",
                    idx + 1
                )));
            }
        }

        let sep = sep.to_string();
        let mut out = String::new();
        out.push_str(&self.columns.join(&sep));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.join(&sep));
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    /// Number of data rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Handler for delimited tables, parameterized by delimiter
pub struct TableHandler {
    name: String,
    delimiter: u8,
}

impl TableHandler {
    /// Create a handler for a delimited table type
    pub fn new<S: Into<String>>(name: S, delimiter: u8) -> Self {
        TableHandler {
            name: name.into(),
            delimiter,
        }
    }

    /// Handler for comma-separated tables
    pub fn csv() -> Self {
        TableHandler::new("table:csv", b',')
    }

    /// Handler for tab-separated tables
    pub fn tsv() -> Self {
        TableHandler::new("table:tsv", b'\t')
    }
}

impl PartHandler for TableHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, path: &Path, _part: &DataPartRef) -> PartResult<Vec<String>> {
        let bytes = fs::read(path)?;
        TableData::parse(&bytes, self.delimiter)?;
        Ok(Vec::new())
    }

    fn load(&self, path: &Path, _part: &DataPartRef) -> PartResult<PartData> {
        let bytes = fs::read(path)?;
        let table = TableData::parse(&bytes, self.delimiter)?;
        Ok(PartData::Table(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv() {
        let table = TableData::parse(b"frame,time\n0,1.5\n1,34.9\n", b',').unwrap();
        assert_eq!(table.columns, vec!["frame", "time"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[1], vec!["1", "34.9"]);
    }

    #[test]
    fn test_parse_rejects_ragged_rows() {
        let err = TableData::parse(b"a,b\n1,2\n3\n", b',').unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_parse_rejects_empty_header() {
        let err = TableData::parse(b"\n1,2\n", b',').unwrap_err();
        assert!(err.to_string().contains("header"));
    }

    #[test]
    fn test_parse_rejects_non_utf8() {
        let err = TableData::parse(&[0xff, 0xfe, b'\n'], b',').unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_emit_round_trip() {
        let src = b"frame\ttime\n0\t1.5\n";
        let table = TableData::parse(src, b'\t').unwrap();
        assert_eq!(table.emit(b'\t').unwrap(), src);
    }

    #[test]
    fn test_emit_rejects_cell_containing_target_delimiter() {
        let table = TableData::parse(b"frame,note\n0,left\tright\n", b',').unwrap();
        let err = table.emit(b'\t').unwrap_err();
        assert!(err.to_string().contains("output delimiter"));

        // the same table is still representable with the source delimiter
        assert!(table.emit(b',').is_ok());

        let table = TableData::parse(b"a\tb,x\n0,1\n", b',').unwrap();
        let err = table.emit(b'\t').unwrap_err();
        assert!(err.to_string().contains("column name"));
    }

    #[test]
    fn test_handler_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");
        fs::write(&path, "frame,code\n0,start\n").unwrap();

        let part = DataPartRef::new("table:csv", "events.csv");
        let handler = TableHandler::csv();
        assert_eq!(handler.name(), "table:csv");
        assert!(handler.validate(&path, &part).unwrap().is_empty());

        fs::write(&path, "frame,code\n0\n").unwrap();
        assert!(handler.validate(&path, &part).is_err());
    }

    #[test]
    fn test_handler_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.tsv");
        fs::write(&path, "frame\tcode\n0\tstart\n").unwrap();

        let part = DataPartRef::new("table:tsv", "events.tsv");
        match TableHandler::tsv().load(&path, &part).unwrap() {
            PartData::Table(table) => assert_eq!(table.columns, vec!["frame", "code"]),
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
