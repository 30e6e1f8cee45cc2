use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use thiserror::Error;
use tracing::debug;

use spectralign::BatchItem;

use crate::args::ColumnRef;

#[derive(Debug, Error)]
pub enum BatchInputError {
    #[error("An IO error occurred while reading the batch: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Line {line} of the batch has no column {column}")]
    MissingColumn { line: usize, column: ColumnRef },
}

/// Read `(title, peptide)` pairs from a `;` separated table whose first line is
/// a header. Blank lines are skipped.
pub fn read_batch<R: BufRead>(
    reader: R,
    title_column: ColumnRef,
    peptide_column: ColumnRef,
) -> Result<Vec<BatchItem>, BatchInputError> {
    let mut items = Vec::new();
    for (i, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(';').collect();
        let field = |column: ColumnRef| {
            fields
                .get(column.index())
                .map(|s| s.trim())
                .ok_or(BatchInputError::MissingColumn {
                    line: i + 1,
                    column,
                })
        };
        let title = field(title_column)?;
        let peptide = field(peptide_column)?;
        items.push(BatchItem::new(title, peptide));
    }
    Ok(items)
}

/// Read a batch table from `path`, decompressing it if the path ends in `.gz`
pub fn load_batch(
    path: &Path,
    title_column: ColumnRef,
    peptide_column: ColumnRef,
) -> Result<Vec<BatchItem>, BatchInputError> {
    let handle = fs::File::open(path)?;
    let compressed = path.extension().is_some_and(|ext| ext == "gz");
    debug!(
        "Reading batch from {} (compressed? {compressed})",
        path.display()
    );
    if compressed {
        read_batch(
            io::BufReader::new(MultiGzDecoder::new(handle)),
            title_column,
            peptide_column,
        )
    } else {
        read_batch(io::BufReader::new(handle), title_column, peptide_column)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_read_batch() -> Result<(), BatchInputError> {
        let text = "Scan;Protein;Peptide\r\nscan=1;P1;PEPTIDE\r\n\r\nscan=2;P2; SAMPLER \r\n";
        let items = read_batch(io::Cursor::new(text), ColumnRef(0), ColumnRef(2))?;
        assert_eq!(
            items,
            vec![
                BatchItem::new("scan=1", "PEPTIDE"),
                BatchItem::new("scan=2", "SAMPLER"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_missing_column() {
        let text = "Title;Peptide\nscan=1;PEPTIDE\nscan=2\n";
        match read_batch(io::Cursor::new(text), ColumnRef(0), ColumnRef(1)) {
            Err(BatchInputError::MissingColumn { line, column }) => {
                assert_eq!(line, 3);
                assert_eq!(column, ColumnRef(1));
            }
            other => panic!("Expected a missing column, got {other:?}"),
        }
    }

    #[test]
    fn test_header_only() -> Result<(), BatchInputError> {
        let items = read_batch(io::Cursor::new("Title;Peptide\n"), ColumnRef(0), ColumnRef(1))?;
        assert!(items.is_empty());
        Ok(())
    }
}
