use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("File I/O error for '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("TSV parsing error for '{path}': {source}", path = path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Invalid value '{value}' in row '{row}' of '{path}'", path = path.display())]
    InvalidValue {
        path: PathBuf,
        row: String,
        value: String,
    },
    #[error("Row '{row}' has {found} values but the table has {expected} columns")]
    RowLength {
        row: String,
        expected: usize,
        found: usize,
    },
    #[error("Malformed file '{path}': {message}", path = path.display())]
    Format { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub values: Vec<Option<f64>>,
}

/// A numeric table indexed by row identifier (reaction or metabolite id) with one
/// column per sample.
///
/// Missing cells are `None` and are written as empty fields, so tables produced by
/// an outer join round-trip through TSV unchanged. Every row has exactly one value
/// per column, including tables deserialized from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableRecord")]
pub struct Table {
    #[serde(default)]
    index_name: String,
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Deserialize)]
struct TableRecord {
    #[serde(default)]
    index_name: String,
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Row>,
}

impl TryFrom<TableRecord> for Table {
    type Error = TableError;

    fn try_from(record: TableRecord) -> Result<Self, Self::Error> {
        let mut table = Table::new(record.index_name, record.columns);
        for row in record.rows {
            table.push_row(row.id, row.values)?;
        }
        Ok(table)
    }
}

impl Table {
    pub fn new(index_name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            index_name: index_name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// An empty table whose only content is a single column header.
    ///
    /// Stands in for a sample whose output file is missing so that aggregated
    /// tables keep one column per sample.
    pub fn placeholder(column: impl Into<String>) -> Self {
        Self::new("", vec![column.into()])
    }

    pub fn push_row(
        &mut self,
        id: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), TableError> {
        let id = id.into();
        if values.len() != self.columns.len() {
            return Err(TableError::RowLength {
                row: id,
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        self.rows.push(Row { id, values });
        Ok(())
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, row_id: &str, column: &str) -> Option<f64> {
        let column_idx = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|row| row.id == row_id)
            .and_then(|row| row.values.get(column_idx).copied().flatten())
    }

    /// Horizontally concatenates tables with an outer join on the row identifier.
    ///
    /// Columns keep the order of the input tables. Rows are the sorted union of all
    /// identifiers; cells absent from a table are `None`.
    pub fn concat_columns<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Table {
        let tables: Vec<&Table> = tables.into_iter().collect();

        let index_name = tables
            .iter()
            .map(|t| t.index_name.as_str())
            .find(|name| !name.is_empty())
            .unwrap_or_default()
            .to_string();
        let columns: Vec<String> = tables
            .iter()
            .flat_map(|t| t.columns.iter().cloned())
            .collect();

        let lookups: Vec<HashMap<&str, &Row>> = tables
            .iter()
            .map(|t| t.rows.iter().map(|row| (row.id.as_str(), row)).collect())
            .collect();

        let ids: Vec<&str> = tables
            .iter()
            .flat_map(|t| t.row_ids())
            .sorted_unstable()
            .dedup()
            .collect();

        let rows = ids
            .into_iter()
            .map(|id| {
                let values = tables
                    .iter()
                    .zip(&lookups)
                    .flat_map(|(table, lookup)| match lookup.get(id) {
                        Some(row) => row.values.clone(),
                        None => vec![None; table.columns.len()],
                    })
                    .collect();
                Row {
                    id: id.to_string(),
                    values,
                }
            })
            .collect();

        Table {
            index_name,
            columns,
            rows,
        }
    }

    /// Reads a tab-separated table whose first column holds row identifiers.
    ///
    /// Files ending in `.gz` are decompressed transparently.
    pub fn read_tsv(path: &Path) -> Result<Self, TableError> {
        let reader = open_reader(path)?;
        let mut reader = tsv_reader_builder().from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| TableError::Csv {
                path: path.to_path_buf(),
                source: e,
            })?
            .clone();
        let mut header_fields = headers.iter();
        let index_name = header_fields
            .next()
            .ok_or_else(|| TableError::Format {
                path: path.to_path_buf(),
                message: "missing header line".to_string(),
            })?
            .to_string();
        let columns: Vec<String> = header_fields.map(str::to_string).collect();

        let mut table = Table::new(index_name, columns);
        for record in reader.records() {
            let record = record.map_err(|e| TableError::Csv {
                path: path.to_path_buf(),
                source: e,
            })?;
            let mut fields = record.iter();
            let id = fields.next().unwrap_or_default().to_string();
            let values = fields
                .map(|field| {
                    parse_cell(field).ok_or_else(|| TableError::InvalidValue {
                        path: path.to_path_buf(),
                        row: id.clone(),
                        value: field.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            table.push_row(id, values)?;
        }
        Ok(table)
    }

    /// Writes the table as tab-separated values, gzip-compressed when the path ends in `.gz`.
    pub fn write_tsv(&self, path: &Path) -> Result<(), TableError> {
        let io_err = |e: io::Error| TableError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        let csv_err = |e: csv::Error| TableError::Csv {
            path: path.to_path_buf(),
            source: e,
        };

        let file = BufWriter::new(File::create(path).map_err(io_err)?);
        if is_gzip(path) {
            let encoder = GzEncoder::new(file, Compression::default());
            let encoder = self.write_records(encoder).map_err(csv_err)?;
            encoder.finish().map_err(io_err)?.flush().map_err(io_err)
        } else {
            self.write_records(file).map_err(csv_err)?.flush().map_err(io_err)
        }
    }

    fn write_records<W: Write>(&self, writer: W) -> Result<W, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .flexible(false)
            .from_writer(writer);

        writer.write_record(
            std::iter::once(self.index_name.as_str()).chain(self.columns.iter().map(String::as_str)),
        )?;
        for row in &self.rows {
            let cells = row.values.iter().map(|value| match value {
                Some(v) => v.to_string(),
                None => String::new(),
            });
            writer.write_record(std::iter::once(row.id.clone()).chain(cells))?;
        }
        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }
}

fn parse_cell(field: &str) -> Option<Option<f64>> {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Some(None);
    }
    trimmed.parse::<f64>().ok().map(Some)
}

pub(crate) fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

pub(crate) fn tsv_reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.delimiter(b'\t').has_headers(true).flexible(false);
    builder
}

/// Opens a file for reading, decompressing it when the name ends in `.gz`.
pub(crate) fn open_reader(path: &Path) -> Result<Box<dyn Read>, TableError> {
    let file = File::open(path).map_err(|e| TableError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let reader = BufReader::new(file);
    if is_gzip(path) {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}
