use super::table::{TableError, is_gzip, open_reader, tsv_reader_builder};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Returns the sample (column) names of an expression data set.
///
/// `data` is either a single tab-separated matrix (genes x samples, optionally
/// gzip-compressed) or a Matrix Market triplet `[matrix.mtx, genes.tsv, barcodes.tsv]`.
/// Without a barcodes file, Matrix Market samples are named by their position.
pub fn sample_names(data: &[PathBuf]) -> Result<Vec<String>, TableError> {
    let first = data.first().ok_or_else(|| TableError::Format {
        path: PathBuf::new(),
        message: "no expression data supplied".to_string(),
    })?;

    let names = if is_matrix_market(first) {
        match data.get(2) {
            Some(barcodes) => read_barcodes(barcodes)?,
            None => (0..matrix_market_columns(first)?)
                .map(|i| i.to_string())
                .collect(),
        }
    } else {
        read_tsv_header(first)?
    };

    debug!(count = names.len(), "Read sample names from expression data.");
    Ok(names)
}

fn is_matrix_market(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(".mtx") || name.ends_with(".mtx.gz")
}

fn read_tsv_header(path: &Path) -> Result<Vec<String>, TableError> {
    let mut reader = tsv_reader_builder()
        .flexible(true)
        .from_reader(open_reader(path)?);
    let headers = reader.headers().map_err(|e| TableError::Csv {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(headers.iter().skip(1).map(str::to_string).collect())
}

fn read_barcodes(path: &Path) -> Result<Vec<String>, TableError> {
    let reader = BufReader::new(open_reader(path)?);
    let mut names = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| TableError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let name = line.split('\t').next().unwrap_or_default().trim();
        if !name.is_empty() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

fn matrix_market_columns(path: &Path) -> Result<usize, TableError> {
    let reader = BufReader::new(open_reader(path)?);
    for line in reader.lines() {
        let line = line.map_err(|e| TableError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }
        let sizes: Vec<&str> = line.split_whitespace().collect();
        return sizes
            .get(1)
            .and_then(|cols| cols.parse().ok())
            .ok_or_else(|| TableError::Format {
                path: path.to_path_buf(),
                message: format!("invalid size line '{}'", line),
            });
    }
    Err(TableError::Format {
        path: path.to_path_buf(),
        message: format!(
            "no size line found{}",
            if is_gzip(path) { " in compressed matrix" } else { "" }
        ),
    })
}
