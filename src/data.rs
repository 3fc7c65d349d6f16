//! Table I/O
//!
//! Reads input tables (community, traits) and writes reports with Polars.
//! Paths ending in `.parquet` use Parquet; everything else is treated as CSV
//! with a header row.

use crate::error::{NullModelError, Result};
use polars::prelude::*;
use std::fs;
use std::path::Path;

fn is_parquet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("parquet"))
}

/// Read a CSV or Parquet table into a DataFrame
pub fn read_table(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(NullModelError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        ));
    }

    let df = if is_parquet(path) {
        LazyFrame::scan_parquet(path, Default::default())?.collect()?
    } else {
        CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?
    };

    tracing::debug!("Read {:?}: {} rows × {} cols", path, df.height(), df.width());
    Ok(df)
}

/// Write a DataFrame as CSV or Parquet (ZSTD), creating parent directories
pub fn write_table(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| NullModelError::io(parent, e))?;
        }
    }

    let mut file = fs::File::create(path).map_err(|e| NullModelError::io(path, e))?;
    if is_parquet(path) {
        ParquetWriter::new(&mut file)
            .with_compression(ParquetCompression::Zstd(None))
            .finish(df)?;
    } else {
        CsvWriter::new(&mut file).include_header(true).finish(df)?;
    }

    tracing::debug!("Wrote {:?}: {} rows × {} cols", path, df.height(), df.width());
    Ok(())
}

/// Encode a DataFrame as CSV text with a header row (fields quoted as needed)
pub(crate) fn csv_bytes(df: &mut DataFrame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf).include_header(true).finish(df)?;
    Ok(buf)
}

/// Decode CSV text with a header row, keeping every column as strings
pub(crate) fn csv_strings(bytes: Vec<u8>) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(std::io::Cursor::new(bytes))
        .finish()?;
    Ok(df)
}

/// Split a table into its identifier column and its numeric columns
///
/// The first column holds row identifiers (cast to string); every other
/// column must be numeric and free of nulls.
pub(crate) fn split_id_and_values(
    df: &DataFrame,
    context: &str,
) -> Result<(Vec<String>, Vec<String>, Vec<Vec<f64>>)> {
    let columns = df.get_columns();
    if columns.len() < 2 {
        return Err(NullModelError::Parse(format!(
            "{}: expected an identifier column plus at least one value column, found {} column(s)",
            context,
            columns.len()
        )));
    }

    let ids_col = columns[0].cast(&DataType::String)?;
    let ids = ids_col.str()?;
    let mut row_ids = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let id = ids.get(idx).ok_or_else(|| {
            NullModelError::Parse(format!("{}: missing identifier in row {}", context, idx + 1))
        })?;
        row_ids.push(id.to_string());
    }

    let mut names = Vec::with_capacity(columns.len() - 1);
    let mut values = Vec::with_capacity(columns.len() - 1);
    for column in &columns[1..] {
        let name = column.name().to_string();
        let cast = column.cast(&DataType::Float64)?;
        let ca = cast.f64()?;

        let mut col_values = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let value = ca.get(idx).ok_or_else(|| {
                NullModelError::Parse(format!(
                    "{}: missing or non-numeric value in column '{}', row {}",
                    context,
                    name,
                    idx + 1
                ))
            })?;
            col_values.push(value);
        }

        names.push(name);
        values.push(col_values);
    }

    Ok((row_ids, names, values))
}
