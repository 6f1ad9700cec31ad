// CSV/TSV import/export of a single page

use std::io::Read;
use std::path::Path;

use rankgrid_engine::page::{ColumnDef, DisplayMeta, Page};
use rankgrid_engine::{CellValue, ColumnType};

use crate::StoreError;

/// Import a page from a delimited file. The delimiter is sniffed from the
/// first lines. The `row_key` column must be present in the header; it
/// becomes the page's first column.
pub fn import(path: &Path, page_name: &str, row_key: &str) -> Result<Page, StoreError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    import_from_string(&content, delimiter, page_name, row_key)
}

pub fn import_tsv(path: &Path, page_name: &str, row_key: &str) -> Result<Page, StoreError> {
    let content = read_file_as_utf8(path)?;
    import_from_string(&content, b'\t', page_name, row_key)
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Must produce >1 field on the first line to be viable
        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // Higher field count breaks ties
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, StoreError> {
    let mut file = std::fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            // Fall back to Windows-1252 (common for Excel-exported CSVs)
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            tracing::debug!("{}: not UTF-8, decoded as Windows-1252", path.display());
            Ok(decoded.into_owned())
        }
    }
}

pub fn import_from_string(
    content: &str,
    delimiter: u8,
    page_name: &str,
    row_key: &str,
) -> Result<Page, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record?,
        None => return Err(StoreError::parse(0, "no header row")),
    };
    let header: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    let key_at = header
        .iter()
        .position(|h| h == row_key)
        .ok_or_else(|| StoreError::parse(1, format!("missing row-key column '{}'", row_key)))?;

    // Key column first, then the rest in file order.
    let order: Vec<usize> = std::iter::once(key_at)
        .chain((0..header.len()).filter(|&i| i != key_at))
        .collect();

    let mut cells: Vec<Vec<String>> = Vec::new();
    for result in records {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() > header.len() {
            return Err(StoreError::parse(
                line,
                format!("expected at most {} fields, found {}", header.len(), record.len()),
            ));
        }
        cells.push(
            order
                .iter()
                .map(|&i| record.get(i).unwrap_or("").to_string())
                .collect(),
        );
    }

    let types: Vec<ColumnType> = (0..order.len())
        .map(|c| {
            if c == 0 {
                ColumnType::String
            } else {
                infer_type(cells.iter().map(|row| row[c].as_str()))
            }
        })
        .collect();

    let columns: Vec<ColumnDef> = order
        .iter()
        .zip(&types)
        .map(|(&i, ty)| ColumnDef::new(header[i].as_str(), *ty))
        .collect();
    let rows: Vec<Vec<CellValue>> = cells
        .iter()
        .map(|row| row.iter().zip(&types).map(|(raw, ty)| cell_from_raw(raw, *ty)).collect())
        .collect();

    let page = Page::from_parts(page_name, columns, rows, DisplayMeta::default(), Vec::new())?;
    tracing::info!(
        "imported page '{}': {} columns, {} rows",
        page.name(),
        page.columns().len(),
        page.row_count()
    );
    Ok(page)
}

/// Narrowest type that holds every non-empty value: boolean, integer, float,
/// else string. A column with no values is a string column.
fn infer_type<'a>(values: impl Iterator<Item = &'a str> + Clone) -> ColumnType {
    let mut present = values.map(str::trim).filter(|v| !v.is_empty()).peekable();
    if present.peek().is_none() {
        return ColumnType::String;
    }
    [ColumnType::Boolean, ColumnType::Integer, ColumnType::Float]
        .into_iter()
        .find(|&ty| {
            present.clone().all(|v| {
                if ty == ColumnType::Boolean {
                    v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false")
                } else {
                    CellValue::parse_as(v, ty).is_some()
                }
            })
        })
        .unwrap_or(ColumnType::String)
}

fn cell_from_raw(raw: &str, ty: ColumnType) -> CellValue {
    if raw.trim().is_empty() && ty != ColumnType::String {
        return ty.zero();
    }
    CellValue::parse_as(raw, ty).unwrap_or_else(|| ty.zero())
}

pub fn export(page: &Page, path: &Path) -> Result<(), StoreError> {
    export_with_delimiter(page, path, b',')
}

pub fn export_tsv(page: &Page, path: &Path) -> Result<(), StoreError> {
    export_with_delimiter(page, path, b'\t')
}

fn export_with_delimiter(page: &Page, path: &Path, delimiter: u8) -> Result<(), StoreError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;
    write_page(page, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// The page as CSV text: header row, then one record per row.
pub fn export_to_string(page: &Page) -> Result<String, StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_page(page, &mut writer)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| StoreError::parse(0, e.to_string()))
}

fn write_page<W: std::io::Write>(page: &Page, writer: &mut csv::Writer<W>) -> Result<(), StoreError> {
    writer.write_record(page.columns().iter().map(ColumnDef::name))?;
    for row in page.rows() {
        writer.write_record(row.values().iter().map(CellValue::display_text))?;
    }
    Ok(())
}
