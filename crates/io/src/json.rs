// JSON export

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use rankgrid_engine::Page;
use serde_json::{Map, Value};

/// The page as an array of row objects keyed by column name. Numbers and
/// booleans keep their JSON types.
pub fn page_to_value(page: &Page) -> Value {
    let rows = page
        .rows()
        .iter()
        .map(|row| {
            let object: Map<String, Value> = page
                .columns()
                .iter()
                .zip(row.values())
                .map(|(def, value)| {
                    let value = serde_json::to_value(value).unwrap_or(Value::Null);
                    (def.name().to_string(), value)
                })
                .collect();
            Value::Object(object)
        })
        .collect();
    Value::Array(rows)
}

pub fn export(page: &Page, path: &Path) -> Result<(), crate::StoreError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &page_to_value(page))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankgrid_engine::ColumnType;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_json_export() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("board.json");

        let mut page = Page::new("Board", "Model").unwrap();
        page.add_column("score", ColumnType::Float).unwrap();
        page.add_column("rank", ColumnType::Integer).unwrap();
        page.add_column("open", ColumnType::Boolean).unwrap();
        page.add_row("alpha").unwrap();
        page.set_cell("alpha", "score", "81.5").unwrap();
        page.set_cell("alpha", "rank", "1").unwrap();
        page.set_cell("alpha", "open", "yes").unwrap();
        page.add_row("beta").unwrap();

        export(&page, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&content).unwrap();
        let rows = parsed.as_array().unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Model"], "alpha");
        assert_eq!(rows[0]["score"], 81.5);
        assert_eq!(rows[0]["rank"], 1);
        assert_eq!(rows[0]["open"], true);
        assert_eq!(rows[1]["score"], 0.0);
    }
}
