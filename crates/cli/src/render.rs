// Plain-text rendering of pages and query results

use rankgrid_engine::{ColumnId, Page, Session};

/// Render a page as an aligned text table followed by its formulas and
/// display settings.
pub fn page_table(page: &Page) -> String {
    let headers: Vec<String> = page
        .columns()
        .iter()
        .map(|c| {
            if c.is_computed() {
                format!("{}*", c.name())
            } else {
                c.name().to_string()
            }
        })
        .collect();
    let rows: Vec<Vec<String>> = page
        .rows()
        .iter()
        .map(|row| row.values().iter().map(|v| v.display_text()).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = format!("== {} ({} rows) ==\n", page.name(), page.row_count());
    out.push_str(&format_line(&headers, &widths));
    for row in &rows {
        out.push_str(&format_line(row, &widths));
    }

    let formulas: Vec<(&str, &str)> = page
        .formula_columns()
        .map(|(column, formula)| (column, formula.source()))
        .collect();
    if !formulas.is_empty() {
        out.push_str("formulas:\n");
        for (column, source) in formulas {
            out.push_str(&format!("  {} = {}\n", column, source));
        }
    }

    let display = page.display();
    if let Some(score) = &display.score_column {
        out.push_str(&format!("score column: {}\n", score));
    }
    if let Some(penalty) = &display.penalty_column {
        out.push_str(&format!("penalty column: {}\n", penalty));
    }
    if !page.plot_columns().is_empty() {
        out.push_str(&format!("plot: {}\n", page.plot_columns().join(", ")));
    }
    out
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &w)| format!("{:<w$}", cell, w = w))
        .collect();
    format!("{}\n", padded.join("  ").trim_end())
}

/// One line per ranked row: position, key, value and the row's score tier.
pub fn ranking(session: &Session, page: &str, ranked: &[(String, f64)]) -> String {
    let mut out = String::new();
    for (i, (key, value)) in ranked.iter().enumerate() {
        let tier = session
            .score_tier(page, key)
            .ok()
            .flatten()
            .map(|t| t.label.as_str())
            .unwrap_or("");
        let line = format!("{:>3}  {}  {}  {}", i + 1, key, rankgrid_engine::value::format_number(*value), tier);
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

pub fn column_list(label: &str, columns: &[ColumnId]) -> String {
    if columns.is_empty() {
        return format!("{}: (none)\n", label);
    }
    let names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    format!("{}: {}\n", label, names.join(", "))
}
