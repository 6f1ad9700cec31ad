// Session store: every page of a session in one CSV-framed text file.
//
// Layout, one page after another:
//
//   rankgrid,1
//   page,<name>
//   meta,<key>,<value>        row_key, score_column, penalty_column, formulas,
//                             refs, score_tiers, penalty_tiers, plot_columns
//   columns,<name>,...
//   types,<type>,...
//   row,<cell>,...
//
// List-valued meta entries are joined with `|`; a literal `|` inside an
// element is written as `||`.

use std::path::Path;

use rankgrid_engine::page::{ColumnDef, DisplayMeta, Page};
use rankgrid_engine::{CellValue, ColumnType, Formula, PenaltyTier, ScoreTier, Session, SessionOptions};

use crate::{StoreError, STORE_FORMAT_VERSION};

const MAGIC: &str = "rankgrid";

// ============================================================================
// Save
// ============================================================================

pub fn save(session: &Session, path: &Path) -> Result<(), StoreError> {
    let text = save_to_string(session)?;
    std::fs::write(path, text)?;
    tracing::info!("saved {} page(s) to {}", session.pages().len(), path.display());
    Ok(())
}

pub fn save_to_string(session: &Session) -> Result<String, StoreError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    writer.write_record([MAGIC, STORE_FORMAT_VERSION.to_string().as_str()])?;
    for page in session.pages() {
        write_page(&mut writer, page)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| StoreError::parse(0, e.to_string()))
}

fn write_page<W: std::io::Write>(writer: &mut csv::Writer<W>, page: &Page) -> Result<(), StoreError> {
    let display = page.display();

    let formulas: Vec<String> = page
        .formula_columns()
        .map(|(column, formula)| format!("{}={}", column, formula.source()))
        .collect();
    let refs: Vec<String> = page
        .formula_columns()
        .map(|(column, formula)| {
            let tokens: Vec<String> = formula.refs().iter().map(|t| t.to_string()).collect();
            format!("{}={}", column, tokens.join(";"))
        })
        .collect();
    let score_tiers: Vec<String> = display
        .score_tiers
        .iter()
        .map(|t| format!("{};{};{}", t.min, t.label, t.color))
        .collect();
    let penalty_tiers: Vec<String> = display
        .penalty_tiers
        .iter()
        .map(|t| format!("{};{};{};{}", t.min, t.max, t.label, t.color))
        .collect();

    writer.write_record(["page", page.name()])?;
    writer.write_record(["meta", "row_key", page.row_key()])?;
    writer.write_record(["meta", "score_column", display.score_column.as_deref().unwrap_or("")])?;
    writer.write_record(["meta", "penalty_column", display.penalty_column.as_deref().unwrap_or("")])?;
    writer.write_record(["meta", "formulas", join_list(&formulas).as_str()])?;
    writer.write_record(["meta", "refs", join_list(&refs).as_str()])?;
    writer.write_record(["meta", "score_tiers", join_list(&score_tiers).as_str()])?;
    writer.write_record(["meta", "penalty_tiers", join_list(&penalty_tiers).as_str()])?;
    writer.write_record(["meta", "plot_columns", join_list(page.plot_columns()).as_str()])?;

    let mut names = vec!["columns".to_string()];
    let mut types = vec!["types".to_string()];
    for def in page.columns() {
        names.push(def.name().to_string());
        types.push(def.ty().to_string());
    }
    writer.write_record(&names)?;
    writer.write_record(&types)?;

    for row in page.rows() {
        let mut record = vec!["row".to_string()];
        record.extend(row.values().iter().map(CellValue::display_text));
        writer.write_record(&record)?;
    }
    Ok(())
}

// ============================================================================
// Load
// ============================================================================

pub fn load(path: &Path, options: SessionOptions) -> Result<Session, StoreError> {
    let text = std::fs::read_to_string(path)?;
    let session = load_from_str(&text, options)?;
    tracing::info!("loaded {} page(s) from {}", session.pages().len(), path.display());
    Ok(session)
}

/// Parse a store and assemble the session. Every page is built before the
/// dependency graph and the first recompute, so cross-page references
/// resolve regardless of page order.
pub fn load_from_str(text: &str, options: SessionOptions) -> Result<Session, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut pages: Vec<Page> = Vec::new();
    let mut pending: Option<PendingPage> = None;
    let mut seen_header = false;

    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let fields: Vec<&str> = record.iter().collect();

        if !seen_header {
            check_header(&fields, line)?;
            seen_header = true;
            continue;
        }

        match fields.first().copied() {
            Some("page") => {
                if let Some(done) = pending.take() {
                    pages.push(done.finish()?);
                }
                let name = fields
                    .get(1)
                    .ok_or_else(|| StoreError::parse(line, "page record without a name"))?;
                pending = Some(PendingPage::new(name, line));
            }
            Some(kind) => {
                let page = pending
                    .as_mut()
                    .ok_or_else(|| StoreError::parse(line, format!("'{}' record before any page", kind)))?;
                page.apply(kind, &fields[1..], line)?;
            }
            None => {}
        }
    }

    if !seen_header {
        return Err(StoreError::parse(0, "empty store"));
    }
    if let Some(done) = pending.take() {
        pages.push(done.finish()?);
    }

    Ok(Session::from_pages(pages, options)?)
}

fn check_header(fields: &[&str], line: u64) -> Result<(), StoreError> {
    match fields {
        [MAGIC, version] => {
            let version: u32 = version
                .parse()
                .map_err(|_| StoreError::parse(line, format!("bad format version '{}'", version)))?;
            if version > STORE_FORMAT_VERSION {
                return Err(StoreError::parse(
                    line,
                    format!("format version {} is newer than supported ({})", version, STORE_FORMAT_VERSION),
                ));
            }
            Ok(())
        }
        _ => Err(StoreError::parse(line, "not a rankgrid store")),
    }
}

/// Records of one page, collected until the next `page` record.
struct PendingPage {
    name: String,
    line: u64,
    row_key: Option<String>,
    display: DisplayMeta,
    formulas: Vec<(String, String)>,
    plot_columns: Vec<String>,
    columns: Vec<String>,
    types: Vec<ColumnType>,
    rows: Vec<(u64, Vec<String>)>,
}

impl PendingPage {
    fn new(name: &str, line: u64) -> Self {
        Self {
            name: name.to_string(),
            line,
            row_key: None,
            display: DisplayMeta::default(),
            formulas: Vec::new(),
            plot_columns: Vec::new(),
            columns: Vec::new(),
            types: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn apply(&mut self, kind: &str, fields: &[&str], line: u64) -> Result<(), StoreError> {
        match kind {
            "meta" => {
                let (key, value) = match fields {
                    [key] => (*key, ""),
                    [key, value, ..] => (*key, *value),
                    [] => return Err(StoreError::parse(line, "meta record without a key")),
                };
                self.apply_meta(key, value, line)
            }
            "columns" => {
                self.columns = fields.iter().map(|s| s.to_string()).collect();
                Ok(())
            }
            "types" => {
                self.types = fields
                    .iter()
                    .map(|s| {
                        s.parse::<ColumnType>()
                            .map_err(|_| StoreError::parse(line, format!("unknown column type '{}'", s)))
                    })
                    .collect::<Result<_, _>>()?;
                Ok(())
            }
            "row" => {
                self.rows.push((line, fields.iter().map(|s| s.to_string()).collect()));
                Ok(())
            }
            other => Err(StoreError::parse(line, format!("unknown record '{}'", other))),
        }
    }

    fn apply_meta(&mut self, key: &str, value: &str, line: u64) -> Result<(), StoreError> {
        let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());
        match key {
            "row_key" => self.row_key = optional(value),
            "score_column" => self.display.score_column = optional(value),
            "penalty_column" => self.display.penalty_column = optional(value),
            "formulas" => {
                self.formulas = split_list(value)
                    .into_iter()
                    .map(|entry| {
                        entry
                            .split_once('=')
                            .map(|(c, f)| (c.to_string(), f.to_string()))
                            .ok_or_else(|| StoreError::parse(line, format!("bad formula entry '{}'", entry)))
                    })
                    .collect::<Result<_, _>>()?;
            }
            // Derived from the formulas on load.
            "refs" => {}
            // An empty list is a real value; defaults apply only when the
            // record is missing.
            "score_tiers" => {
                self.display.score_tiers = split_list(value)
                    .iter()
                    .map(|entry| parse_score_tier(entry, line))
                    .collect::<Result<_, _>>()?;
            }
            "penalty_tiers" => {
                self.display.penalty_tiers = split_list(value)
                    .iter()
                    .map(|entry| parse_penalty_tier(entry, line))
                    .collect::<Result<_, _>>()?;
            }
            "plot_columns" => self.plot_columns = split_list(value),
            other => tracing::warn!("store line {}: ignoring unknown meta key '{}'", line, other),
        }
        Ok(())
    }

    fn finish(self) -> Result<Page, StoreError> {
        if self.columns.is_empty() {
            return Err(StoreError::parse(self.line, format!("page '{}' has no columns", self.name)));
        }
        if self.columns.len() != self.types.len() {
            return Err(StoreError::parse(
                self.line,
                format!(
                    "page '{}': {} columns but {} types",
                    self.name,
                    self.columns.len(),
                    self.types.len()
                ),
            ));
        }
        if let Some(row_key) = &self.row_key {
            if *row_key != self.columns[0] {
                return Err(StoreError::parse(
                    self.line,
                    format!("page '{}': row key '{}' is not the first column", self.name, row_key),
                ));
            }
        }
        for (column, _) in &self.formulas {
            if !self.columns.contains(column) {
                return Err(StoreError::parse(
                    self.line,
                    format!("page '{}': formula for unknown column '{}'", self.name, column),
                ));
            }
        }

        let defs: Vec<ColumnDef> = self
            .columns
            .iter()
            .zip(&self.types)
            .map(|(name, ty)| {
                let def = ColumnDef::new(name.as_str(), *ty);
                match self.formulas.iter().find(|(c, _)| c == name) {
                    Some((_, src)) => def.with_formula(Formula::new(src)),
                    None => def,
                }
            })
            .collect();

        let mut rows = Vec::with_capacity(self.rows.len());
        for (line, cells) in &self.rows {
            if cells.len() != self.columns.len() {
                return Err(StoreError::parse(
                    *line,
                    format!("expected {} cells, found {}", self.columns.len(), cells.len()),
                ));
            }
            let values: Vec<CellValue> = cells
                .iter()
                .zip(&self.types)
                .map(|(raw, ty)| {
                    CellValue::parse_as(raw, *ty).unwrap_or_else(|| {
                        tracing::warn!("store line {}: '{}' is not a valid {}; converted", line, raw, ty);
                        CellValue::Text(raw.clone()).convert_to(*ty)
                    })
                })
                .collect();
            rows.push(values);
        }

        Ok(Page::from_parts(self.name, defs, rows, self.display, self.plot_columns)?)
    }
}

fn parse_score_tier(entry: &str, line: u64) -> Result<ScoreTier, StoreError> {
    let parts: Vec<&str> = entry.split(';').collect();
    match parts.as_slice() {
        [min, label, color] => Ok(ScoreTier::new(parse_bound(min, line)?, *label, *color)),
        _ => Err(StoreError::parse(line, format!("bad score tier '{}'", entry))),
    }
}

fn parse_penalty_tier(entry: &str, line: u64) -> Result<PenaltyTier, StoreError> {
    let parts: Vec<&str> = entry.split(';').collect();
    match parts.as_slice() {
        [min, max, label, color] => Ok(PenaltyTier::new(
            parse_bound(min, line)?,
            parse_bound(max, line)?,
            *label,
            *color,
        )),
        _ => Err(StoreError::parse(line, format!("bad penalty tier '{}'", entry))),
    }
}

// Accepts `inf` / `-inf` for open-ended tiers.
fn parse_bound(text: &str, line: u64) -> Result<f64, StoreError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| !n.is_nan())
        .ok_or_else(|| StoreError::parse(line, format!("bad tier bound '{}'", text)))
}

// ============================================================================
// `|` lists
// ============================================================================

/// Join elements with `|`, doubling any `|` inside an element.
pub fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|s| s.as_ref().replace('|', "||"))
        .collect::<Vec<_>>()
        .join("|")
}

/// Inverse of `join_list`. Scanning left to right, `||` is a literal pipe
/// and a single `|` ends an element. An empty string is an empty list.
pub fn split_list(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '|' {
            current.push(c);
        } else if chars.peek() == Some(&'|') {
            chars.next();
            current.push('|');
        } else {
            items.push(std::mem::take(&mut current));
        }
    }
    items.push(current);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Session {
        let mut s = Session::new(SessionOptions::default()).unwrap();
        s.add_column("Default", "score", ColumnType::Float).unwrap();
        s.add_column("Default", "penalty", ColumnType::Integer).unwrap();
        s.add_column("Default", "open", ColumnType::Boolean).unwrap();
        s.add_column("Default", "note", ColumnType::String).unwrap();
        for (key, score, penalty) in [("alpha", "81.5", "3"), ("beta", "42", "12")] {
            s.add_row("Default", key).unwrap();
            s.update_cell("Default", key, "score", score).unwrap();
            s.update_cell("Default", key, "penalty", penalty).unwrap();
        }
        s.update_cell("Default", "alpha", "open", "yes").unwrap();
        s.update_cell("Default", "beta", "note", "said \"hi\", then left").unwrap();
        s.set_score_column("Default", Some("score")).unwrap();
        s.set_penalty_column("Default", Some("penalty")).unwrap();
        s.set_plot_columns("Default", &["score", "penalty"]).unwrap();

        s.add_page("Extra").unwrap();
        s.add_column("Extra", "bonus", ColumnType::Integer).unwrap();
        s.add_row("Extra", "alpha").unwrap();
        s.update_cell("Extra", "alpha", "bonus", "7").unwrap();

        s.add_column("Default", "net", ColumnType::Float).unwrap();
        s.set_formula("Default", "net", "{score} - {penalty} + {Extra:bonus}").unwrap();
        s
    }

    #[test]
    fn test_list_escaping() {
        let items = vec!["a|b".to_string(), "".to_string(), "c||".to_string()];
        let joined = join_list(&items);
        assert_eq!(joined, "a||b||c||||");
        assert_eq!(split_list(&joined), items);
        assert!(split_list("").is_empty());
        assert_eq!(split_list("x|y"), vec!["x", "y"]);
    }

    #[test]
    fn test_store_round_trip() {
        let session = sample();
        let text = save_to_string(&session).unwrap();
        let loaded = load_from_str(&text, SessionOptions::default()).unwrap();

        assert_eq!(loaded.pages(), session.pages());
        assert_eq!(loaded.cell_value("Default", "alpha", "net").unwrap(), &CellValue::Float(85.5));
        assert_eq!(loaded.dependents("Extra", "bonus").unwrap().len(), 1);
        assert!(!loaded.can_undo());
    }

    #[test]
    fn test_store_layout() {
        let text = save_to_string(&sample()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("rankgrid,1"));
        assert_eq!(lines.next(), Some("page,Default"));
        assert!(text.contains("meta,formulas,net={score} - {penalty} + {Extra:bonus}"));
        assert!(text.contains("meta,refs,net={score};{penalty};{Extra:bonus}"));
        assert!(text.contains("meta,plot_columns,score|penalty"));
        assert!(text.contains("columns,Model,score,penalty,open,note,net"));
        assert!(text.contains("types,string,float,integer,boolean,string,float"));
    }

    #[test]
    fn test_formula_with_pipe_survives() {
        let mut s = Session::new(SessionOptions::default()).unwrap();
        s.add_column("Default", "x", ColumnType::Float).unwrap();
        s.set_formula("Default", "x", "1 | 2").unwrap();
        let text = save_to_string(&s).unwrap();
        assert!(text.contains("x=1 || 2"));

        let loaded = load_from_str(&text, SessionOptions::default()).unwrap();
        let formula = loaded.page("Default").unwrap().column("x").unwrap().formula().unwrap();
        assert_eq!(formula.source(), "1 | 2");
    }

    #[test]
    fn test_load_orders_pages_before_recompute() {
        // The referencing page comes first in the file.
        let text = "rankgrid,1\n\
            page,A\n\
            meta,formulas,total={B:v} * 2\n\
            columns,Model,total\n\
            types,string,float\n\
            row,k,0\n\
            page,B\n\
            columns,Model,v\n\
            types,string,integer\n\
            row,k,21\n";
        let s = load_from_str(text, SessionOptions::default()).unwrap();
        assert_eq!(s.cell_value("A", "k", "total").unwrap(), &CellValue::Float(42.0));
    }

    #[test]
    fn test_load_cycle_degrades_to_zero() {
        let text = "rankgrid,1\n\
            page,P\n\
            meta,formulas,a={b}|b={a}\n\
            columns,Model,a,b\n\
            types,string,float,float\n\
            row,k,3,4\n";
        let s = load_from_str(text, SessionOptions::default()).unwrap();
        assert!(s.last_recalc().had_cycles);
        assert_eq!(s.cell_value("P", "k", "a").unwrap(), &CellValue::Float(0.0));
        assert_eq!(s.cell_value("P", "k", "b").unwrap(), &CellValue::Float(0.0));
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            load_from_str("hello,1\n", SessionOptions::default()),
            Err(StoreError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            load_from_str("rankgrid,99\n", SessionOptions::default()),
            Err(StoreError::Parse { .. })
        ));
        assert!(matches!(
            load_from_str("rankgrid,1\nrow,a\n", SessionOptions::default()),
            Err(StoreError::Parse { line: 2, .. })
        ));

        let dup = "rankgrid,1\npage,P\ncolumns,Model\ntypes,string\nrow,a\nrow,a\n";
        assert!(matches!(
            load_from_str(dup, SessionOptions::default()),
            Err(StoreError::Engine(_))
        ));

        let short = "rankgrid,1\npage,P\ncolumns,Model,x\ntypes,string,integer\nrow,a\n";
        assert!(matches!(
            load_from_str(short, SessionOptions::default()),
            Err(StoreError::Parse { line: 5, .. })
        ));
    }

    #[test]
    fn test_custom_tiers_round_trip() {
        let mut s = sample();
        s.set_score_tiers(
            "Default",
            vec![ScoreTier::new(60.0, "Pass", "green"), ScoreTier::new(f64::NEG_INFINITY, "Fail", "red")],
        )
        .unwrap();
        let text = save_to_string(&s).unwrap();
        assert!(text.contains("meta,score_tiers,60;Pass;green|-inf;Fail;red"));

        let loaded = load_from_str(&text, SessionOptions::default()).unwrap();
        assert_eq!(loaded.score_tier("Default", "alpha").unwrap().unwrap().label, "Pass");
        assert_eq!(loaded.score_tier("Default", "beta").unwrap().unwrap().label, "Fail");
    }

    #[test]
    fn test_empty_tier_lists_round_trip() {
        let mut s = sample();
        s.set_score_tiers("Default", vec![]).unwrap();
        s.set_penalty_tiers("Default", vec![]).unwrap();
        let text = save_to_string(&s).unwrap();
        assert!(text.contains("meta,score_tiers,\n"));
        assert!(text.contains("meta,penalty_tiers,\n"));

        let loaded = load_from_str(&text, SessionOptions::default()).unwrap();
        assert!(loaded.page("Default").unwrap().display().score_tiers.is_empty());
        assert!(loaded.page("Default").unwrap().display().penalty_tiers.is_empty());
        assert_eq!(loaded.pages(), s.pages());
        assert!(loaded.score_tier("Default", "alpha").unwrap().is_none());
    }

    #[test]
    fn test_missing_tier_records_use_defaults() {
        use rankgrid_engine::tiers::{default_penalty_tiers, default_score_tiers};

        let text = "rankgrid,1\npage,P\ncolumns,Model\ntypes,string\nrow,a\n";
        let s = load_from_str(text, SessionOptions::default()).unwrap();
        let display = s.page("P").unwrap().display();
        assert_eq!(display.score_tiers, default_score_tiers());
        assert_eq!(display.penalty_tiers, default_penalty_tiers());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("board.rgrid");
        let session = sample();

        save(&session, &path).unwrap();
        let loaded = load(&path, SessionOptions::default()).unwrap();
        assert_eq!(loaded.pages(), session.pages());

        let missing = dir.path().join("missing.rgrid");
        assert!(matches!(load(&missing, SessionOptions::default()), Err(StoreError::Io(_))));
    }
}
