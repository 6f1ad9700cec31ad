//! One table of a session: typed columns, keyed rows, display metadata.
//!
//! Page methods enforce everything that can be checked from the page alone.
//! Checks that need the rest of the session (references from other pages,
//! formula validation) and the follow-up recompute live in `Session`.

use rustc_hash::FxHashMap;

use crate::error::{EngineError, InUseReason, Result};
use crate::formula::Formula;
use crate::tiers::{default_penalty_tiers, default_score_tiers, PenaltyTier, ScoreTier};
use crate::value::{CellValue, ColumnType};

/// Column definition. A column with a formula is computed.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    name: String,
    ty: ColumnType,
    formula: Option<Formula>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            formula: None,
        }
    }

    pub fn with_formula(mut self, formula: Formula) -> Self {
        self.formula = Some(formula);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ColumnType {
        self.ty
    }

    pub fn formula(&self) -> Option<&Formula> {
        self.formula.as_ref()
    }

    pub fn is_computed(&self) -> bool {
        self.formula.is_some()
    }
}

/// Cell values of one row, aligned with the page's columns. The row key
/// sits at index 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<CellValue>,
}

impl Row {
    pub fn key(&self) -> &str {
        self.values.first().and_then(CellValue::as_text).unwrap_or("")
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn get(&self, column: usize) -> Option<&CellValue> {
        self.values.get(column)
    }
}

/// Score/penalty designation and tier tables.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMeta {
    pub score_column: Option<String>,
    pub penalty_column: Option<String>,
    pub score_tiers: Vec<ScoreTier>,
    pub penalty_tiers: Vec<PenaltyTier>,
}

impl Default for DisplayMeta {
    fn default() -> Self {
        Self {
            score_column: None,
            penalty_column: None,
            score_tiers: default_score_tiers(),
            penalty_tiers: default_penalty_tiers(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    name: String,
    columns: Vec<ColumnDef>,
    rows: Vec<Row>,
    display: DisplayMeta,
    plot_columns: Vec<String>,
    /// Row key -> row position. Rebuilt whenever rows or keys change.
    key_index: FxHashMap<String, usize>,
}

// The key index is derived from `rows`.
impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.columns == other.columns
            && self.rows == other.rows
            && self.display == other.display
            && self.plot_columns == other.plot_columns
    }
}

/// Page and column names end up inside `{page:column}` tokens and
/// `|`-separated `column=value` lists, so the delimiters are reserved.
pub fn validate_name(name: &str) -> Result<()> {
    let reserved = |c: char| matches!(c, '{' | '}' | '|' | ':' | '=');
    if name.trim().is_empty() || name.contains(reserved) {
        return Err(EngineError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl Page {
    /// Create an empty page whose only column is the string row-key column.
    pub fn new(name: impl Into<String>, row_key: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let row_key = row_key.into();
        validate_name(&name)?;
        validate_name(&row_key)?;
        Ok(Self {
            name,
            columns: vec![ColumnDef::new(row_key, ColumnType::String)],
            rows: Vec::new(),
            display: DisplayMeta::default(),
            plot_columns: Vec::new(),
            key_index: FxHashMap::default(),
        })
    }

    /// Assemble a page from stored parts, as a loader does.
    ///
    /// The first column is the row key; it must be a string column without a
    /// formula. Each row must have one value per column; values are converted
    /// to their column's type.
    pub fn from_parts(
        name: impl Into<String>,
        columns: Vec<ColumnDef>,
        rows: Vec<Vec<CellValue>>,
        display: DisplayMeta,
        plot_columns: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;

        let Some(key_col) = columns.first() else {
            return Err(EngineError::InvalidName(String::new()));
        };
        if key_col.ty != ColumnType::String || key_col.is_computed() {
            return Err(EngineError::ColumnInUse {
                page: name,
                column: key_col.name.clone(),
                reason: InUseReason::RowKey,
            });
        }
        for (i, col) in columns.iter().enumerate() {
            validate_name(&col.name)?;
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(EngineError::DuplicateColumn {
                    page: name,
                    column: col.name.clone(),
                });
            }
        }

        let mut page = Self {
            name,
            columns,
            rows: Vec::new(),
            display: DisplayMeta::default(),
            plot_columns: Vec::new(),
            key_index: FxHashMap::default(),
        };

        for values in rows {
            let key = values.first().map(CellValue::display_text).unwrap_or_default();
            page.check_new_key(&key, None)?;
            let mut values: Vec<CellValue> = page
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| values.get(i).map_or_else(|| c.ty.zero(), |v| v.convert_to(c.ty)))
                .collect();
            values[0] = CellValue::Text(key.clone());
            page.key_index.insert(key, page.rows.len());
            page.rows.push(Row { values });
        }

        if let Some(score) = display.score_column.as_deref() {
            page.set_score_column(Some(score))?;
        }
        if let Some(penalty) = display.penalty_column.as_deref() {
            page.set_penalty_column(Some(penalty))?;
        }
        page.set_score_tiers(display.score_tiers)?;
        page.set_penalty_tiers(display.penalty_tiers)?;
        page.set_plot_columns(&plot_columns)?;
        Ok(page)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Name of the row-key column.
    pub fn row_key(&self) -> &str {
        self.columns[0].name()
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(Row::key)
    }

    pub fn row_index(&self, key: &str) -> Option<usize> {
        self.key_index.get(key).copied()
    }

    pub fn row(&self, key: &str) -> Option<&Row> {
        self.row_index(key).map(|i| &self.rows[i])
    }

    pub fn cell(&self, key: &str, column: &str) -> Option<&CellValue> {
        let col = self.column_index(column)?;
        self.row(key)?.get(col)
    }

    pub fn display(&self) -> &DisplayMeta {
        &self.display
    }

    pub fn plot_columns(&self) -> &[String] {
        &self.plot_columns
    }

    /// Names of integer, float and boolean columns, in column order.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.ty.is_numeric())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Columns with a formula, in column order.
    pub fn formula_columns(&self) -> impl Iterator<Item = (&str, &Formula)> + '_ {
        self.columns
            .iter()
            .filter_map(|c| c.formula.as_ref().map(|f| (c.name.as_str(), f)))
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// Append a row. Every column starts at its type's zero value; computed
    /// columns are filled by the next recompute.
    pub fn add_row(&mut self, key: &str) -> Result<()> {
        self.check_new_key(key, None)?;
        let mut values: Vec<CellValue> = self.columns.iter().map(|c| c.ty.zero()).collect();
        values[0] = CellValue::Text(key.to_string());
        self.key_index.insert(key.to_string(), self.rows.len());
        self.rows.push(Row { values });
        Ok(())
    }

    /// Remove rows by key, preserving the order of the rest. Fails without
    /// removing anything if a key is unknown.
    pub fn remove_rows<S: AsRef<str>>(&mut self, keys: &[S]) -> Result<usize> {
        for key in keys {
            let key = key.as_ref();
            if !self.key_index.contains_key(key) {
                return Err(self.row_not_found(key));
            }
        }
        let before = self.rows.len();
        self.rows
            .retain(|row| !keys.iter().any(|k| k.as_ref() == row.key()));
        self.rebuild_index();
        Ok(before - self.rows.len())
    }

    /// Coerce `raw` into the column's type and store it. Returns `false`
    /// when the coerced value equals the current one.
    pub fn set_cell(&mut self, key: &str, column: &str, raw: &str) -> Result<bool> {
        let col = self.require_column(column)?;
        let row = self.row_index(key).ok_or_else(|| self.row_not_found(key))?;
        let def = &self.columns[col];

        if def.is_computed() {
            return Err(self.in_use(column, InUseReason::Computed));
        }

        let value = CellValue::parse_as(raw, def.ty).ok_or_else(|| EngineError::TypeCoercion {
            column: column.to_string(),
            ty: def.ty,
            input: raw.to_string(),
        })?;

        if self.rows[row].values[col] == value {
            return Ok(false);
        }

        if col == 0 {
            self.check_new_key(raw, Some(row))?;
            self.key_index.remove(key);
            self.key_index.insert(raw.to_string(), row);
        }
        self.rows[row].values[col] = value;
        Ok(true)
    }

    // ========================================================================
    // Columns
    // ========================================================================

    /// Append a column, back-filled with the type's zero value.
    pub fn add_column(&mut self, name: &str, ty: ColumnType) -> Result<()> {
        validate_name(name)?;
        if self.column_index(name).is_some() {
            return Err(EngineError::DuplicateColumn {
                page: self.name.clone(),
                column: name.to_string(),
            });
        }
        self.columns.push(ColumnDef::new(name, ty));
        for row in &mut self.rows {
            row.values.push(ty.zero());
        }
        Ok(())
    }

    /// Rename a column and carry its score/penalty/plot designation along.
    /// Formula text that mentions the column is rewritten by the session.
    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<()> {
        let col = self.require_column(old)?;
        if col == 0 {
            return Err(self.in_use(old, InUseReason::RowKey));
        }
        validate_name(new)?;
        if self.column_index(new).is_some() {
            return Err(EngineError::DuplicateColumn {
                page: self.name.clone(),
                column: new.to_string(),
            });
        }

        self.columns[col].name = new.to_string();
        for slot in [&mut self.display.score_column, &mut self.display.penalty_column] {
            if slot.as_deref() == Some(old) {
                *slot = Some(new.to_string());
            }
        }
        for plotted in &mut self.plot_columns {
            if plotted == old {
                *plotted = new.to_string();
            }
        }
        Ok(())
    }

    /// Convert every cell of a column to `ty`, best effort per cell.
    /// Returns `false` if the column already has that type.
    pub fn change_column_type(&mut self, column: &str, ty: ColumnType) -> Result<bool> {
        let col = self.require_column(column)?;
        if col == 0 {
            return Err(self.in_use(column, InUseReason::RowKey));
        }
        if self.columns[col].ty == ty {
            return Ok(false);
        }

        self.columns[col].ty = ty;
        for row in &mut self.rows {
            let converted = row.values[col].convert_to(ty);
            row.values[col] = converted;
        }
        Ok(true)
    }

    /// Drop a column. Refuses the row key, computed columns and the
    /// score/penalty columns; references from formulas are checked by the
    /// session beforehand. A plotted column leaves the plot selection.
    pub fn remove_column(&mut self, column: &str) -> Result<()> {
        let col = self.check_removable(column)?;
        self.columns.remove(col);
        for row in &mut self.rows {
            row.values.remove(col);
        }
        self.plot_columns.retain(|c| c != column);
        Ok(())
    }

    /// Page-local deletion guards, in order: row key, computed, designated.
    pub(crate) fn check_removable(&self, column: &str) -> Result<usize> {
        let col = self.require_column(column)?;
        if col == 0 {
            return Err(self.in_use(column, InUseReason::RowKey));
        }
        if self.columns[col].is_computed() {
            return Err(self.in_use(column, InUseReason::Computed));
        }
        if self.is_designated(column) {
            return Err(self.in_use(column, InUseReason::Designated));
        }
        Ok(col)
    }

    pub fn is_designated(&self, column: &str) -> bool {
        self.display.score_column.as_deref() == Some(column)
            || self.display.penalty_column.as_deref() == Some(column)
    }

    pub(crate) fn set_formula(&mut self, column: usize, formula: Option<Formula>) {
        self.columns[column].formula = formula;
    }

    /// Overwrite a column with computed values, one per row.
    pub(crate) fn write_column(&mut self, column: usize, values: Vec<CellValue>) {
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.values[column] = value;
        }
    }

    // ========================================================================
    // Display metadata
    // ========================================================================

    pub fn set_score_column(&mut self, column: Option<&str>) -> Result<()> {
        if let Some(name) = column {
            self.require_numeric(name)?;
            if self.display.penalty_column.as_deref() == Some(name) {
                return Err(self.in_use(name, InUseReason::Designated));
            }
        }
        self.display.score_column = column.map(str::to_string);
        Ok(())
    }

    pub fn set_penalty_column(&mut self, column: Option<&str>) -> Result<()> {
        if let Some(name) = column {
            self.require_numeric(name)?;
            if self.display.score_column.as_deref() == Some(name) {
                return Err(self.in_use(name, InUseReason::Designated));
            }
        }
        self.display.penalty_column = column.map(str::to_string);
        Ok(())
    }

    pub fn set_score_tiers(&mut self, mut tiers: Vec<ScoreTier>) -> Result<()> {
        for tier in &tiers {
            check_tier_text(&tier.label)?;
            check_tier_text(&tier.color)?;
        }
        crate::tiers::sort_score_tiers(&mut tiers);
        self.display.score_tiers = tiers;
        Ok(())
    }

    pub fn set_penalty_tiers(&mut self, tiers: Vec<PenaltyTier>) -> Result<()> {
        for tier in &tiers {
            check_tier_text(&tier.label)?;
            check_tier_text(&tier.color)?;
        }
        self.display.penalty_tiers = tiers;
        Ok(())
    }

    /// Replace the plot selection. Duplicates are dropped, first one wins.
    pub fn set_plot_columns<S: AsRef<str>>(&mut self, columns: &[S]) -> Result<()> {
        let mut selection: Vec<String> = Vec::with_capacity(columns.len());
        for name in columns {
            let name = name.as_ref();
            self.require_numeric(name)?;
            if !selection.iter().any(|c| c == name) {
                selection.push(name.to_string());
            }
        }
        self.plot_columns = selection;
        Ok(())
    }

    /// Clear score/penalty/plot designations that point at `column`.
    /// Returns `true` if any were cleared.
    pub(crate) fn clear_designations(&mut self, column: &str) -> bool {
        let mut cleared = false;
        for slot in [&mut self.display.score_column, &mut self.display.penalty_column] {
            if slot.as_deref() == Some(column) {
                *slot = None;
                cleared = true;
            }
        }
        let before = self.plot_columns.len();
        self.plot_columns.retain(|c| c != column);
        cleared || self.plot_columns.len() != before
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn rebuild_index(&mut self) {
        self.key_index = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.key().to_string(), i))
            .collect();
    }

    // `current` is the row being edited, which may keep its own key.
    fn check_new_key(&self, key: &str, current: Option<usize>) -> Result<()> {
        if key.trim().is_empty() {
            return Err(EngineError::EmptyKey {
                page: self.name.clone(),
            });
        }
        match self.row_index(key) {
            Some(existing) if Some(existing) != current => Err(EngineError::DuplicateKey {
                page: self.name.clone(),
                key: key.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column).ok_or_else(|| EngineError::ColumnNotFound {
            page: self.name.clone(),
            column: column.to_string(),
        })
    }

    fn require_numeric(&self, column: &str) -> Result<usize> {
        let col = self.require_column(column)?;
        if !self.columns[col].ty.is_numeric() {
            return Err(EngineError::NonNumericColumn {
                page: self.name.clone(),
                column: column.to_string(),
            });
        }
        Ok(col)
    }

    fn row_not_found(&self, key: &str) -> EngineError {
        EngineError::RowNotFound {
            page: self.name.clone(),
            key: key.to_string(),
        }
    }

    fn in_use(&self, column: &str, reason: InUseReason) -> EngineError {
        EngineError::ColumnInUse {
            page: self.name.clone(),
            column: column.to_string(),
            reason,
        }
    }
}

fn check_tier_text(text: &str) -> Result<()> {
    if crate::tiers::is_valid_tier_text(text) {
        Ok(())
    } else {
        Err(EngineError::InvalidName(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with(columns: &[(&str, ColumnType)], keys: &[&str]) -> Page {
        let mut page = Page::new("Main", "Model").unwrap();
        for (name, ty) in columns {
            page.add_column(name, *ty).unwrap();
        }
        for key in keys {
            page.add_row(key).unwrap();
        }
        page
    }

    #[test]
    fn test_new_page_has_key_column() {
        let page = Page::new("Main", "Model").unwrap();
        assert_eq!(page.row_key(), "Model");
        assert_eq!(page.columns()[0].ty(), ColumnType::String);
        assert_eq!(page.row_count(), 0);
    }

    #[test]
    fn test_invalid_names() {
        assert!(Page::new("  ", "Model").is_err());
        assert!(Page::new("a:b", "Model").is_err());
        assert!(Page::new("a{b", "Model").is_err());
        let mut page = Page::new("Main", "Model").unwrap();
        assert_eq!(
            page.add_column("x|y", ColumnType::Integer),
            Err(EngineError::InvalidName("x|y".into()))
        );
        assert!(page.add_column("x:y", ColumnType::Integer).is_err());
    }

    #[test]
    fn test_add_row_zero_fills() {
        let page = page_with(
            &[
                ("note", ColumnType::String),
                ("n", ColumnType::Integer),
                ("f", ColumnType::Float),
                ("b", ColumnType::Boolean),
            ],
            &["gpt"],
        );
        let row = page.row("gpt").unwrap();
        assert_eq!(row.key(), "gpt");
        assert_eq!(
            row.values()[1..].to_vec(),
            vec![
                CellValue::Text(String::new()),
                CellValue::Integer(0),
                CellValue::Float(0.0),
                CellValue::Boolean(false)
            ]
        );
    }

    #[test]
    fn test_add_row_rejects_duplicate_and_blank_keys() {
        let mut page = page_with(&[], &["a"]);
        assert!(matches!(page.add_row("a"), Err(EngineError::DuplicateKey { .. })));
        assert!(matches!(page.add_row("  "), Err(EngineError::EmptyKey { .. })));
        assert_eq!(page.row_count(), 1);
    }

    #[test]
    fn test_add_column_backfills() {
        let mut page = page_with(&[], &["a", "b"]);
        page.add_column("score", ColumnType::Float).unwrap();
        assert_eq!(page.cell("b", "score"), Some(&CellValue::Float(0.0)));
        assert!(matches!(
            page.add_column("score", ColumnType::Integer),
            Err(EngineError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn test_remove_rows_preserves_order() {
        let mut page = page_with(&[], &["a", "b", "c", "d"]);
        assert_eq!(page.remove_rows(&["b", "d"]).unwrap(), 2);
        assert_eq!(page.keys().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(page.row_index("c"), Some(1));
    }

    #[test]
    fn test_remove_rows_unknown_key_removes_nothing() {
        let mut page = page_with(&[], &["a", "b"]);
        assert!(matches!(page.remove_rows(&["a", "zz"]), Err(EngineError::RowNotFound { .. })));
        assert_eq!(page.row_count(), 2);
    }

    #[test]
    fn test_set_cell_coerces() {
        let mut page = page_with(&[("age", ColumnType::Integer)], &["a"]);
        assert!(page.set_cell("a", "age", " 41 ").unwrap());
        assert_eq!(page.cell("a", "age"), Some(&CellValue::Integer(41)));

        let err = page.set_cell("a", "age", "abc").unwrap_err();
        assert!(matches!(err, EngineError::TypeCoercion { .. }));
        assert_eq!(page.cell("a", "age"), Some(&CellValue::Integer(41)));
    }

    #[test]
    fn test_set_cell_same_value_is_noop() {
        let mut page = page_with(&[("age", ColumnType::Integer)], &["a"]);
        assert!(!page.set_cell("a", "age", "0").unwrap());
    }

    #[test]
    fn test_set_key_cell() {
        let mut page = page_with(&[], &["a", "b"]);
        assert!(matches!(
            page.set_cell("a", "Model", "b"),
            Err(EngineError::DuplicateKey { .. })
        ));
        assert!(matches!(page.set_cell("a", "Model", " "), Err(EngineError::EmptyKey { .. })));
        assert!(page.set_cell("a", "Model", "z").unwrap());
        assert_eq!(page.row_index("z"), Some(0));
        assert_eq!(page.row_index("a"), None);
    }

    #[test]
    fn test_computed_cell_not_editable() {
        let mut page = page_with(&[("total", ColumnType::Float)], &["a"]);
        page.set_formula(1, Some(Formula::new("1 + 1")));
        assert!(matches!(
            page.set_cell("a", "total", "3"),
            Err(EngineError::ColumnInUse { reason: InUseReason::Computed, .. })
        ));
    }

    #[test]
    fn test_rename_column_carries_designations() {
        let mut page = page_with(&[("score", ColumnType::Float)], &[]);
        page.set_score_column(Some("score")).unwrap();
        page.set_plot_columns(&["score"]).unwrap();
        page.rename_column("score", "points").unwrap();

        assert!(page.column("points").is_some());
        assert_eq!(page.display().score_column.as_deref(), Some("points"));
        assert_eq!(page.plot_columns(), ["points".to_string()]);
    }

    #[test]
    fn test_rename_column_guards() {
        let mut page = page_with(&[("a", ColumnType::Float), ("b", ColumnType::Float)], &[]);
        assert!(matches!(
            page.rename_column("Model", "Name"),
            Err(EngineError::ColumnInUse { reason: InUseReason::RowKey, .. })
        ));
        assert!(matches!(page.rename_column("a", "b"), Err(EngineError::DuplicateColumn { .. })));
        assert!(matches!(page.rename_column("zz", "c"), Err(EngineError::ColumnNotFound { .. })));
    }

    #[test]
    fn test_change_column_type_best_effort() {
        let mut page = page_with(&[("v", ColumnType::String)], &["a", "b"]);
        page.set_cell("a", "v", "3.7").unwrap();
        page.set_cell("b", "v", "n/a").unwrap();

        assert!(page.change_column_type("v", ColumnType::Integer).unwrap());
        assert_eq!(page.cell("a", "v"), Some(&CellValue::Integer(3)));
        assert_eq!(page.cell("b", "v"), Some(&CellValue::Integer(0)));
        assert!(!page.change_column_type("v", ColumnType::Integer).unwrap());
    }

    #[test]
    fn test_remove_column_guards() {
        let mut page = page_with(
            &[("s", ColumnType::Float), ("t", ColumnType::Float), ("p", ColumnType::Float)],
            &["a"],
        );
        page.set_score_column(Some("s")).unwrap();
        page.set_formula(2, Some(Formula::new("{s}")));
        page.set_plot_columns(&["p"]).unwrap();

        assert!(matches!(
            page.remove_column("Model"),
            Err(EngineError::ColumnInUse { reason: InUseReason::RowKey, .. })
        ));
        assert!(matches!(
            page.remove_column("s"),
            Err(EngineError::ColumnInUse { reason: InUseReason::Designated, .. })
        ));
        assert!(matches!(
            page.remove_column("t"),
            Err(EngineError::ColumnInUse { reason: InUseReason::Computed, .. })
        ));

        page.remove_column("p").unwrap();
        assert!(page.plot_columns().is_empty());
        assert_eq!(page.row("a").unwrap().values().len(), 3);
    }

    #[test]
    fn test_score_and_penalty_must_differ() {
        let mut page = page_with(&[("s", ColumnType::Float), ("note", ColumnType::String)], &[]);
        page.set_score_column(Some("s")).unwrap();
        assert!(matches!(
            page.set_penalty_column(Some("s")),
            Err(EngineError::ColumnInUse { reason: InUseReason::Designated, .. })
        ));
        assert!(matches!(
            page.set_penalty_column(Some("note")),
            Err(EngineError::NonNumericColumn { .. })
        ));
        page.set_score_column(None).unwrap();
        page.set_penalty_column(Some("s")).unwrap();
    }

    #[test]
    fn test_from_parts_converts_and_indexes() {
        let columns = vec![
            ColumnDef::new("Model", ColumnType::String),
            ColumnDef::new("score", ColumnType::Integer),
            ColumnDef::new("total", ColumnType::Float).with_formula(Formula::new("{score} * 2")),
        ];
        let rows = vec![
            vec![CellValue::Text("a".into()), CellValue::Float(3.9), CellValue::Float(7.8)],
            vec![CellValue::Text("b".into())],
        ];
        let display = DisplayMeta {
            score_column: Some("total".into()),
            ..Default::default()
        };
        let page = Page::from_parts("Main", columns, rows, display, vec!["score".into()]).unwrap();

        assert_eq!(page.cell("a", "score"), Some(&CellValue::Integer(3)));
        assert_eq!(page.cell("b", "total"), Some(&CellValue::Float(0.0)));
        assert_eq!(page.row_index("b"), Some(1));
        assert_eq!(page.display().score_column.as_deref(), Some("total"));
        assert!(page.column("total").unwrap().is_computed());
    }

    #[test]
    fn test_from_parts_rejects_duplicate_keys() {
        let columns = vec![ColumnDef::new("Model", ColumnType::String)];
        let rows = vec![vec![CellValue::Text("a".into())], vec![CellValue::Text("a".into())]];
        let result = Page::from_parts("Main", columns, rows, DisplayMeta::default(), vec![]);
        assert!(matches!(result, Err(EngineError::DuplicateKey { .. })));
    }

    #[test]
    fn test_tier_text_validation() {
        let mut page = page_with(&[], &[]);
        let bad = vec![ScoreTier::new(10.0, "a;b", "#fff")];
        assert!(matches!(page.set_score_tiers(bad), Err(EngineError::InvalidName(_))));
    }
}
