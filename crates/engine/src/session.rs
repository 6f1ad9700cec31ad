//! The session: every page, the dependency graph across them, and history.
//!
//! All mutations go through `Session`. Each one validates first, then
//! mutates, rebuilds the dependency graph, recomputes every formula column
//! in dependency order and pushes a snapshot. A failed call leaves the
//! session untouched.

use std::time::Instant;

use ordered_float::OrderedFloat;
use rustc_hash::FxHashSet;

use crate::column_id::ColumnId;
use crate::dep_graph::DepGraph;
use crate::error::{EngineError, InUseReason, Result};
use crate::formula::refs::{rename_column_refs, rename_page_refs};
use crate::formula::{evaluate_or_zero, Formula, RefToken, ValueLookup};
use crate::history::{History, Snapshot, UndoOutcome};
use crate::page::{validate_name, Page};
use crate::recalc::{CycleReport, RecalcReport};
use crate::tiers::{penalty_tier, score_tier, PenaltyTier, ScoreTier};
use crate::value::{CellValue, ColumnType};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Name of the row-key column on new pages.
    pub row_key: String,
    /// Name of the page a fresh session starts with.
    pub default_page: String,
    /// Maximum number of history entries, including the base state.
    pub history_limit: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            row_key: "Model".to_string(),
            default_page: "Default".to_string(),
            history_limit: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pages: Vec<Page>,
    graph: DepGraph,
    history: History,
    options: SessionOptions,
    last_recalc: RecalcReport,
}

impl Session {
    /// A session with one empty page.
    pub fn new(options: SessionOptions) -> Result<Self> {
        let page = Page::new(options.default_page.clone(), options.row_key.clone())?;
        Self::from_pages(vec![page], options)
    }

    /// Assemble a session from fully built pages, as a loader does.
    ///
    /// The graph is built and one recompute runs only once every page is in
    /// place, so cross-page references resolve. A cycle in the loaded
    /// formulas does not fail the load: the affected columns are zeroed and
    /// the condition is reported through `last_recalc()`.
    pub fn from_pages(mut pages: Vec<Page>, options: SessionOptions) -> Result<Self> {
        if pages.is_empty() {
            pages.push(Page::new(options.default_page.clone(), options.row_key.clone())?);
        }
        for (i, page) in pages.iter().enumerate() {
            if pages[..i].iter().any(|p| p.name() == page.name()) {
                return Err(EngineError::DuplicatePage(page.name().to_string()));
            }
        }

        let initial = Snapshot { pages: Vec::new() };
        let mut session = Self {
            pages,
            graph: DepGraph::new(),
            history: History::new(initial, options.history_limit),
            options,
            last_recalc: RecalcReport::new(),
        };
        session.rebuild_graph();
        let report = session.recompute_all();
        if report.had_cycles {
            tracing::warn!("loaded session contains a formula cycle: {}", report.summary());
        }
        session.history = History::new(session.snapshot(), session.options.history_limit);
        Ok(session)
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, name: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.name() == name)
    }

    pub fn page_names(&self) -> Vec<&str> {
        self.pages.iter().map(Page::name).collect()
    }

    pub fn column_type(&self, page: &str, column: &str) -> Result<ColumnType> {
        let (p, c) = self.require_column(page, column)?;
        Ok(self.pages[p].columns()[c].ty())
    }

    pub fn numeric_columns(&self, page: &str) -> Result<Vec<String>> {
        let p = self.require_page(page)?;
        Ok(self.pages[p].numeric_columns().into_iter().map(String::from).collect())
    }

    pub fn cell_value(&self, page: &str, key: &str, column: &str) -> Result<&CellValue> {
        let (p, c) = self.require_column(page, column)?;
        let page = &self.pages[p];
        let row = page.row(key).ok_or_else(|| EngineError::RowNotFound {
            page: page.name().to_string(),
            key: key.to_string(),
        })?;
        row.get(c).ok_or_else(|| EngineError::ColumnNotFound {
            page: page.name().to_string(),
            column: column.to_string(),
        })
    }

    /// Formula columns that reference `page:column` directly.
    pub fn dependents(&self, page: &str, column: &str) -> Result<Vec<ColumnId>> {
        self.require_column(page, column)?;
        Ok(self.graph.dependents(&ColumnId::new(page, column)))
    }

    /// Every formula column whose value depends on `page:column`.
    pub fn transitive_dependents(&self, page: &str, column: &str) -> Result<Vec<ColumnId>> {
        self.require_column(page, column)?;
        Ok(self.graph.transitive_dependents(&ColumnId::new(page, column)))
    }

    /// Columns referenced by the formula of `page:column`.
    pub fn precedents(&self, page: &str, column: &str) -> Result<Vec<ColumnId>> {
        self.require_column(page, column)?;
        Ok(self.graph.precedents(&ColumnId::new(page, column)))
    }

    /// Formula references that point at a page or column that no longer
    /// exists, as `(formula column, missing target)` pairs. Such references
    /// read as 0.
    pub fn dangling_references(&self) -> Vec<(ColumnId, ColumnId)> {
        let mut out = Vec::new();
        for node in self.graph.formula_nodes() {
            for target in self.graph.precedents(&node) {
                if self.locate(&target).is_none() {
                    out.push((node.clone(), target));
                }
            }
        }
        out
    }

    /// Row keys ordered by a numeric column. Ties keep row order.
    pub fn ranked_keys(&self, page: &str, column: &str, descending: bool) -> Result<Vec<(String, f64)>> {
        let (p, c) = self.require_column(page, column)?;
        let page = &self.pages[p];
        if !page.columns()[c].ty().is_numeric() {
            return Err(EngineError::NonNumericColumn {
                page: page.name().to_string(),
                column: column.to_string(),
            });
        }

        let mut ranked: Vec<(&str, OrderedFloat<f64>)> = page
            .rows()
            .iter()
            .map(|row| (row.key(), OrderedFloat(row.values()[c].as_number())))
            .collect();
        if descending {
            ranked.sort_by(|a, b| b.1.cmp(&a.1));
        } else {
            ranked.sort_by(|a, b| a.1.cmp(&b.1));
        }
        Ok(ranked
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.into_inner()))
            .collect())
    }

    /// Tier of a row's value in the page's score column, if one is designated.
    pub fn score_tier(&self, page: &str, key: &str) -> Result<Option<&ScoreTier>> {
        let p = self.require_page(page)?;
        let page = &self.pages[p];
        let Some(column) = page.display().score_column.as_deref() else {
            return Ok(None);
        };
        let value = self.cell_value(page.name(), key, column)?.as_number();
        Ok(score_tier(&page.display().score_tiers, value))
    }

    /// Tier of a row's value in the page's penalty column, if one is designated.
    pub fn penalty_tier(&self, page: &str, key: &str) -> Result<Option<&PenaltyTier>> {
        let p = self.require_page(page)?;
        let page = &self.pages[p];
        let Some(column) = page.display().penalty_column.as_deref() else {
            return Ok(None);
        };
        let value = self.cell_value(page.name(), key, column)?.as_number();
        Ok(penalty_tier(&page.display().penalty_tiers, value))
    }

    pub fn dep_graph(&self) -> &DepGraph {
        &self.graph
    }

    pub fn has_cycle(&self) -> bool {
        self.graph.has_cycle()
    }

    /// Report of the most recent recompute.
    pub fn last_recalc(&self) -> &RecalcReport {
        &self.last_recalc
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Number of history entries, including the base state.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    // ========================================================================
    // Rows and cells
    // ========================================================================

    pub fn add_row(&mut self, page: &str, key: &str) -> Result<()> {
        let p = self.require_page(page)?;
        self.pages[p].add_row(key)?;
        tracing::info!("{}: added row '{}'", page, key);
        self.commit(true);
        Ok(())
    }

    pub fn remove_rows<S: AsRef<str>>(&mut self, page: &str, keys: &[S]) -> Result<usize> {
        let p = self.require_page(page)?;
        let removed = self.pages[p].remove_rows(keys)?;
        if removed > 0 {
            tracing::info!("{}: removed {} row(s)", page, removed);
            self.commit(true);
        }
        Ok(removed)
    }

    /// Store raw input in a cell, coerced to the column's type. Setting a
    /// cell to the value it already holds changes nothing and records no
    /// history.
    pub fn update_cell(&mut self, page: &str, key: &str, column: &str, raw: &str) -> Result<()> {
        let p = self.require_page(page)?;
        if !self.pages[p].set_cell(key, column, raw)? {
            return Ok(());
        }
        tracing::debug!("{}: set {}[{}]", page, column, key);
        self.commit(true);
        Ok(())
    }

    // ========================================================================
    // Columns
    // ========================================================================

    pub fn add_column(&mut self, page: &str, name: &str, ty: ColumnType) -> Result<()> {
        let p = self.require_page(page)?;
        self.pages[p].add_column(name, ty)?;
        tracing::info!("{}: added {} column '{}'", page, ty, name);
        self.commit(false);
        Ok(())
    }

    /// Rename a column and rewrite every formula in the session that refers
    /// to it.
    ///
    /// Refused with `CycleDetected` if the new name completes a reference
    /// that closes a cycle (possible when a formula named a missing column).
    pub fn rename_column(&mut self, page: &str, old: &str, new: &str) -> Result<()> {
        let p = self.require_page(page)?;
        let before = self.pages.clone();
        self.pages[p].rename_column(old, new)?;
        let rewritten =
            self.rewrite_formulas(|formula_page, src| rename_column_refs(src, formula_page, page, old, new));
        tracing::info!(
            "{}: renamed column '{}' to '{}' ({} formula(s) rewritten)",
            page,
            old,
            new,
            rewritten
        );
        self.commit_acyclic(before)
    }

    /// Convert a column to another type, best effort per cell. Changing to
    /// the current type is a no-op.
    pub fn change_column_type(&mut self, page: &str, column: &str, ty: ColumnType) -> Result<()> {
        let p = self.require_page(page)?;
        if !self.pages[p].change_column_type(column, ty)? {
            return Ok(());
        }

        if !ty.is_numeric() {
            if self.pages[p].clear_designations(column) {
                tracing::warn!("{}: '{}' is no longer numeric; removed from score/penalty/plot", page, column);
            }
            let readers = self.graph.dependents(&ColumnId::new(page, column));
            if !readers.is_empty() {
                let names: Vec<String> = readers.iter().map(|c| c.to_string()).collect();
                tracing::warn!(
                    "{}: '{}' is now text and reads as 0 in {}",
                    page,
                    column,
                    names.join(", ")
                );
            }
        }

        tracing::info!("{}: column '{}' is now {}", page, column, ty);
        self.commit(true);
        Ok(())
    }

    /// Delete a column. Refused for the row key, computed columns, the
    /// score/penalty columns and any column a formula refers to.
    pub fn delete_column(&mut self, page: &str, column: &str) -> Result<()> {
        let p = self.require_page(page)?;
        self.pages[p].check_removable(column)?;

        let readers = self.graph.dependents(&ColumnId::new(page, column));
        if !readers.is_empty() {
            return Err(EngineError::ColumnInUse {
                page: page.to_string(),
                column: column.to_string(),
                reason: InUseReason::Referenced(readers),
            });
        }

        self.pages[p].remove_column(column)?;
        tracing::info!("{}: deleted column '{}'", page, column);
        self.commit(true);
        Ok(())
    }

    // ========================================================================
    // Formulas
    // ========================================================================

    /// Assign a formula to a column.
    ///
    /// The formula is checked before anything changes: no reference to the
    /// column itself, every referenced page and column exists and is
    /// numeric, and the resulting graph has no cycle. On any failure the
    /// column keeps its previous formula. A blank formula clears it.
    pub fn set_formula(&mut self, page: &str, column: &str, text: &str) -> Result<()> {
        let (p, c) = self.require_column(page, column)?;
        if c == 0 {
            return Err(EngineError::ColumnInUse {
                page: page.to_string(),
                column: column.to_string(),
                reason: InUseReason::RowKey,
            });
        }
        if text.trim().is_empty() {
            return self.clear_formula(page, column);
        }

        let formula = Formula::new(text);
        if self.pages[p].columns()[c].formula() == Some(&formula) {
            return Ok(());
        }

        let target = ColumnId::new(page, column);
        self.validate_formula(&target, &formula)?;

        let preds: FxHashSet<ColumnId> = formula.refs().iter().map(|t| t.resolve(page)).collect();
        let mut candidate = self.graph.clone();
        candidate.insert_node(target.clone(), preds);
        if let Some(cycle) = candidate.find_cycle() {
            let report = CycleReport::cycle(cycle);
            tracing::info!("rejected formula for {}: {}", target, report);
            return Err(EngineError::CycleDetected {
                message: report.message,
            });
        }

        if let Some(error) = formula.parse_error() {
            tracing::warn!("formula for {} does not parse ({}); it evaluates to 0", target, error);
        }
        tracing::info!("formula set: {} = {}", target, formula.source());
        self.pages[p].set_formula(c, Some(formula));
        self.commit(true);
        Ok(())
    }

    /// Remove a column's formula. Its last computed values stay as plain data.
    pub fn clear_formula(&mut self, page: &str, column: &str) -> Result<()> {
        let (p, c) = self.require_column(page, column)?;
        if !self.pages[p].columns()[c].is_computed() {
            return Ok(());
        }
        self.pages[p].set_formula(c, None);
        tracing::info!("formula cleared: {}:{}", page, column);
        self.commit(true);
        Ok(())
    }

    fn validate_formula(&self, target: &ColumnId, formula: &Formula) -> Result<()> {
        let resolved: Vec<(&RefToken, ColumnId)> = formula
            .refs()
            .iter()
            .map(|t| (t, t.resolve(&target.page)))
            .collect();

        if resolved.iter().any(|(_, id)| id == target) {
            return Err(EngineError::SelfReference {
                page: target.page.clone(),
                column: target.column.clone(),
            });
        }

        for (token, id) in &resolved {
            let def = self
                .page(&id.page)
                .and_then(|p| p.column(&id.column))
                .ok_or_else(|| EngineError::ReferenceNotFound {
                    token: token.to_string(),
                })?;
            if !def.ty().is_numeric() {
                return Err(EngineError::NonNumericReference {
                    token: token.to_string(),
                });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Pages
    // ========================================================================

    pub fn add_page(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        if self.page(name).is_some() {
            return Err(EngineError::DuplicatePage(name.to_string()));
        }
        self.pages.push(Page::new(name, self.options.row_key.clone())?);
        tracing::info!("added page '{}'", name);
        self.commit(false);
        Ok(())
    }

    /// Rename a page and rewrite every `{old:column}` token in the session.
    /// Like `rename_column`, refused if the new name closes a cycle.
    pub fn rename_page(&mut self, old: &str, new: &str) -> Result<()> {
        let p = self.require_page(old)?;
        validate_name(new)?;
        if self.page(new).is_some() {
            return Err(EngineError::DuplicatePage(new.to_string()));
        }

        let before = self.pages.clone();
        self.pages[p].set_name(new.to_string());
        let rewritten = self.rewrite_formulas(|_, src| rename_page_refs(src, old, new));
        tracing::info!("renamed page '{}' to '{}' ({} formula(s) rewritten)", old, new, rewritten);
        self.commit_acyclic(before)
    }

    /// Delete a page. Refused for the last page and for pages that formulas
    /// on other pages refer to.
    pub fn delete_page(&mut self, name: &str) -> Result<()> {
        let p = self.require_page(name)?;
        if self.pages.len() == 1 {
            return Err(EngineError::LastPage);
        }

        let mut referenced_by: Vec<ColumnId> = self
            .graph
            .formula_nodes()
            .into_iter()
            .filter(|node| node.page != name)
            .filter(|node| self.graph.precedents(node).iter().any(|t| t.page == name))
            .collect();
        if !referenced_by.is_empty() {
            referenced_by.sort();
            return Err(EngineError::PageInUse {
                page: name.to_string(),
                referenced_by,
            });
        }

        self.pages.remove(p);
        tracing::info!("deleted page '{}'", name);
        self.commit(true);
        Ok(())
    }

    /// Add a page, or replace the page of the same name (keeping its
    /// position). References into a replaced page that no longer resolve
    /// read as 0.
    pub fn import_page(&mut self, page: Page) -> Result<()> {
        let name = page.name().to_string();
        match self.pages.iter().position(|p| p.name() == name) {
            Some(i) => self.pages[i] = page,
            None => self.pages.push(page),
        }
        tracing::info!("imported page '{}'", name);
        self.commit(true);

        for (node, target) in self.dangling_references() {
            if target.page == name {
                tracing::warn!("{} refers to {}, which the imported page lacks", node, target);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Display metadata
    // ========================================================================

    pub fn set_score_column(&mut self, page: &str, column: Option<&str>) -> Result<()> {
        let p = self.require_page(page)?;
        self.pages[p].set_score_column(column)?;
        self.commit(false);
        Ok(())
    }

    pub fn set_penalty_column(&mut self, page: &str, column: Option<&str>) -> Result<()> {
        let p = self.require_page(page)?;
        self.pages[p].set_penalty_column(column)?;
        self.commit(false);
        Ok(())
    }

    pub fn set_score_tiers(&mut self, page: &str, tiers: Vec<ScoreTier>) -> Result<()> {
        let p = self.require_page(page)?;
        self.pages[p].set_score_tiers(tiers)?;
        self.commit(false);
        Ok(())
    }

    pub fn set_penalty_tiers(&mut self, page: &str, tiers: Vec<PenaltyTier>) -> Result<()> {
        let p = self.require_page(page)?;
        self.pages[p].set_penalty_tiers(tiers)?;
        self.commit(false);
        Ok(())
    }

    pub fn set_plot_columns<S: AsRef<str>>(&mut self, page: &str, columns: &[S]) -> Result<()> {
        let p = self.require_page(page)?;
        self.pages[p].set_plot_columns(columns)?;
        self.commit(false);
        Ok(())
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Restore the state before the last committed mutation.
    pub fn undo(&mut self) -> UndoOutcome {
        let Some(snapshot) = self.history.undo() else {
            return UndoOutcome::NothingToUndo;
        };
        self.pages = snapshot.pages.clone();
        self.rebuild_graph();
        tracing::info!("undo ({} entries left)", self.history.len());
        UndoOutcome::Restored
    }

    /// Re-apply the most recently undone mutation.
    pub fn redo(&mut self) -> UndoOutcome {
        let Some(snapshot) = self.history.redo() else {
            return UndoOutcome::NothingToRedo;
        };
        self.pages = snapshot.pages.clone();
        self.rebuild_graph();
        tracing::info!("redo");
        UndoOutcome::Restored
    }

    // ========================================================================
    // Dependency graph and recompute
    // ========================================================================

    /// Rebuild the dependency graph from every page's formulas.
    pub fn rebuild_graph(&mut self) {
        self.graph = graph_for(&self.pages);
        tracing::debug!("dependency graph rebuilt: {} formula column(s)", self.graph.node_count());
    }

    /// Recompute every formula column in dependency order.
    ///
    /// Columns that cannot be ordered because of a cycle are set to 0 in
    /// every row and reported; this only happens with loaded state, since
    /// `set_formula` refuses cycles.
    pub fn recompute_all(&mut self) -> RecalcReport {
        let start = Instant::now();
        let mut report = RecalcReport::new();
        let topo = self.graph.topo_order();

        for node in &topo.order {
            let Some((p, c)) = self.locate(node) else {
                continue;
            };
            let values = self.evaluate_column(p, c);
            report.columns_recomputed += 1;
            report.cells_recomputed += values.len();
            self.pages[p].write_column(c, values);
        }

        if let Some(cycle) = topo.cycle {
            for node in &cycle.columns {
                if let Some((p, c)) = self.locate(node) {
                    let zero = CellValue::from_number(0.0, self.pages[p].columns()[c].ty());
                    let zeros = vec![zero; self.pages[p].row_count()];
                    self.pages[p].write_column(c, zeros);
                    report.columns_zeroed += 1;
                }
            }
            tracing::warn!("{}; {} column(s) set to 0", cycle, report.columns_zeroed);
            report.had_cycles = true;
            report.cycle = Some(cycle);
        }

        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!("{}", report.log_line());
        self.last_recalc = report.clone();
        report
    }

    /// Recompute a single formula column from current values. Returns the
    /// number of cells written (0 for a column without a formula).
    ///
    /// Upstream formula columns are read as they are; use `recompute_all`
    /// after any change that can affect them.
    pub fn recompute_column(&mut self, page: &str, column: &str) -> Result<usize> {
        let (p, c) = self.require_column(page, column)?;
        if !self.pages[p].columns()[c].is_computed() {
            return Ok(0);
        }
        let values = self.evaluate_column(p, c);
        let written = values.len();
        self.pages[p].write_column(c, values);
        Ok(written)
    }

    fn evaluate_column(&self, page: usize, column: usize) -> Vec<CellValue> {
        let def = &self.pages[page].columns()[column];
        let Some(formula) = def.formula() else {
            return Vec::new();
        };
        (0..self.pages[page].row_count())
            .map(|row| {
                let lookup = SessionLookup::new(&self.pages, page, row);
                CellValue::from_number(evaluate_or_zero(formula, &lookup), def.ty())
            })
            .collect()
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn commit(&mut self, recompute: bool) {
        self.rebuild_graph();
        if recompute {
            self.recompute_all();
        }
        let snapshot = self.snapshot();
        self.history.push(snapshot);
    }

    /// Commit a change that rewrote formula references, unless the new
    /// graph has a cycle the current one lacked. In that case `before` is
    /// restored and nothing is committed.
    fn commit_acyclic(&mut self, before: Vec<Page>) -> Result<()> {
        if !self.graph.has_cycle() {
            if let Some(cycle) = graph_for(&self.pages).find_cycle() {
                self.pages = before;
                let report = CycleReport::cycle(cycle);
                tracing::info!("rejected rename: {}", report);
                return Err(EngineError::CycleDetected {
                    message: report.message,
                });
            }
        }
        self.commit(true);
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            pages: self.pages.clone(),
        }
    }

    /// Apply `rewrite(formula_page, source)` to every formula; `Some` replaces
    /// the formula text. Returns the number of formulas changed.
    fn rewrite_formulas<F>(&mut self, rewrite: F) -> usize
    where
        F: Fn(&str, &str) -> Option<String>,
    {
        let mut changed = 0;
        for page in &mut self.pages {
            let updates: Vec<(usize, String)> = page
                .columns()
                .iter()
                .enumerate()
                .filter_map(|(i, def)| {
                    let formula = def.formula()?;
                    rewrite(page.name(), formula.source()).map(|src| (i, src))
                })
                .collect();
            for (i, src) in updates {
                page.set_formula(i, Some(Formula::new(&src)));
                changed += 1;
            }
        }
        changed
    }

    fn locate(&self, id: &ColumnId) -> Option<(usize, usize)> {
        let p = self.pages.iter().position(|page| page.name() == id.page)?;
        let c = self.pages[p].column_index(&id.column)?;
        Some((p, c))
    }

    fn require_page(&self, name: &str) -> Result<usize> {
        self.pages
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| EngineError::PageNotFound(name.to_string()))
    }

    fn require_column(&self, page: &str, column: &str) -> Result<(usize, usize)> {
        let p = self.require_page(page)?;
        let c = self.pages[p]
            .column_index(column)
            .ok_or_else(|| EngineError::ColumnNotFound {
                page: page.to_string(),
                column: column.to_string(),
            })?;
        Ok((p, c))
    }
}

/// Dependency graph of every formula column across `pages`.
fn graph_for(pages: &[Page]) -> DepGraph {
    let formulas = pages.iter().flat_map(|page| {
        page.formula_columns().map(move |(column, formula)| {
            let preds: FxHashSet<ColumnId> = formula.refs().iter().map(|t| t.resolve(page.name())).collect();
            (ColumnId::new(page.name(), column), preds)
        })
    });
    DepGraph::build(formulas)
}

/// Resolves formula references for one row of one page.
///
/// Same-page references read the row itself. References to another page
/// read the row with the same key there. Missing pages, columns and rows
/// read as 0.
pub struct SessionLookup<'a> {
    pages: &'a [Page],
    page: usize,
    row: usize,
}

impl<'a> SessionLookup<'a> {
    pub fn new(pages: &'a [Page], page: usize, row: usize) -> Self {
        Self { pages, page, row }
    }
}

impl ValueLookup for SessionLookup<'_> {
    fn resolve(&self, token: &RefToken) -> f64 {
        let Some(current) = self.pages.get(self.page) else {
            return 0.0;
        };
        let Some(this_row) = current.rows().get(self.row) else {
            return 0.0;
        };

        let (page, row) = if token.is_same_page(current.name()) {
            (current, this_row)
        } else {
            let Some(other) = self.pages.iter().find(|p| Some(p.name()) == token.page.as_deref()) else {
                return 0.0;
            };
            let Some(row) = other.row(this_row.key()) else {
                return 0.0;
            };
            (other, row)
        };

        page.column_index(&token.column)
            .and_then(|c| row.get(c))
            .map_or(0.0, CellValue::as_number)
    }
}
