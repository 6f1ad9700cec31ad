// RankGrid CLI - headless leaderboard operations on a store file

mod exit_codes;
mod render;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use rankgrid_config::Settings;
use rankgrid_engine::{ColumnType, EngineError, Session};
use rankgrid_io::StoreError;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use exit_codes::{store_exit_code, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "rgrid")]
#[command(about = "Leaderboard pages with column formulas (CLI mode, headless)")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Store file to operate on (default: file.storePath from settings)
    #[arg(long, short = 's', global = true, env = "RGRID_STORE")]
    store: Option<PathBuf>,

    /// Settings file (default: the user config directory)
    #[arg(long, global = true, env = "RGRID_CONFIG")]
    config: Option<PathBuf>,

    /// More logging on stderr (-v info, -vv debug)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new store with one empty page
    Init {
        /// Overwrite an existing store
        #[arg(long)]
        force: bool,
    },

    /// Print pages as tables (all pages unless --page is given)
    Show {
        #[arg(long, short = 'p')]
        page: Option<String>,

        /// Print rows as JSON objects
        #[arg(long)]
        json: bool,
    },

    /// Add an empty page
    AddPage { name: String },

    /// Rename a page and rewrite formulas that reference it
    RenamePage { old: String, new: String },

    /// Delete a page no other page references
    DeletePage { name: String },

    /// Add rows with the given keys
    AddRow {
        #[arg(required = true)]
        keys: Vec<String>,

        #[arg(long, short = 'p')]
        page: Option<String>,
    },

    /// Remove rows by key
    RemoveRows {
        #[arg(required = true)]
        keys: Vec<String>,

        #[arg(long, short = 'p')]
        page: Option<String>,
    },

    /// Add a column (string, integer, float, boolean)
    AddColumn {
        name: String,

        #[arg(long = "type", short = 't', default_value = "float")]
        ty: ColumnType,

        #[arg(long, short = 'p')]
        page: Option<String>,
    },

    /// Rename a column and rewrite formulas that reference it
    RenameColumn {
        old: String,
        new: String,

        #[arg(long, short = 'p')]
        page: Option<String>,
    },

    /// Change a column's type, converting values best effort
    SetType {
        column: String,
        ty: ColumnType,

        #[arg(long, short = 'p')]
        page: Option<String>,
    },

    /// Delete a column nothing depends on
    DeleteColumn {
        column: String,

        #[arg(long, short = 'p')]
        page: Option<String>,
    },

    /// Set one cell from raw text
    Set {
        key: String,
        column: String,
        value: String,

        #[arg(long, short = 'p')]
        page: Option<String>,
    },

    /// Assign a formula to a column; an empty formula clears it
    #[command(after_help = "\
Examples:
  rgrid formula total '{score} - {penalty}'
  rgrid formula total '{score} + {Bonus:points} * 0.5' -p Main
  rgrid formula total ''")]
    Formula {
        column: String,
        formula: String,

        #[arg(long, short = 'p')]
        page: Option<String>,
    },

    /// Show what a column's formula reads and which formulas read it
    Deps {
        column: String,

        #[arg(long, short = 'p')]
        page: Option<String>,

        /// Include indirect dependents
        #[arg(long)]
        transitive: bool,
    },

    /// Rank rows by a numeric column
    Rank {
        column: String,

        #[arg(long, short = 'p')]
        page: Option<String>,

        /// Lowest value first
        #[arg(long)]
        ascending: bool,

        /// Show at most N rows
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Choose the score and penalty columns (empty value clears)
    Designate {
        #[arg(long)]
        score: Option<String>,

        #[arg(long)]
        penalty: Option<String>,

        #[arg(long, short = 'p')]
        page: Option<String>,
    },

    /// Choose the columns to plot
    Plot {
        columns: Vec<String>,

        #[arg(long, short = 'p')]
        page: Option<String>,
    },

    /// Import a CSV/TSV file as a page (replaces a page of the same name)
    Import {
        file: PathBuf,

        /// Page name (default: file stem)
        #[arg(long, short = 'p')]
        page: Option<String>,

        /// Tab-separated input
        #[arg(long)]
        tsv: bool,
    },

    /// Export one page
    Export {
        file: PathBuf,

        #[arg(long, short = 'p')]
        page: Option<String>,

        /// Output format (default: from file extension)
        #[arg(long, short = 'f')]
        format: Option<ExportFormat>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Csv,
    Tsv,
    Json,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        "\nengine:  rankgrid-engine ",
        env!("CARGO_PKG_VERSION"),
        "\nstore:   format 1",
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    init_logging(level_for(cli.verbose, settings.log_level_filter()));

    match run(cli, &settings) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// Diagnostics go to stderr. `level` is the default; `RUST_LOG` directives
/// refine it.
fn init_logging(level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .try_init();
    if let Err(e) = installed {
        eprintln!("warning: logging unavailable: {}", e);
    }
}

/// Level for `-v` repeated `verbose` times, or `fallback` when not given.
fn level_for(verbose: u8, fallback: LevelFilter) -> LevelFilter {
    match verbose {
        0 => fallback,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn run(cli: Cli, settings: &Settings) -> Result<(), CliError> {
    let store = cli
        .store
        .or_else(|| settings.store_path.clone())
        .ok_or_else(|| {
            CliError::args("no store file given").with_hint("pass --store FILE or set file.storePath in settings")
        })?;

    if let Commands::Init { force } = cli.command {
        return cmd_init(&store, force, settings);
    }

    let mut session = rankgrid_io::store::load(&store, settings.session_options())?;
    if session.last_recalc().had_cycles {
        tracing::warn!("{}: {}", store.display(), session.last_recalc().summary());
    }

    if execute(&mut session, cli.command)? == Outcome::Modified {
        rankgrid_io::store::save(&session, &store)?;
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Modified,
    Unchanged,
}

fn execute(session: &mut Session, command: Commands) -> Result<Outcome, CliError> {
    use Outcome::{Modified, Unchanged};

    match command {
        Commands::Init { .. } => Err(CliError::args("init does not operate on a loaded store")),
        Commands::Show { page, json } => {
            cmd_show(session, page.as_deref(), json)?;
            Ok(Unchanged)
        }
        Commands::AddPage { name } => {
            session.add_page(&name)?;
            println!("added page '{}'", name);
            Ok(Modified)
        }
        Commands::RenamePage { old, new } => {
            session.rename_page(&old, &new)?;
            println!("renamed page '{}' to '{}'", old, new);
            Ok(Modified)
        }
        Commands::DeletePage { name } => {
            session.delete_page(&name)?;
            println!("deleted page '{}'", name);
            Ok(Modified)
        }
        Commands::AddRow { keys, page } => {
            let page = page_or_first(session, page);
            for key in &keys {
                session.add_row(&page, key)?;
            }
            println!("added {} row(s) to '{}'", keys.len(), page);
            Ok(Modified)
        }
        Commands::RemoveRows { keys, page } => {
            let page = page_or_first(session, page);
            let removed = session.remove_rows(&page, &keys)?;
            println!("removed {} row(s) from '{}'", removed, page);
            Ok(if removed > 0 { Modified } else { Unchanged })
        }
        Commands::AddColumn { name, ty, page } => {
            let page = page_or_first(session, page);
            session.add_column(&page, &name, ty)?;
            println!("added {} column '{}' to '{}'", ty, name, page);
            Ok(Modified)
        }
        Commands::RenameColumn { old, new, page } => {
            let page = page_or_first(session, page);
            session.rename_column(&page, &old, &new)?;
            println!("renamed column '{}' to '{}'", old, new);
            Ok(Modified)
        }
        Commands::SetType { column, ty, page } => {
            let page = page_or_first(session, page);
            session.change_column_type(&page, &column, ty)?;
            println!("column '{}' is {}", column, ty);
            Ok(Modified)
        }
        Commands::DeleteColumn { column, page } => {
            let page = page_or_first(session, page);
            session.delete_column(&page, &column)?;
            println!("deleted column '{}'", column);
            Ok(Modified)
        }
        Commands::Set { key, column, value, page } => {
            let page = page_or_first(session, page);
            session.update_cell(&page, &key, &column, &value)?;
            let stored = session.cell_value(&page, &key, &column)?;
            println!("{}[{}] = {}", column, key, stored);
            Ok(Modified)
        }
        Commands::Formula { column, formula, page } => {
            let page = page_or_first(session, page);
            session.set_formula(&page, &column, &formula)?;
            if formula.trim().is_empty() {
                println!("cleared formula of '{}'", column);
            } else {
                println!("{} = {}", column, formula.trim());
                tracing::info!("{}", session.last_recalc().log_line());
            }
            Ok(Modified)
        }
        Commands::Deps { column, page, transitive } => {
            let page = page_or_first(session, page);
            let precedents = session.precedents(&page, &column)?;
            let dependents = if transitive {
                session.transitive_dependents(&page, &column)?
            } else {
                session.dependents(&page, &column)?
            };
            print!("{}", render::column_list("reads", &precedents));
            print!("{}", render::column_list("read by", &dependents));
            Ok(Unchanged)
        }
        Commands::Rank { column, page, ascending, limit } => {
            let page = page_or_first(session, page);
            let mut ranked = session.ranked_keys(&page, &column, !ascending)?;
            if let Some(limit) = limit {
                ranked.truncate(limit);
            }
            print!("{}", render::ranking(session, &page, &ranked));
            Ok(Unchanged)
        }
        Commands::Designate { score, penalty, page } => {
            if score.is_none() && penalty.is_none() {
                return Err(CliError::args("nothing to designate").with_hint("pass --score and/or --penalty"));
            }
            let page = page_or_first(session, page);
            if let Some(score) = &score {
                session.set_score_column(&page, non_empty(score))?;
            }
            if let Some(penalty) = &penalty {
                session.set_penalty_column(&page, non_empty(penalty))?;
            }
            Ok(Modified)
        }
        Commands::Plot { columns, page } => {
            let page = page_or_first(session, page);
            session.set_plot_columns(&page, &columns)?;
            Ok(Modified)
        }
        Commands::Import { file, page, tsv } => {
            let name = match page {
                Some(name) => name,
                None => file_stem(&file)?,
            };
            let row_key = session.options().row_key.clone();
            let imported = if tsv {
                rankgrid_io::csv::import_tsv(&file, &name, &row_key)?
            } else {
                rankgrid_io::csv::import(&file, &name, &row_key)?
            };
            let rows = imported.row_count();
            session.import_page(imported)?;
            println!("imported {} row(s) into page '{}'", rows, name);
            Ok(Modified)
        }
        Commands::Export { file, page, format } => {
            let page_name = page_or_first(session, page);
            let page = session
                .page(&page_name)
                .ok_or_else(|| EngineError::PageNotFound(page_name.clone()))?;
            let format = match format {
                Some(format) => format,
                None => infer_format(&file)?,
            };
            match format {
                ExportFormat::Csv => rankgrid_io::csv::export(page, &file)?,
                ExportFormat::Tsv => rankgrid_io::csv::export_tsv(page, &file)?,
                ExportFormat::Json => rankgrid_io::json::export(page, &file)?,
            }
            println!("exported '{}' to {}", page_name, file.display());
            Ok(Unchanged)
        }
    }
}

// ============================================================================
// init / show
// ============================================================================

fn cmd_init(store: &Path, force: bool, settings: &Settings) -> Result<(), CliError> {
    if store.exists() && !force {
        return Err(CliError::args(format!("{} already exists", store.display())).with_hint("use --force to overwrite"));
    }
    let session = Session::new(settings.session_options())?;
    rankgrid_io::store::save(&session, store)?;
    println!("created {} with page '{}'", store.display(), settings.default_page_name);
    Ok(())
}

fn cmd_show(session: &Session, page: Option<&str>, json: bool) -> Result<(), CliError> {
    let pages: Vec<&rankgrid_engine::Page> = match page {
        Some(name) => vec![session
            .page(name)
            .ok_or_else(|| EngineError::PageNotFound(name.to_string()))?],
        None => session.pages().iter().collect(),
    };

    if json {
        let value: serde_json::Map<String, serde_json::Value> = pages
            .iter()
            .map(|p| (p.name().to_string(), rankgrid_io::json::page_to_value(p)))
            .collect();
        let text = serde_json::to_string_pretty(&value).map_err(|e| CliError::io(e.to_string()))?;
        println!("{}", text);
    } else {
        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                println!();
            }
            print!("{}", render::page_table(page));
        }
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn page_or_first(session: &Session, page: Option<String>) -> String {
    page.unwrap_or_else(|| {
        session
            .page_names()
            .first()
            .map(|s| s.to_string())
            .unwrap_or_default()
    })
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

fn file_stem(path: &Path) -> Result<String, CliError> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| CliError::args(format!("cannot derive a page name from {}", path.display())))
}

fn infer_format(path: &Path) -> Result<ExportFormat, CliError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some("csv") => Ok(ExportFormat::Csv),
        Some("tsv") | Some("tab") => Ok(ExportFormat::Tsv),
        Some("json") => Ok(ExportFormat::Json),
        _ => Err(CliError::args(format!(
            "cannot infer export format from {}",
            path.display()
        ))
        .with_hint("pass --format csv|tsv|json")),
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: exit_codes::EXIT_IO, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        let hint = match &err {
            EngineError::ColumnInUse { reason: rankgrid_engine::InUseReason::Computed, .. } => {
                Some("clear the formula first: rgrid formula <column> ''".to_string())
            }
            EngineError::PageInUse { .. } => Some("remove the cross-page references first".to_string()),
            _ => None,
        };
        Self { code: EXIT_ERROR, message: err.to_string(), hint }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Engine(e) => e.into(),
            other => Self { code: store_exit_code(&other), message: other.to_string(), hint: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(0, LevelFilter::WARN), LevelFilter::WARN);
        assert_eq!(level_for(1, LevelFilter::WARN), LevelFilter::INFO);
        assert_eq!(level_for(2, LevelFilter::OFF), LevelFilter::DEBUG);
        assert_eq!(level_for(9, LevelFilter::OFF), LevelFilter::TRACE);
    }

    #[test]
    fn test_infer_format() {
        assert_eq!(infer_format(Path::new("a.CSV")).unwrap(), ExportFormat::Csv);
        assert_eq!(infer_format(Path::new("a.tsv")).unwrap(), ExportFormat::Tsv);
        assert_eq!(infer_format(Path::new("a.json")).unwrap(), ExportFormat::Json);
        assert_eq!(infer_format(Path::new("a.txt")).unwrap_err().code, EXIT_USAGE);
    }

    #[test]
    fn test_engine_errors_exit_one() {
        let err: CliError = EngineError::LastPage.into();
        assert_eq!(err.code, EXIT_ERROR);
        let err: CliError = StoreError::Engine(EngineError::LastPage).into();
        assert_eq!(err.code, EXIT_ERROR);
    }

    #[test]
    fn test_execute_on_session() {
        let mut session = Session::new(Default::default()).unwrap();
        let add = Commands::AddColumn { name: "score".into(), ty: ColumnType::Integer, page: None };
        assert_eq!(execute(&mut session, add).unwrap(), Outcome::Modified);
        let show = Commands::Show { page: None, json: false };
        assert_eq!(execute(&mut session, show).unwrap(), Outcome::Unchanged);
        let bad = Commands::Formula { column: "score".into(), formula: "{score}".into(), page: None };
        assert_eq!(execute(&mut session, bad).unwrap_err().code, EXIT_ERROR);
    }
}
