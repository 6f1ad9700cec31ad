pub mod column_id;
pub mod dep_graph;
pub mod error;
pub mod formula;
pub mod history;
pub mod page;
pub mod recalc;
pub mod session;
pub mod tiers;
pub mod value;

pub use column_id::ColumnId;
pub use error::{EngineError, InUseReason, Result};
pub use formula::Formula;
pub use history::UndoOutcome;
pub use page::{ColumnDef, DisplayMeta, Page, Row};
pub use recalc::{CycleReport, RecalcReport};
pub use session::{Session, SessionOptions};
pub use tiers::{PenaltyTier, ScoreTier};
pub use value::{CellValue, ColumnType};
