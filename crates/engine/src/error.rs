use std::fmt;

use crate::column_id::ColumnId;
use crate::value::ColumnType;

/// Why a column refused a structural change or a direct edit.
#[derive(Debug, Clone, PartialEq)]
pub enum InUseReason {
    /// The row-key column is fixed: no rename, delete, type change or formula.
    RowKey,
    /// The column is computed; clear its formula first.
    Computed,
    /// The column is the page's score or penalty display column.
    Designated,
    /// Formulas in these columns reference it.
    Referenced(Vec<ColumnId>),
}

impl fmt::Display for InUseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowKey => write!(f, "it is the row-key column"),
            Self::Computed => write!(f, "it is computed; clear its formula first"),
            Self::Designated => write!(f, "it is the score or penalty column"),
            Self::Referenced(by) => {
                let names: Vec<String> = by.iter().map(|c| c.to_string()).collect();
                write!(f, "it is referenced by {}", names.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Row key already used by another row in the page.
    DuplicateKey { page: String, key: String },
    /// Row key is empty or whitespace.
    EmptyKey { page: String },
    /// Column name already exists in the page.
    DuplicateColumn { page: String, column: String },
    /// Raw input cannot be read as the column's type.
    TypeCoercion { column: String, ty: ColumnType, input: String },
    /// Column cannot be changed in the requested way.
    ColumnInUse { page: String, column: String, reason: InUseReason },
    /// Formula references the column it is assigned to.
    SelfReference { page: String, column: String },
    /// Formula references a page or column that does not exist.
    ReferenceNotFound { token: String },
    /// Formula references a string column.
    NonNumericReference { token: String },
    /// Formula would close a dependency cycle; nothing was changed.
    CycleDetected { message: String },
    PageNotFound(String),
    ColumnNotFound { page: String, column: String },
    RowNotFound { page: String, key: String },
    DuplicatePage(String),
    /// Page or column name is blank or contains a reserved character.
    InvalidName(String),
    /// Page is referenced by formulas on other pages.
    PageInUse { page: String, referenced_by: Vec<ColumnId> },
    /// The only page of a session cannot be deleted.
    LastPage,
    /// Score/penalty/plot designation requires a numeric column.
    NonNumericColumn { page: String, column: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey { page, key } => {
                write!(f, "page '{page}': a row with key '{key}' already exists")
            }
            Self::EmptyKey { page } => write!(f, "page '{page}': row key cannot be empty"),
            Self::DuplicateColumn { page, column } => {
                write!(f, "page '{page}': column '{column}' already exists")
            }
            Self::TypeCoercion { column, ty, input } => {
                write!(f, "invalid input '{input}' for {ty} column '{column}'")
            }
            Self::ColumnInUse { page, column, reason } => {
                write!(f, "page '{page}': column '{column}' is in use: {reason}")
            }
            Self::SelfReference { page, column } => {
                write!(f, "page '{page}': formula of '{column}' cannot reference itself")
            }
            Self::ReferenceNotFound { token } => write!(f, "reference {token} not found"),
            Self::NonNumericReference { token } => write!(f, "reference {token} is not numeric"),
            Self::CycleDetected { message } => write!(f, "{message}"),
            Self::PageNotFound(name) => write!(f, "page '{name}' not found"),
            Self::ColumnNotFound { page, column } => {
                write!(f, "page '{page}': column '{column}' not found")
            }
            Self::RowNotFound { page, key } => write!(f, "page '{page}': row '{key}' not found"),
            Self::DuplicatePage(name) => write!(f, "page '{name}' already exists"),
            Self::InvalidName(name) => write!(f, "invalid name '{name}'"),
            Self::PageInUse { page, referenced_by } => {
                let names: Vec<String> = referenced_by.iter().map(|c| c.to_string()).collect();
                write!(f, "page '{page}' is referenced by {}", names.join(", "))
            }
            Self::LastPage => write!(f, "cannot delete the last page"),
            Self::NonNumericColumn { page, column } => {
                write!(f, "page '{page}': column '{column}' is not numeric")
            }
        }
    }
}

impl std::error::Error for EngineError {}

pub type Result<T> = std::result::Result<T, EngineError>;
