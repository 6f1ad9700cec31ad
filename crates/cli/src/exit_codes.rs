//! CLI Exit Code Registry
//!
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 1    | Engine refused the operation (duplicate key, cycle)  |
//! | 2    | CLI usage error (bad args, no store configured)      |
//! | 3    | Store or import file could not be read or written    |
//! | 4    | Store or import file is malformed                    |

use rankgrid_io::StoreError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// The engine rejected the operation; the store is unchanged.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// File could not be read or written.
pub const EXIT_IO: u8 = 3;

/// Store or CSV input does not parse.
pub const EXIT_PARSE: u8 = 4;

/// Map a store error to its exit code.
pub fn store_exit_code(err: &StoreError) -> u8 {
    match err {
        StoreError::Io(_) => EXIT_IO,
        StoreError::Parse { .. } => EXIT_PARSE,
        StoreError::Engine(_) => EXIT_ERROR,
    }
}
