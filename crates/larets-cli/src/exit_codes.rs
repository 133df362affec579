//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

#![allow(dead_code)]

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Invalid request - bad name, url, artifact key or repository type
pub const INVALID_REQUEST: i32 = 2;

/// Repository, artifact or format not found
pub const NOT_FOUND: i32 = 3;

/// Name or version already taken
pub const CONFLICT: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Remote origin failed or timed out
pub const REMOTE_ERROR: i32 = 6;

/// Operation not supported yet
pub const NOT_IMPLEMENTED: i32 = 7;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;

/// Configuration error (following sysexits.h convention)
pub const CONFIG_ERROR: i32 = 78;
