//! CLI commands

pub mod artifact;
pub mod git;
pub mod group;
pub mod repo;
