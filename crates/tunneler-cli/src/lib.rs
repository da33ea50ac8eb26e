//! Tunneler CLI library.
//!
//! This crate provides the command-line interface and interactive REPL
//! for Tunneler.

pub mod cli;
pub mod commands;
pub mod output;
pub mod repl;
