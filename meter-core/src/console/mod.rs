//! Diagnostic console shared between firmware and emulator targets.
//!
//! The grammar lives in [`grammar`]; [`commands`] applies parsed commands to
//! a running node.

pub mod commands;
pub mod grammar;
