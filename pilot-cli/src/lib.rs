// Suppress clippy warnings that require extensive refactoring
#![allow(clippy::collapsible_if)]

pub mod engines;
pub mod launcher;
