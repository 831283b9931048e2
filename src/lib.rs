//! Drive audit library - shared modules for the drive-audit binary.

pub mod auth;
pub mod drive;
pub mod index;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod reader;
pub mod reconcile;
