//! FigComposer: assemble multi-panel scientific figures.
//!
//! Panels are imported from raster files ([`io`]), edited non-destructively
//! ([`bake`]), arranged by the layout engine ([`layout`], [`smart`]), painted
//! by the renderer ([`render`]) and exported at print resolution ([`export`]).
//! Every committed change is recorded by the snapshot history
//! ([`components::history`]).

#![allow(clippy::too_many_arguments)]

pub mod app_state;
pub mod bake;
pub mod cli;
pub mod components;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod io;
pub mod layout;
pub mod logger;
pub mod ops;
pub mod panel;
pub mod project;
pub mod raster;
pub mod render;
pub mod smart;

#[cfg(test)]
mod test_support;

pub use app_state::AppState;
pub use components::{HistoryManager, ProjectSnapshot, RestoreStatus};
pub use error::{ConfigError, DecodeError, ExportError, ImportError, ProjectError};
pub use project::{Figure, FigureSettings, LayoutChoice, LayoutKind, Project};
