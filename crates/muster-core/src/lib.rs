//! `muster-core` — domain types, configuration and the render boundary
//! shared by every Muster crate.

pub mod config;
pub mod error;
pub mod render;
pub mod types;

pub use config::MusterConfig;
pub use error::{MusterError, Result};
pub use render::{RenderRequest, RenderedView, Renderer};
pub use types::*;
