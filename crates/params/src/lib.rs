//! imgbench-params: named parameter sources
//!
//! Workers read their settings by name from a `ParameterSource`, which may
//! not be reachable yet when the worker starts.

pub mod error;
pub mod file;
pub mod memory;
pub mod overlay;
pub mod source;

pub use error::ParamError;
pub use file::FileParameterSource;
pub use memory::InMemoryParameterSource;
pub use overlay::OverlayParameterSource;
pub use source::{ParameterSource, Parameters};
