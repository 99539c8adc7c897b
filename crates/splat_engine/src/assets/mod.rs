//! Point cloud assets
//!
//! Gaussian-splat scenes arrive as PLY files and are held in memory as a
//! [`SplatSet`] of flat attribute arrays until they are uploaded to the GPU.

pub mod ply_loader;
pub mod splat_set;

pub use ply_loader::{load_ply, parse_ply};
pub use splat_set::{ShLayout, SplatSet, MAX_SH_COEFFS_PER_CHANNEL};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// File could not be opened or read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The PLY header declares no `vertex` element
    #[error("PLY file has no vertex element")]
    MissingVertexElement,

    /// A property every splat needs is absent from the header
    #[error("PLY vertex element is missing required property '{0}'")]
    MissingProperty(String),

    /// Attribute arrays disagree about the number of points
    #[error("Attribute '{attribute}' has {actual} values, expected {expected}")]
    InconsistentAttribute {
        /// Name of the offending array
        attribute: &'static str,
        /// Expected number of floats
        expected: usize,
        /// Actual number of floats
        actual: usize,
    },
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;
