//! # viobench core
//!
//! Numerical core of the VIO benchmark harness. This crate does no I/O; it
//! only knows about timestamped positions:
//! - Trajectory model and overlap windows
//! - Time-grid resampling (linear interpolation onto ground-truth stamps)
//! - Procrustes / Wahba alignment, 3D similarity or 2D planar
//! - Nearest-neighbour timestamp association and Umeyama alignment
//! - RMSE / MAE error statistics

pub mod align;
pub mod associate;
pub mod error;
pub mod resample;
pub mod stats;
pub mod trajectory;

// Re-export core types
pub use align::{align_to_ground_truth, estimate_alignment, AlignConfig, AlignmentTransform};
pub use associate::{associate, umeyama, RigidTransform};
pub use error::{CoreError, Result};
pub use resample::{interpolate, overlap_window, resample_to_ground_truth, PairedPositions};
pub use stats::{mae, rmse, ErrorKind, ErrorStats, SummaryStats};
pub use trajectory::{OverlapWindow, Trajectory, TrajectorySample};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
