//! Pure transformations used by the fetch driver.
//!
//! Nothing in this module performs I/O or touches shared state.

pub mod fraction;
pub mod naming;
pub mod state;

pub use fraction::{byte_fraction, unit_fraction};
pub use naming::relocated_file_name;
pub use state::FetchPhase;
