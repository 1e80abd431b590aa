//! Batch side of cadence.
//!
//! Imports feature vectors and playlists into the store, rebuilds the index
//! as a treadle `Stage`, and runs that rebuild on a fixed interval.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod import;
pub mod index;
pub mod pipeline;
pub mod scheduler;
pub mod work_item;

pub use config::Config;
pub use error::{ImportError, ImportResult};
pub use import::{import_file, import_reader, ImportRecord, ImportSummary, SkippedLine};
pub use index::{IndexStage, RebuildSummary};
pub use pipeline::build_index_pipeline;
pub use scheduler::RebuildScheduler;
pub use work_item::RebuildJob;
