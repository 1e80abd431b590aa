pub mod build;
pub mod config;
pub mod import;
pub mod recommend;
pub mod status;
pub mod watch;

pub use build::run_build;
pub use import::run_import;
pub use recommend::run_recommend;
pub use status::show_status;
pub use watch::run_watch;
