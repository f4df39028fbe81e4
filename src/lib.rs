pub mod audit;
pub mod config;
pub mod error;
pub mod export;
pub mod frame;
pub mod load;
pub mod pipeline;
pub mod rules;
pub mod stats;
pub mod validate;

pub use config::CleaningConfig;
pub use error::{CleanError, Result};
pub use frame::TrainFrame;
pub use pipeline::{check_file, clean_frame, CleaningSession, RunSummary};
pub use validate::{ValidationReport, Validator};
