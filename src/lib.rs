pub mod cancel;
pub mod config;
pub mod delay_manager;
pub mod error;
pub mod extractor;
pub mod input_loader;
pub mod logger;
pub mod orchestrator;
pub mod persistence;
pub mod profile;
pub mod resume_manager;
pub mod scraper;
pub mod session;
pub mod time_gate;

// Exporting types for convenience
pub use cancel::{CancellationFlag, CancellationSource};
pub use config::Config;
pub use delay_manager::{DelayCategory, DelayPolicy, DelaySpec};
pub use error::{Result, ScrapeError};
pub use extractor::{ExtractionPipeline, SectionOutcome};
pub use orchestrator::{Collaborators, HaltReason, Orchestrator, RunReport, RunState, RunSummary};
pub use persistence::PersistenceLayer;
pub use profile::{ProfileRecord, SectionName};
pub use resume_manager::DedupStore;
pub use time_gate::{Clock, SystemClock, TimeGate};
