pub mod broadcast;
pub mod config;
pub mod error;
pub mod fragment;
pub mod memsnap;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod source;
pub mod validate;

pub use broadcast::{JobPhase, JobProgressBroadcaster, JobProgressEvent};
pub use config::{Settings, ValidatorSettings};
pub use error::{ConfigError, FeedscanError, RegistryError, Result, RunError, SourceError};
pub use registry::{JobPatch, JobRecord, JobRegistry, JobStatus, MemoryRegistry, SeaOrmRegistry};
pub use runner::{CancelFlag, JobRunner, RunOutcome};
pub use scheduler::{JobScheduler, SchedulerContext};
pub use source::{DownloadUrlProvider, FileSource, HttpFileSource, SignedUrl};
pub use validate::{ReferenceData, ReferenceProvider, RowValidator, StaticReferenceProvider};
