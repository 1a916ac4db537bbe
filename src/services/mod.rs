//! Library services: scanning, watching and metadata reconciliation

pub mod concurrency;
pub mod discogs;
pub mod filesystem;
pub mod integrator;
pub mod manager;
pub mod musicbrainz;
pub mod rate_limiter;
pub mod scanner;
pub mod task_manager;
pub mod text_utils;
pub mod watcher;

pub use filesystem::{FilesystemService, FilesystemServiceConfig};
pub use integrator::{Integrator, IntegratorConfig, IntegratorReport};
pub use manager::{HealthStatus, Service, ServiceHealth, ServicesManager};
pub use scanner::{ScanError, ScanOutcome, Scanner, Task};
pub use task_manager::{InitialScans, TaskManager};
pub use watcher::LibraryWatcher;
