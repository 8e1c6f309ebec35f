pub mod config;
pub mod parser;
pub mod scheduler;
pub mod worker;

pub use config::{ConfigError, EngineConfig, ExporterConfig};
pub use parser::{load_config_from_file, parse_config_from_str};
pub use scheduler::{effective_interval, RetryPolicy, Scheduler};
pub use worker::{spawn_workers, BudgetWorker, TickReport};
