//! Leveled, file-backed message logger.
//!
//! ```no_run
//! use leveled_log::{Level, Logger, OptionsPatch};
//!
//! let mut log = Logger::new(
//!     OptionsPatch::new()
//!         .enabled(true)
//!         .directory("/var/log/app")
//!         .threshold(Level::Info),
//! )?;
//! log.info("service started", None)?;
//! # Ok::<(), leveled_log::LogError>(())
//! ```

pub mod format;
pub mod logger;
pub mod model;

pub use format::{context_to_string, indent, timestamp, Context};
pub use logger::{Logger, SharedLogger};
pub use model::error::{LogError, Result};
pub use model::level::{level_name, priority_of, Level, UNKNOWN_PRIORITY};
pub use model::options::{FileMode, Options, OptionsPatch, MEMORY_SCHEME};
