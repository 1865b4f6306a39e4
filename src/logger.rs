use std::env;
use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;

use crate::format::{self, Context};
use crate::model::error::{LogError, Result};
use crate::model::level::{priority_of, Level};
use crate::model::options::{FileMode, Options, OptionsPatch, MEMORY_SCHEME};

/// A logger behind a lock, for callers that write from several threads.
pub type SharedLogger = Arc<Mutex<Logger>>;

#[derive(Debug)]
enum Sink {
    /// Unbuffered, so a failed write surfaces on the call that made it.
    /// Read mode opens it without write access.
    File(File),
    Memory { writable: bool },
}

#[derive(Debug)]
enum Handle {
    Closed,
    Open(Sink),
}

/// Leveled logger writing to a single file or to an in-memory buffer.
///
/// All operations run synchronously on the calling thread and the logger
/// owns its handle exclusively. Share it across threads through
/// [`Logger::into_shared`].
#[derive(Debug)]
pub struct Logger {
    options: Options,
    file_path: PathBuf,
    file_mode: FileMode,
    in_memory: bool,
    handle: Handle,
    memory: String,
    line_count: u64,
    last_line: Option<String>,
    flush_count: u64,
}

impl Logger {
    /// Builds a logger from the defaults overlaid with `patch`.
    pub fn new(patch: OptionsPatch) -> Result<Self> {
        Self::with_options(Options::default().merged(patch))
    }

    pub fn with_options(options: Options) -> Result<Self> {
        let directory = options.directory.clone();
        let mut logger = Logger {
            options,
            file_path: PathBuf::new(),
            file_mode: FileMode::Append,
            in_memory: false,
            handle: Handle::Closed,
            memory: String::new(),
            line_count: 0,
            last_line: None,
            flush_count: 0,
        };
        logger.set_log_file_path(directory.as_deref())?;
        Ok(logger)
    }

    pub fn into_shared(self) -> SharedLogger {
        Arc::new(Mutex::new(self))
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Merges `patch` into the current options and re-resolves the path.
    pub fn set_options(&mut self, patch: OptionsPatch) -> Result<&mut Self> {
        self.options.merge(patch);
        let directory = self.options.directory.clone();
        self.set_log_file_path(directory.as_deref())
    }

    pub fn level_threshold(&self) -> Level {
        self.options.threshold
    }

    pub fn set_level_threshold(&mut self, threshold: Level) -> &mut Self {
        self.options.threshold = threshold;
        self
    }

    pub fn last_line(&self) -> Option<&str> {
        self.last_line.as_deref()
    }

    pub fn line_count(&self) -> u64 {
        self.line_count
    }

    /// Number of flushes pushed to an open sink, by cadence or explicitly.
    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    pub fn log_file_path(&self) -> &Path {
        &self.file_path
    }

    /// Points the logger at `directory`. A `memory://` value selects the
    /// in-memory sink in truncate mode; anything else is resolved to a
    /// directory and opened in append mode.
    pub fn set_log_file_path(&mut self, directory: Option<&str>) -> Result<&mut Self> {
        let (path, mode, in_memory) = match directory {
            Some(scheme) if scheme.starts_with(MEMORY_SCHEME) => {
                (PathBuf::from(scheme), FileMode::Truncate, true)
            }
            _ => {
                let dir = self.resolve_directory(directory)?;
                let path = PathBuf::from(format!("{}/{}", dir.display(), self.resolve_file_name()));
                (path, FileMode::Append, false)
            }
        };

        let released = self.release();
        self.file_path = path;
        self.file_mode = mode;
        self.in_memory = in_memory;
        released?;
        Ok(self)
    }

    pub fn file_handle_mode(&self) -> FileMode {
        self.file_mode
    }

    /// Changes the open mode. Any open handle is closed and reopened on the
    /// next write.
    pub fn set_file_handle_mode(&mut self, mode: FileMode) -> Result<&mut Self> {
        let released = self.release();
        self.file_mode = mode;
        released?;
        Ok(self)
    }

    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    pub fn is_disabled(&self) -> bool {
        !self.options.enabled
    }

    pub fn enable(&mut self) -> &mut Self {
        self.options.enabled = true;
        self
    }

    pub fn disable(&mut self) -> &mut Self {
        self.options.enabled = false;
        self
    }

    /// Everything written to the in-memory sink since it was last truncated.
    pub fn memory_contents(&self) -> &str {
        &self.memory
    }

    /// Formats and writes `message` when the logger is enabled and `level`
    /// is at least as severe as the threshold. Unknown level names rank
    /// below every known level.
    pub fn log(&mut self, level: &str, message: &str, context: Option<&Context>) -> Result<&mut Self> {
        if !self.options.enabled {
            return Ok(self);
        }

        let given = priority_of(level);
        if given <= self.options.threshold.priority() {
            let formatted = self.format_message(given, message, context)?;
            self.write(&formatted)?;
        }

        Ok(self)
    }

    pub fn emergency(&mut self, message: &str, context: Option<&Context>) -> Result<&mut Self> {
        self.log(Level::Emergency.as_str(), message, context)
    }

    pub fn alert(&mut self, message: &str, context: Option<&Context>) -> Result<&mut Self> {
        self.log(Level::Alert.as_str(), message, context)
    }

    pub fn critical(&mut self, message: &str, context: Option<&Context>) -> Result<&mut Self> {
        self.log(Level::Critical.as_str(), message, context)
    }

    pub fn error(&mut self, message: &str, context: Option<&Context>) -> Result<&mut Self> {
        self.log(Level::Error.as_str(), message, context)
    }

    pub fn warning(&mut self, message: &str, context: Option<&Context>) -> Result<&mut Self> {
        self.log(Level::Warning.as_str(), message, context)
    }

    pub fn notice(&mut self, message: &str, context: Option<&Context>) -> Result<&mut Self> {
        self.log(Level::Notice.as_str(), message, context)
    }

    pub fn info(&mut self, message: &str, context: Option<&Context>) -> Result<&mut Self> {
        self.log(Level::Info.as_str(), message, context)
    }

    pub fn debug(&mut self, message: &str, context: Option<&Context>) -> Result<&mut Self> {
        self.log(Level::Debug.as_str(), message, context)
    }

    /// Returns the temp directory for `None`, otherwise makes sure the
    /// directory exists and strips trailing separators.
    pub fn resolve_directory(&self, directory: Option<&str>) -> Result<PathBuf> {
        let Some(directory) = directory.filter(|d| !d.is_empty()) else {
            return Ok(env::temp_dir());
        };

        if !Path::new(directory).is_dir() {
            let mut builder = DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(self.options.permission);
            }
            builder.create(directory)?;
        }

        Ok(PathBuf::from(directory.trim_end_matches(&['/', '\\'][..])))
    }

    /// The explicit filename with the extension appended unless it already
    /// ends in exactly `.<extension>`, or `<prefix><YYYY-MM-DD>.<extension>`.
    pub fn resolve_file_name(&self) -> String {
        let extension = format!(".{}", self.options.extension);

        match self.options.filename.as_deref().filter(|f| !f.is_empty()) {
            Some(name) if name.ends_with(&extension) => name.to_string(),
            Some(name) => format!("{}{}", name, extension),
            None => format!(
                "{}{}{}",
                self.options.prefix,
                Local::now().format("%Y-%m-%d"),
                extension
            ),
        }
    }

    pub fn format_message(&self, priority: u8, message: &str, context: Option<&Context>) -> Result<String> {
        format::format_message(&self.options, priority, message, context)
    }

    pub fn timestamp(&self, date_format: &str) -> Result<String> {
        format::timestamp(date_format)
    }

    pub fn indent(&self, text: &str, size: usize) -> String {
        format::indent(text, size)
    }

    /// Appends an already formatted entry, opening the sink if needed.
    /// The entry only counts once it has reached the sink, including the
    /// cadence flush when one is due.
    pub fn write(&mut self, message: &str) -> Result<&mut Self> {
        if let Handle::Closed = self.handle {
            self.handle = Handle::Open(self.open()?);
        }

        let written = match &mut self.handle {
            Handle::Open(Sink::File(file)) => file.write_all(message.as_bytes()).is_ok(),
            Handle::Open(Sink::Memory { writable: true }) => {
                self.memory.push_str(message);
                true
            }
            Handle::Open(Sink::Memory { writable: false }) | Handle::Closed => false,
        };

        if !written {
            return Err(LogError::SinkNotWritable);
        }

        let line_count = self.line_count + 1;
        if let Some(every) = self.options.flush_every() {
            if line_count % u64::from(every) == 0 {
                self.flush()?;
            }
        }

        self.last_line = Some(message.trim().to_string());
        self.line_count = line_count;
        Ok(self)
    }

    /// Forces written data down to the sink. A closed logger has nothing to
    /// flush.
    pub fn flush(&mut self) -> Result<&mut Self> {
        let flushed = match &mut self.handle {
            Handle::Closed => false,
            Handle::Open(Sink::File(file)) => {
                sync(file)?;
                true
            }
            Handle::Open(_) => true,
        };

        if flushed {
            self.flush_count += 1;
        }
        Ok(self)
    }

    /// Flushes and releases the handle. The next write reopens it.
    pub fn close(&mut self) -> Result<()> {
        self.release()
    }

    fn open(&mut self) -> Result<Sink> {
        if self.in_memory {
            return Ok(match self.file_mode {
                FileMode::Truncate => {
                    self.memory.clear();
                    Sink::Memory { writable: true }
                }
                FileMode::Append => Sink::Memory { writable: true },
                FileMode::Read => Sink::Memory { writable: false },
            });
        }

        let sink = match self.file_mode {
            FileMode::Append => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.file_path)?;
                Sink::File(file)
            }
            FileMode::Truncate => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&self.file_path)?;
                Sink::File(file)
            }
            FileMode::Read => Sink::File(File::open(&self.file_path)?),
        };

        Ok(sink)
    }

    // Leaves the handle closed even when the final flush fails.
    fn release(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.handle, Handle::Closed) {
            Handle::Open(Sink::File(mut file)) => {
                file.flush().map_err(|_| LogError::SinkNotWritable)
            }
            _ => Ok(()),
        }
    }
}

// Special files such as pipes and devices reject fsync with EINVAL.
fn sync(file: &File) -> Result<()> {
    match file.sync_data() {
        Err(err) if err.kind() != ErrorKind::InvalidInput => Err(LogError::SinkNotWritable),
        _ => Ok(()),
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_logger(patch: OptionsPatch) -> Logger {
        Logger::new(patch.directory("memory://").enabled(true)).unwrap()
    }

    #[test]
    fn test_accessors_and_defaults() {
        let mut log = Logger::new(OptionsPatch::new().extension("log")).unwrap();

        assert_eq!(log.options().extension, "log");
        assert_eq!(log.level_threshold(), Level::Debug);
        assert_eq!(log.set_level_threshold(Level::Info).level_threshold(), Level::Info);
        assert_eq!(log.last_line(), None);
        assert_eq!(log.line_count(), 0);
        assert_eq!(log.file_handle_mode(), FileMode::Append);

        let expected = format!(
            "{}/log_{}.log",
            env::temp_dir().display(),
            Local::now().format("%Y-%m-%d")
        );
        assert_eq!(log.log_file_path(), Path::new(&expected));
    }

    #[test]
    fn test_memory_scheme_is_used_verbatim() {
        let mut log = Logger::new(OptionsPatch::new()).unwrap();
        log.set_log_file_path(Some("memory://scratch")).unwrap();

        assert_eq!(log.log_file_path(), Path::new("memory://scratch"));
        assert_eq!(log.file_handle_mode(), FileMode::Truncate);

        log.set_file_handle_mode(FileMode::Read).unwrap();
        assert_eq!(log.file_handle_mode(), FileMode::Read);
    }

    #[test]
    fn test_resolve_file_name_suffix_rules() {
        let name = |filename: &str| {
            Logger::new(OptionsPatch::new().filename(filename))
                .unwrap()
                .resolve_file_name()
        };
        assert_eq!(name("daily"), "daily.txt");
        assert_eq!(name("daily.txt"), "daily.txt");
        assert_eq!(name("daily.log"), "daily.log.txt");

        let generated = Logger::new(OptionsPatch::new()).unwrap().resolve_file_name();
        assert_eq!(generated, format!("log_{}.txt", Local::now().format("%Y-%m-%d")));
    }

    #[test]
    fn test_threshold_filters_by_priority() {
        let mut log = memory_logger(OptionsPatch::new().log_format("{level} {message}").threshold(Level::Error));

        for level in Level::ALL {
            let before = log.line_count();
            log.log(level.as_str(), level.as_str(), None).unwrap();
            if level <= Level::Error {
                assert_eq!(log.line_count(), before + 1);
                assert_eq!(log.last_line(), Some(format!("{} {}", level.as_str().to_uppercase(), level).as_str()));
            } else {
                assert_eq!(log.line_count(), before);
            }
        }
    }

    #[test]
    fn test_unknown_level_is_suppressed() {
        let mut log = memory_logger(OptionsPatch::new());
        log.log("verbose", "dropped", None).unwrap();
        assert_eq!(log.line_count(), 0);
        assert_eq!(log.last_line(), None);
    }

    #[test]
    fn test_level_matching_ignores_case() {
        let mut log = memory_logger(OptionsPatch::new().log_format("{level} {message}").threshold(Level::Error));
        log.log("ERROR", "upper", None).unwrap();
        assert_eq!(log.last_line(), Some("ERROR upper"));
    }

    #[test]
    fn test_log_sequence_with_mode_switch() {
        let mut log = memory_logger(
            OptionsPatch::new()
                .flush_frequency(2)
                .log_format("{level} {message}")
                .threshold(Level::Error),
        );

        assert_eq!(log.log("error", "first log", None).unwrap().last_line(), Some("ERROR first log"));
        log.set_file_handle_mode(FileMode::Append).unwrap();
        assert_eq!(log.log("critical", "second log", None).unwrap().last_line(), Some("CRITICAL second log"));
        assert_eq!(log.log("debug", "third log", None).unwrap().last_line(), Some("CRITICAL second log"));

        assert_eq!(log.memory_contents(), "ERROR first log\nCRITICAL second log\n");
        assert_eq!(log.line_count(), 2);
        assert_eq!(log.flush_count(), 1);
    }

    #[test]
    fn test_memory_truncate_mode_clears_on_reopen() {
        let mut log = memory_logger(OptionsPatch::new().log_format("{message}"));
        log.info("one", None).unwrap();
        log.set_file_handle_mode(FileMode::Truncate).unwrap();
        log.info("two", None).unwrap();

        assert_eq!(log.memory_contents(), "two\n");
        assert_eq!(log.line_count(), 2);
    }

    #[test]
    fn test_read_only_sink_is_not_writable() {
        let mut log = memory_logger(OptionsPatch::new());
        log.set_file_handle_mode(FileMode::Read).unwrap();

        let err = log.log("error", "foo", None).unwrap_err();
        assert!(matches!(err, LogError::SinkNotWritable));
        assert_eq!(
            err.to_string(),
            "The file could not be written to. Check that appropriate permissions have been set."
        );
        assert_eq!(log.line_count(), 0);
        assert_eq!(log.last_line(), None);
    }

    #[test]
    fn test_enable_disable() {
        let mut log = memory_logger(OptionsPatch::new());

        assert!(log.is_enabled());
        assert!(!log.is_disabled());
        assert!(!log.enable().is_disabled());
        assert!(log.disable().is_disabled());
        assert!(log.disable().is_disabled());

        assert_eq!(log.log("error", "unwritten", None).unwrap().last_line(), None);
        assert_eq!(log.memory_contents(), "");
    }

    #[test]
    fn test_disabled_by_default() {
        let mut log = Logger::new(OptionsPatch::new().directory("memory://")).unwrap();
        assert!(log.is_disabled());
        log.emergency("ignored", None).unwrap();
        assert_eq!(log.line_count(), 0);
    }

    #[test]
    fn test_flush_cadence() {
        let mut log = memory_logger(OptionsPatch::new().flush_frequency(2));
        let mut flushes = Vec::new();
        for _ in 0..5 {
            log.debug("tick", None).unwrap();
            flushes.push(log.flush_count());
        }
        assert_eq!(flushes, vec![0, 1, 1, 2, 2]);
    }

    #[test]
    fn test_no_cadence_without_frequency() {
        let mut log = memory_logger(OptionsPatch::new());
        for _ in 0..4 {
            log.debug("tick", None).unwrap();
        }
        assert_eq!(log.flush_count(), 0);
    }

    #[test]
    fn test_shared_logger_serializes_writers() {
        let shared = memory_logger(OptionsPatch::new().log_format("{message}")).into_shared();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        shared.lock().info(&format!("thread {}", i), None).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let log = shared.lock();
        assert_eq!(log.line_count(), 40);
        assert_eq!(log.memory_contents().lines().count(), 40);
    }
}
