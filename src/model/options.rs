use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::model::error::LogError;
use crate::model::level::Level;

/// Directory values starting with this scheme select the in-memory sink.
pub const MEMORY_SCHEME: &str = "memory://";

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %-H:%M:%S%.6f";

/// How the sink is opened on the next write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum FileMode {
    /// Create if missing, keep existing content.
    Append,
    /// Create if missing, discard existing content.
    Truncate,
    /// Open existing content read-only. Writes fail.
    Read,
}

impl FileMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FileMode::Append => "append",
            FileMode::Truncate => "truncate",
            FileMode::Read => "read",
        }
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileMode {
    type Err = LogError;

    // fopen-style letters are accepted alongside the names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "append" | "a" | "a+" => Ok(FileMode::Append),
            "truncate" | "w" | "w+" => Ok(FileMode::Truncate),
            "read" | "r" => Ok(FileMode::Read),
            other => Err(LogError::InvalidOption(format!("unknown file mode: {}", other))),
        }
    }
}

impl TryFrom<String> for FileMode {
    type Error = LogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Logger configuration. Keys use camelCase when loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    pub extension: String,
    /// chrono strftime syntax.
    pub date_format: String,
    pub filename: Option<String>,
    pub enabled: bool,
    /// Flush every N successful writes. `None` or `0` leaves it to buffering.
    pub flush_frequency: Option<u32>,
    pub prefix: String,
    pub log_format: Option<String>,
    pub append_context: bool,
    /// Mode bits for created directories (unix only).
    pub permission: u32,
    pub directory: Option<String>,
    pub threshold: Level,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            extension: "txt".to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            filename: None,
            enabled: false,
            flush_frequency: None,
            prefix: "log_".to_string(),
            log_format: None,
            append_context: true,
            permission: 0o777,
            directory: None,
            threshold: Level::Debug,
        }
    }
}

impl Options {
    /// Overlays every field the patch sets; the rest keep their values.
    pub fn merge(&mut self, patch: OptionsPatch) {
        if let Some(extension) = patch.extension {
            self.extension = extension;
        }
        if let Some(date_format) = patch.date_format {
            self.date_format = date_format;
        }
        if let Some(filename) = patch.filename {
            self.filename = filename;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(flush_frequency) = patch.flush_frequency {
            self.flush_frequency = flush_frequency;
        }
        if let Some(prefix) = patch.prefix {
            self.prefix = prefix;
        }
        if let Some(log_format) = patch.log_format {
            self.log_format = log_format;
        }
        if let Some(append_context) = patch.append_context {
            self.append_context = append_context;
        }
        if let Some(permission) = patch.permission {
            self.permission = permission;
        }
        if let Some(directory) = patch.directory {
            self.directory = directory;
        }
        if let Some(threshold) = patch.threshold {
            self.threshold = threshold;
        }
    }

    pub fn merged(mut self, patch: OptionsPatch) -> Self {
        self.merge(patch);
        self
    }

    /// Cadence as a positive count, treating `0` as unset.
    pub fn flush_every(&self) -> Option<u32> {
        self.flush_frequency.filter(|n| *n > 0)
    }
}

/// Partial configuration. `None` leaves a field alone; for optional fields
/// `Some(None)` (JSON `null`) clears it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct OptionsPatch {
    pub extension: Option<String>,
    pub date_format: Option<String>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub filename: Option<Option<String>>,
    pub enabled: Option<bool>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub flush_frequency: Option<Option<u32>>,
    pub prefix: Option<String>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub log_format: Option<Option<String>>,
    pub append_context: Option<bool>,
    pub permission: Option<u32>,
    #[serde(deserialize_with = "deserialize_nullable")]
    pub directory: Option<Option<String>>,
    pub threshold: Option<Level>,
}

fn deserialize_nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl OptionsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, LogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = Some(date_format.into());
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(Some(filename.into()));
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn flush_frequency(mut self, every: u32) -> Self {
        self.flush_frequency = Some(Some(every));
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn log_format(mut self, log_format: impl Into<String>) -> Self {
        self.log_format = Some(Some(log_format.into()));
        self
    }

    pub fn append_context(mut self, append_context: bool) -> Self {
        self.append_context = Some(append_context);
        self
    }

    pub fn permission(mut self, permission: u32) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(Some(directory.into()));
        self
    }

    pub fn threshold(mut self, threshold: Level) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.extension, "txt");
        assert_eq!(options.prefix, "log_");
        assert_eq!(options.threshold, Level::Debug);
        assert_eq!(options.permission, 0o777);
        assert!(!options.enabled);
        assert!(options.append_context);
        assert!(options.filename.is_none());
        assert!(options.log_format.is_none());
    }

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let mut options = Options::default().merged(OptionsPatch::new().filename("daily"));
        options.merge(OptionsPatch::new().extension("log").threshold(Level::Error));

        assert_eq!(options.filename.as_deref(), Some("daily"));
        assert_eq!(options.extension, "log");
        assert_eq!(options.threshold, Level::Error);
        assert_eq!(options.prefix, "log_");
    }

    #[test]
    fn test_patch_from_json_can_clear_optional_fields() {
        let mut options = Options::default().merged(OptionsPatch::new().log_format("{message}"));
        let patch = OptionsPatch::from_json_str(
            r#"{"logFormat": null, "flushFrequency": 3, "threshold": "WARNING"}"#,
        )
        .unwrap();
        options.merge(patch);

        assert!(options.log_format.is_none());
        assert_eq!(options.flush_every(), Some(3));
        assert_eq!(options.threshold, Level::Warning);
    }

    #[test]
    fn test_patch_rejects_unknown_keys() {
        assert!(OptionsPatch::from_json_str(r#"{"colour": true}"#).is_err());
    }

    #[test]
    fn test_zero_flush_frequency_is_unset() {
        let options = Options::default().merged(OptionsPatch::new().flush_frequency(0));
        assert_eq!(options.flush_every(), None);
    }

    #[test]
    fn test_file_mode_parsing() {
        assert_eq!("a".parse::<FileMode>().unwrap(), FileMode::Append);
        assert_eq!("w+".parse::<FileMode>().unwrap(), FileMode::Truncate);
        assert_eq!("Read".parse::<FileMode>().unwrap(), FileMode::Read);
        assert!("x".parse::<FileMode>().is_err());
    }
}
