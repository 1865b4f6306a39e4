use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use serde_json::Value;

use leveled_log::{Context, Level, LogError, Logger, OptionsPatch, MEMORY_SCHEME};

/// Append one leveled entry to a log file.
#[derive(Parser, Debug)]
#[command(name = "leveled_log", version)]
struct Args {
    /// Severity name, e.g. error or info. Unknown names are suppressed.
    level: String,

    message: String,

    /// JSON file with logger options, applied before the flags below.
    #[arg(long)]
    options: Option<PathBuf>,

    /// Target directory, or memory:// to print the entry instead.
    #[arg(long)]
    directory: Option<String>,

    #[arg(long)]
    filename: Option<String>,

    #[arg(long)]
    extension: Option<String>,

    #[arg(long)]
    prefix: Option<String>,

    #[arg(long)]
    threshold: Option<Level>,

    /// Template using {date}, {level}, {level-padding}, {priority}, {message}, {context}.
    #[arg(long = "format")]
    log_format: Option<String>,

    #[arg(long)]
    date_format: Option<String>,

    #[arg(long)]
    flush_frequency: Option<u32>,

    /// Do not append the context block under the entry.
    #[arg(long)]
    no_context: bool,

    /// Context entry; the value is parsed as JSON when possible.
    #[arg(long = "context", value_name = "KEY=VALUE")]
    context: Vec<String>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), LogError> {
    let args = Args::parse();

    let context = parse_context(&args.context)?;
    let mut logger = Logger::new(build_patch(&args)?)?;

    logger.log(&args.level, &args.message, context.as_ref())?;
    logger.close()?;

    let path = logger.log_file_path().to_string_lossy();
    if path.starts_with(MEMORY_SCHEME) {
        print!("{}", logger.memory_contents());
    } else {
        println!("{}", path);
    }

    Ok(())
}

fn build_patch(args: &Args) -> Result<OptionsPatch, LogError> {
    let mut patch = match &args.options {
        Some(path) => OptionsPatch::from_json_str(&fs::read_to_string(path)?)?,
        None => OptionsPatch::new(),
    };

    if let Some(directory) = &args.directory {
        patch = patch.directory(directory);
    }
    if let Some(filename) = &args.filename {
        patch = patch.filename(filename);
    }
    if let Some(extension) = &args.extension {
        patch = patch.extension(extension);
    }
    if let Some(prefix) = &args.prefix {
        patch = patch.prefix(prefix);
    }
    if let Some(threshold) = args.threshold {
        patch = patch.threshold(threshold);
    }
    if let Some(log_format) = &args.log_format {
        patch = patch.log_format(log_format);
    }
    if let Some(date_format) = &args.date_format {
        patch = patch.date_format(date_format);
    }
    if let Some(every) = args.flush_frequency {
        patch = patch.flush_frequency(every);
    }
    if args.no_context {
        patch = patch.append_context(false);
    }

    Ok(patch.enabled(true))
}

fn parse_context(entries: &[String]) -> Result<Option<Context>, LogError> {
    if entries.is_empty() {
        return Ok(None);
    }

    let mut context = Context::new();
    for entry in entries {
        let Some((key, raw)) = entry.split_once('=') else {
            return Err(LogError::InvalidOption(format!(
                "context entry must be KEY=VALUE: {}",
                entry
            )));
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        context.insert(key.to_string(), value);
    }

    Ok(Some(context))
}
