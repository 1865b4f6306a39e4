//! Line formatting: timestamps, placeholder templates and the context
//! pretty-printer.

use std::borrow::Cow;
use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{Local, Timelike};
use serde_json::Value;

use crate::model::error::{LogError, Result};
use crate::model::level::level_name;
use crate::model::options::Options;

/// Structured context attached to a message. Iterates in insertion order.
pub type Context = serde_json::Map<String, Value>;

const LEVEL_PADDING_WIDTH: usize = 9;
const INDENT: &str = "    ";

/// Values a template placeholder can draw from.
struct Fields<'a> {
    date: &'a str,
    level: &'a str,
    priority: u8,
    message: &'a str,
    context: Option<&'a Context>,
}

type Producer = for<'a> fn(&Fields<'a>) -> Cow<'a, str>;

const PLACEHOLDERS: &[(&str, Producer)] = &[
    ("{date}", render_date),
    ("{level}", render_level),
    ("{level-padding}", render_level_padding),
    ("{priority}", render_priority),
    ("{message}", render_message),
    ("{context}", render_context_json),
];

fn render_date<'a>(f: &Fields<'a>) -> Cow<'a, str> {
    Cow::Borrowed(f.date)
}

fn render_level<'a>(f: &Fields<'a>) -> Cow<'a, str> {
    Cow::Owned(f.level.to_uppercase())
}

fn render_level_padding<'a>(f: &Fields<'a>) -> Cow<'a, str> {
    Cow::Owned(" ".repeat(LEVEL_PADDING_WIDTH.saturating_sub(f.level.len())))
}

fn render_priority<'a>(f: &Fields<'a>) -> Cow<'a, str> {
    Cow::Owned(f.priority.to_string())
}

fn render_message<'a>(f: &Fields<'a>) -> Cow<'a, str> {
    Cow::Borrowed(f.message)
}

fn render_context_json<'a>(f: &Fields<'a>) -> Cow<'a, str> {
    match f.context {
        // A map of JSON values always encodes.
        Some(context) => Cow::Owned(serde_json::to_string(context).unwrap_or_default()),
        None => Cow::Borrowed("null"),
    }
}

/// Formats one entry, including the trailing newline.
pub fn format_message(
    options: &Options,
    priority: u8,
    message: &str,
    context: Option<&Context>,
) -> Result<String> {
    let level = level_name(priority);
    let date = timestamp(&options.date_format)?;

    let mut formatted = match &options.log_format {
        Some(template) => substitute(
            template,
            &Fields {
                date: &date,
                level,
                priority,
                message,
                context,
            },
        ),
        None => format!("[{}] [{}] {}", date, level, message),
    };

    if let Some(context) = context.filter(|c| options.append_context && !c.is_empty()) {
        formatted.push('\n');
        formatted.push_str(&indent(&context_to_string(context), 4));
    }

    formatted.push('\n');
    Ok(formatted)
}

/// Single left-to-right pass; replaced text is never scanned again and
/// unrecognised braces are copied through.
fn substitute(template: &str, fields: &Fields) -> String {
    let mut out = String::with_capacity(template.len() + fields.message.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        match PLACEHOLDERS.iter().find(|(token, _)| tail.starts_with(token)) {
            Some((token, produce)) => {
                out.push_str(&produce(fields));
                rest = &tail[token.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Current local time, truncated to microseconds, rendered with a strftime
/// format. Fractional-second specifiers carry the microsecond field.
pub fn timestamp(format: &str) -> Result<String> {
    let items: Vec<Item> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(LogError::InvalidDateFormat(format.to_string()));
    }

    let now = Local::now();
    let micros = now.timestamp_subsec_micros();
    let now = now.with_nanosecond(micros * 1_000).unwrap_or(now);

    let mut out = String::new();
    write!(out, "{}", now.format_with_items(items.into_iter()))
        .map_err(|_| LogError::InvalidDateFormat(format.to_string()))?;
    Ok(out)
}

/// Prefixes every line of `text` with `size` spaces.
pub fn indent(text: &str, size: usize) -> String {
    let pad = " ".repeat(size);
    format!("{}{}", pad, text.replace('\n', &format!("\n{}", pad)))
}

/// Renders each context entry as `key: <literal>`, one per line.
pub fn context_to_string(context: &Context) -> String {
    let mut out = String::new();
    for (key, value) in context {
        out.push_str(key);
        out.push_str(": ");
        export_value(value, 0, &mut out);
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}

fn export_value(value: &Value, depth: usize, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => quote(s, out),
        Value::Array(items) if items.is_empty() => out.push_str("[]"),
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Array(items) => {
            out.push_str("[\n");
            for item in items {
                push_indent(depth + 1, out);
                export_value(item, depth + 1, out);
                out.push_str(",\n");
            }
            push_indent(depth, out);
            out.push(']');
        }
        Value::Object(map) => {
            out.push_str("{\n");
            for (key, item) in map {
                push_indent(depth + 1, out);
                quote(key, out);
                out.push_str(" => ");
                export_value(item, depth + 1, out);
                out.push_str(",\n");
            }
            push_indent(depth, out);
            out.push('}');
        }
    }
}

fn quote(s: &str, out: &mut String) {
    out.push('\'');
    out.push_str(s);
    out.push('\'');
}

fn push_indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}
