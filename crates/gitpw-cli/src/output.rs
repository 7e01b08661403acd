//! Output renderers, column helpers and pager integration for CLI commands.

use std::env;
use std::io::{self, IsTerminal, Write};
use std::process::Stdio;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::ValueEnum;
use gitpw_config::Settings;
use serde_json::Value;
use serde_yaml::Mapping;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::signal::unix::{SignalKind, signal};
use tracing::debug;
use unicode_width::UnicodeWidthStr;

use crate::client::{CliError, CliResult};

const DEFAULT_PAGER: &str = "less";
const PAGER_CONFIG_KEY: &str = "core.parser";

/// Supported renderings for list and detail views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Simple,
    Csv,
    Yaml,
}

impl OutputFormat {
    fn from_config(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value.trim(), true).ok()
    }
}

/// Flag first, then `pw.format`, then the bordered table.
pub(crate) fn resolve_format(
    flag: Option<OutputFormat>,
    settings: &Settings,
) -> CliResult<OutputFormat> {
    if let Some(format) = flag {
        return Ok(format);
    }
    settings.format().map_or(Ok(OutputFormat::Table), |value| {
        OutputFormat::from_config(&value).ok_or_else(|| {
            CliError::validation(format!(
                "Invalid output format '{value}'; expected one of table, simple, csv, yaml"
            ))
        })
    })
}

/// Header plus rows, as produced by the command handlers.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Rows {
    pub(crate) headers: Vec<String>,
    pub(crate) rows: Vec<Vec<Value>>,
}

impl Rows {
    pub(crate) fn new(headers: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            headers: headers.iter().map(|header| (*header).to_string()).collect(),
            rows,
        }
    }

    /// Two-column property/value view used by the `show` commands.
    pub(crate) fn properties(pairs: Vec<(&str, Value)>) -> Self {
        Self::new(
            &["Property", "Value"],
            pairs
                .into_iter()
                .map(|(name, value)| vec![Value::String(name.to_string()), value])
                .collect(),
        )
    }

    /// Keep only the named columns, in header order. Empty keeps everything.
    pub(crate) fn select(self, columns: &[String]) -> CliResult<Self> {
        if columns.is_empty() {
            return Ok(self);
        }
        if let Some(unknown) = columns.iter().find(|column| !self.headers.contains(*column)) {
            return Err(CliError::validation(format!(
                "Invalid column '{unknown}'; expected one of {}",
                self.headers.join(", ")
            )));
        }
        let keep: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, header)| columns.contains(*header))
            .map(|(index, _)| index)
            .collect();
        Ok(Self {
            headers: keep.iter().map(|&index| self.headers[index].clone()).collect(),
            rows: self
                .rows
                .into_iter()
                .map(|row| {
                    keep.iter()
                        .map(|&index| row.get(index).cloned().unwrap_or(Value::Null))
                        .collect()
                })
                .collect(),
        })
    }
}

pub(crate) fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

/// Render rows in the requested format. The result ends with a newline.
pub(crate) fn render(rows: &Rows, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Table => Ok(render_grid(rows, true)),
        OutputFormat::Simple => Ok(render_grid(rows, false)),
        OutputFormat::Csv => Ok(render_csv(rows)),
        OutputFormat::Yaml => render_yaml(rows),
    }
}

struct Column {
    width: usize,
    numeric: bool,
}

fn columns(headers: &[String], cells: &[Vec<String>], rows: &[Vec<Value>]) -> Vec<Column> {
    headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            let width = cells
                .iter()
                .filter_map(|row| row.get(index))
                .map(|cell| cell.width())
                .chain(std::iter::once(header.width()))
                .max()
                .unwrap_or(0);
            let mut values = rows
                .iter()
                .filter_map(|row| row.get(index))
                .filter(|value| !value.is_null())
                .peekable();
            let numeric = values.peek().is_some() && values.all(Value::is_number);
            Column { width, numeric }
        })
        .collect()
}

fn pad(text: &str, column: &Column) -> String {
    let fill = " ".repeat(column.width.saturating_sub(text.width()));
    if column.numeric {
        format!("{fill}{text}")
    } else {
        format!("{text}{fill}")
    }
}

fn render_grid(rows: &Rows, bordered: bool) -> String {
    let cells: Vec<Vec<String>> = rows
        .rows
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    let layout = columns(&rows.headers, &cells, &rows.rows);

    let line = |texts: &[String]| -> String {
        let padded: Vec<String> = layout
            .iter()
            .enumerate()
            .map(|(index, column)| pad(texts.get(index).map_or("", String::as_str), column))
            .collect();
        if bordered {
            format!("| {} |", padded.join(" | "))
        } else {
            padded.join("  ").trim_end().to_string()
        }
    };
    let rule = |joint: char, edge: char| -> String {
        let dashes: Vec<String> = layout
            .iter()
            .map(|column| "-".repeat(column.width + if bordered { 2 } else { 0 }))
            .collect();
        if bordered {
            format!("{edge}{}{edge}", dashes.join(&joint.to_string()))
        } else {
            dashes.join("  ")
        }
    };

    let mut out = Vec::with_capacity(cells.len() + 4);
    if bordered {
        out.push(rule('+', '+'));
    }
    out.push(line(&rows.headers));
    out.push(rule('+', '|'));
    out.extend(cells.iter().map(|row| line(row)));
    if bordered {
        out.push(rule('+', '+'));
    }
    let mut text = out.join("\n");
    text.push('\n');
    text
}

fn csv_field(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

fn render_csv(rows: &Rows) -> String {
    let mut text = String::new();
    let header: Vec<String> = rows.headers.iter().map(|header| csv_field(header)).collect();
    text.push_str(&header.join(","));
    text.push('\n');
    for row in &rows.rows {
        let fields: Vec<String> = row.iter().map(|value| csv_field(&cell_text(value))).collect();
        text.push_str(&fields.join(","));
        text.push('\n');
    }
    text
}

fn render_yaml(rows: &Rows) -> CliResult<String> {
    let mut records = Vec::with_capacity(rows.rows.len());
    for row in &rows.rows {
        let mut record = Mapping::new();
        for (header, value) in rows.headers.iter().zip(row) {
            let value = serde_yaml::to_value(value)
                .map_err(|err| CliError::failure(anyhow!("failed to format YAML: {err}")))?;
            record.insert(serde_yaml::Value::String(header.to_lowercase()), value);
        }
        records.push(record);
    }
    serde_yaml::to_string(&records)
        .map_err(|err| CliError::failure(anyhow!("failed to format YAML: {err}")))
}

/// Trim to `length` characters, marking the cut with `...`.
#[must_use]
pub(crate) fn trim(text: &str, length: usize) -> String {
    if text.chars().count() > length {
        let kept: String = text.chars().take(length.saturating_sub(1)).collect();
        format!("{kept}...")
    } else {
        text.to_string()
    }
}

fn parse_date(value: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(value)
        .map(|date| date.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// Relative rendering of a server timestamp, e.g. "3 days ago".
#[must_use]
pub(crate) fn humanize_date(value: &str) -> String {
    humanize_date_at(value, Utc::now().naive_utc())
}

pub(crate) fn humanize_date_at(value: &str, now: NaiveDateTime) -> String {
    let Some(date) = parse_date(value) else {
        return value.to_string();
    };
    let elapsed = (now - date).to_std().unwrap_or_default();
    timeago::Formatter::new().convert(elapsed)
}

/// Pager command: `GIT_PAGER`, then `core.parser`, then `PAGER`, then `less`.
pub(crate) fn resolve_pager<F>(env_var: F, settings: &Settings) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |value: &String| !value.trim().is_empty();
    env_var("GIT_PAGER")
        .filter(non_empty)
        .or_else(|| settings.raw(PAGER_CONFIG_KEY))
        .or_else(|| env_var("PAGER").filter(non_empty))
        .unwrap_or_else(|| DEFAULT_PAGER.to_string())
}

/// Render and emit rows, paging when stdout is a terminal.
pub(crate) async fn emit(settings: &Settings, rows: &Rows, format: OutputFormat) -> CliResult<()> {
    let text = render(rows, format)?;
    echo_via_pager(settings, &text).await
}

/// Pager to run, or `None` when output is not interactive.
fn pager_for(settings: &Settings, interactive: bool) -> Option<String> {
    interactive.then(|| resolve_pager(|key| env::var(key).ok(), settings))
}

pub(crate) async fn echo_via_pager(settings: &Settings, text: &str) -> CliResult<()> {
    let Some(pager) = pager_for(settings, io::stdout().is_terminal()) else {
        return write_direct(text);
    };
    match page_through(&pager, text).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("pager '{pager}' unavailable: {err}");
            write_direct(text)
        }
        Err(err) => Err(CliError::failure(anyhow!("failed to run pager '{pager}': {err}"))),
    }
}

pub(crate) fn write_direct(text: &str) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    match stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush()) {
        Err(err) if err.kind() != io::ErrorKind::BrokenPipe => {
            Err(CliError::failure(anyhow!("failed to write output: {err}")))
        }
        _ => Ok(()),
    }
}

/// Feed `text` to the pager and wait for it to exit. `SIGINT` is consumed
/// while the pager owns the terminal.
async fn page_through(pager: &str, text: &str) -> io::Result<()> {
    let mut interrupts = signal(SignalKind::interrupt())?;

    let mut command = Command::new("sh");
    command.arg("-c").arg(pager).stdin(Stdio::piped());
    if env::var_os("LESS").is_none() {
        command.env("LESS", "FRX");
    }
    let mut child = command.spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        match stdin.write_all(text.as_bytes()).await {
            Err(err) if err.kind() != io::ErrorKind::BrokenPipe => return Err(err),
            _ => {}
        }
    }

    loop {
        tokio::select! {
            status = child.wait() => return status.map(|_| ()),
            _ = interrupts.recv() => debug!("interrupt ignored while the pager runs"),
        }
    }
}
