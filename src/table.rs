//! Plain CSV reading and writing.
//!
//! The tables this pipeline persists are small and fully string-valued, so a
//! minimal reader/writer with RFC-style quoting covers them.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};

/// An in-memory CSV table: one header record plus data rows.
#[derive(Debug, Clone)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|column| column == name)
    }
}

pub fn write_csv(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create csv file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    write_record(&mut writer, header, path)?;
    for row in rows {
        write_record(&mut writer, row, path)?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush csv file: {}", path.display()))
}

fn write_record<W: Write>(writer: &mut W, cells: &[String], path: &Path) -> Result<()> {
    let line = cells
        .iter()
        .map(|cell| escape_cell(cell))
        .collect::<Vec<String>>()
        .join(",");

    writeln!(writer, "{line}").with_context(|| format!("failed to write {}", path.display()))
}

/// Quotes a cell when it contains a delimiter, a quote, or a line break.
fn escape_cell(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

pub fn read_csv(path: &Path) -> Result<Table> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read csv file: {}", path.display()))?;

    let mut records = parse_records(&raw);
    if records.is_empty() {
        bail!("csv file has no header record: {}", path.display());
    }

    let header = records.remove(0);
    Ok(Table {
        header,
        rows: records,
    })
}

fn parse_records(raw: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    cell.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(ch);
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut cell)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut cell));
                records.push(std::mem::take(&mut record));
            }
            _ => cell.push(ch),
        }
    }

    // Final record without a trailing newline.
    if !cell.is_empty() || !record.is_empty() {
        record.push(cell);
        records.push(record);
    }

    records.retain(|cells| !(cells.len() == 1 && cells[0].is_empty()));
    records
}
