// CSV reading helpers and selection export

use std::io::Read;
use std::path::Path;

use wrfsel_core::{AggregationKind, SelectionRow};

use crate::EXPORT_HEADER;

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Must produce >1 field on the first line to be viable
        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // Score: lines agreeing with line 1, weighted by field count
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Write one scenario's selection rows as `Variable,hourly,daily,monthly`
/// with "X"/"" flag cells.
pub fn export_selection(rows: &[SelectionRow], path: &Path) -> Result<(), String> {
    let writer = csv::WriterBuilder::new()
        .from_path(path)
        .map_err(|e| e.to_string())?;
    write_selection(writer, rows)
}

/// Same as `export_selection`, into memory.
pub fn selection_to_string(rows: &[SelectionRow]) -> Result<String, String> {
    let mut buf = Vec::new();
    write_selection(csv::WriterBuilder::new().from_writer(&mut buf), rows)?;
    String::from_utf8(buf).map_err(|e| e.to_string())
}

fn write_selection<W: std::io::Write>(mut writer: csv::Writer<W>, rows: &[SelectionRow]) -> Result<(), String> {
    writer.write_record(EXPORT_HEADER).map_err(|e| e.to_string())?;

    for row in rows {
        writer
            .write_record([
                row.variable_id.as_str(),
                row.flag(AggregationKind::Hourly),
                row.flag(AggregationKind::Daily),
                row.flag(AggregationKind::Monthly),
            ])
            .map_err(|e| e.to_string())?;
    }

    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}
