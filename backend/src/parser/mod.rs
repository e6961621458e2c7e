//! CSV codec with encoding and delimiter auto-detection.
//!
//! Reads CSV bytes into a [`TabularDataset`] and writes datasets back out.
//! No knowledge of columns, instructions or results lives here.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;

use crate::error::{DatasetError, DatasetResult};
use crate::models::{Cell, TabularDataset};

/// Delimiters tried by [`detect_delimiter`], in tie-break order.
const CANDIDATE_DELIMITERS: [char; 4] = [';', ',', '\t', '|'];

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed dataset
    pub dataset: TabularDataset,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

impl ParseResult {
    pub fn headers(&self) -> &[String] {
        self.dataset.columns()
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "utf-8-sig" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> DatasetResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned())
        }
        other => {
            let codec = encoding_rs::Encoding::for_label(other.as_bytes())
                .ok_or_else(|| DatasetError::Encoding(format!("unsupported encoding '{}'", other)))?;
            let (text, _, had_errors) = codec.decode(bytes);
            if had_errors {
                // chardet guesses wrong on short inputs; UTF-8 is the safer reading
                return Ok(String::from_utf8_lossy(bytes).into_owned());
            }
            Ok(text.into_owned())
        }
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &CANDIDATE_DELIMITERS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text with an explicit delimiter.
///
/// # Example
/// ```ignore
/// use rowwise::parse_csv;
///
/// let ds = parse_csv("ID;Notes\n1;aspirin", ';').unwrap();
/// assert_eq!(ds.columns(), &["ID", "Notes"]);
/// ```
/// Rename repeated headers to `name.1`, `name.2`, ... skipping names already in use.
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(headers.len());

    for header in headers {
        let name = if used.contains(&header) {
            let count = counts.entry(header.clone()).or_insert(1);
            let mut candidate = format!("{}.{}", header, count);
            while used.contains(&candidate) {
                *count += 1;
                candidate = format!("{}.{}", header, count);
            }
            *count += 1;
            candidate
        } else {
            header
        };
        used.insert(name.clone());
        out.push(name);
    }

    out
}

pub fn parse_csv(content: &str, delimiter: char) -> DatasetResult<TabularDataset> {
    if content.trim().is_empty() {
        return Err(DatasetError::EmptyFile);
    }
    let delimiter = delimiter_byte(delimiter)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(parse_error)?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim().trim_matches('"').trim();
            if h.is_empty() {
                format!("Unnamed: {}", i)
            } else {
                h.to_string()
            }
        })
        .collect();

    if headers.is_empty() {
        return Err(DatasetError::NoHeaders);
    }

    let mut dataset = TabularDataset::new(dedupe_headers(headers))?;
    let width = dataset.column_count();

    for record in reader.records() {
        let record = record.map_err(parse_error)?;

        // Whitespace-only lines
        if width > 1 && record.len() == 1 && record[0].trim().is_empty() {
            continue;
        }

        let row: Vec<Cell> = (0..width)
            .map(|i| record.get(i).map(Cell::from_raw).unwrap_or(Cell::Empty))
            .collect();
        dataset.push_row(row)?;
    }

    Ok(dataset)
}

/// Parse CSV file with auto-detection of encoding and delimiter.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> DatasetResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Parse CSV file with auto-detected encoding and an explicit delimiter.
pub fn parse_csv_file<P: AsRef<Path>>(path: P, delimiter: char) -> DatasetResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes(&bytes, Some(delimiter))
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> DatasetResult<ParseResult> {
    parse_bytes(bytes, None)
}

/// Parse CSV bytes, detecting the delimiter unless one is given.
pub fn parse_bytes(bytes: &[u8], delimiter: Option<char>) -> DatasetResult<ParseResult> {
    if bytes.is_empty() {
        return Err(DatasetError::EmptyFile);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));
    let dataset = parse_csv(&content, delimiter)?;

    Ok(ParseResult {
        dataset,
        encoding,
        delimiter,
    })
}

/// Write a dataset as CSV (header row first).
pub fn write_csv<W: Write>(dataset: &TabularDataset, writer: W, delimiter: char) -> DatasetResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .from_writer(writer);

    csv_writer.write_record(dataset.columns()).map_err(write_error)?;
    for row in dataset.rows() {
        csv_writer
            .write_record(row.iter().map(Cell::to_field))
            .map_err(write_error)?;
    }
    csv_writer
        .flush()
        .map_err(|e| DatasetError::Write(e.to_string()))
}

/// Render a dataset as a CSV string.
pub fn to_csv_string(dataset: &TabularDataset, delimiter: char) -> DatasetResult<String> {
    let mut buf = Vec::new();
    write_csv(dataset, &mut buf, delimiter)?;
    String::from_utf8(buf).map_err(|e| DatasetError::Write(e.to_string()))
}

/// Write a dataset to a CSV file, replacing any existing file.
pub fn write_csv_file<P: AsRef<Path>>(
    dataset: &TabularDataset,
    path: P,
    delimiter: char,
) -> DatasetResult<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_csv(dataset, std::io::BufWriter::new(file), delimiter)
}

/// Format delimiter for display
pub fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn delimiter_byte(delimiter: char) -> DatasetResult<u8> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(DatasetError::Parse {
            line: 0,
            message: format!("delimiter '{}' is not an ASCII character", delimiter),
        })
    }
}

fn parse_error(e: csv::Error) -> DatasetError {
    let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
    DatasetError::Parse {
        line,
        message: e.to_string(),
    }
}

fn write_error(e: csv::Error) -> DatasetError {
    DatasetError::Write(e.to_string())
}
