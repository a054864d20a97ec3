//! CSV decoding with encoding and delimiter auto-detection.
//!
//! Turns raw CSV bytes into a [`Table`] of text cells. No type inference
//! happens here: every field is kept as text, except configured null
//! markers which become [`Value::Null`].

use crate::error::{SourceError, SourceResult};
use crate::models::{Table, Value};

/// Null markers recognised by default (SQL dumps, Postgres `COPY`, pandas).
pub const DEFAULT_NULL_MARKERS: &[&str] = &["NULL", "\\N", "NaN"];

/// Parsing options.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter; auto-detected when `None`.
    pub delimiter: Option<char>,
    /// Exact field contents that mean "missing".
    pub null_markers: Vec<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            null_markers: DEFAULT_NULL_MARKERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed table
    pub table: Table,
    /// Detected encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> SourceResult<String> {
    let text = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).to_string(),
        },
        // Single-byte: every byte maps to a character, so decoding cannot fail.
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.to_string(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        _ => String::from_utf8_lossy(bytes).to_string(),
    };

    // Strip a UTF-8 byte-order mark so it does not end up in the first header.
    Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text with an explicit delimiter.
pub fn parse_str(content: &str, delimiter: char, null_markers: &[String]) -> SourceResult<Table> {
    if content.trim().is_empty() {
        return Err(SourceError::EmptyFile);
    }

    let delimiter = u8::try_from(delimiter).map_err(|_| SourceError::Parse {
        line: 1,
        message: format!("delimiter '{delimiter}' is not a single byte"),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(String::is_empty) {
        return Err(SourceError::Parse {
            line: 1,
            message: "No headers found".to_string(),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        // Blank lines come through as a single empty field.
        if record.len() == 1 && record.get(0).is_some_and(str::is_empty) && headers.len() > 1 {
            continue;
        }
        let row = record
            .iter()
            .map(|field| {
                if null_markers.iter().any(|m| m == field) {
                    Value::Null
                } else {
                    Value::Text(field.to_string())
                }
            })
            .collect();
        rows.push(row);
    }

    Ok(Table::from_rows(headers, rows)?)
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes(bytes: &[u8], options: &CsvOptions) -> SourceResult<ParseResult> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = options
        .delimiter
        .unwrap_or_else(|| detect_delimiter(&content));

    let table = parse_str(&content, delimiter, &options.null_markers)?;

    Ok(ParseResult {
        table,
        encoding,
        delimiter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<String> {
        CsvOptions::default().null_markers
    }

    #[test]
    fn test_simple_csv() {
        let table = parse_str("name;age\nAlice;30\nBob;25", ';', &markers()).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_names(), vec!["name", "age"]);
        assert_eq!(table.column("age").unwrap().values[0], Value::from("30"));
    }

    #[test]
    fn test_quoted_values_keep_delimiters() {
        let csv = "model,trim\n\"3 Series, Touring\",328i";
        let table = parse_str(csv, ',', &markers()).unwrap();

        assert_eq!(
            table.column("model").unwrap().values[0],
            Value::from("3 Series, Touring")
        );
    }

    #[test]
    fn test_null_markers_and_empty_strings() {
        let csv = "a,b,c\nNULL,,\\N";
        let table = parse_str(csv, ',', &markers()).unwrap();

        assert_eq!(table.column("a").unwrap().values[0], Value::Null);
        assert_eq!(table.column("b").unwrap().values[0], Value::from(""));
        assert_eq!(table.column("c").unwrap().values[0], Value::Null);
    }

    #[test]
    fn test_short_rows_padded() {
        let table = parse_str("a,b,c\n1,2", ',', &markers()).unwrap();
        assert_eq!(table.column("c").unwrap().values[0], Value::Null);
    }

    #[test]
    fn test_empty_csv_error() {
        let result = parse_str("", ',', &markers());
        assert!(matches!(result, Err(SourceError::EmptyFile)));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
    }

    #[test]
    fn test_auto_parse() {
        let result = parse_bytes(b"name;age\nAlice;30\nBob;25", &CsvOptions::default()).unwrap();

        assert_eq!(result.delimiter, ';');
        assert_eq!(result.encoding, "utf-8");
        assert_eq!(result.table.row_count(), 2);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");

        // Bytes that are not valid UTF-8 still decode.
        let decoded = decode_content(&[0x41, 0xFF, 0x80], "latin1").unwrap();
        assert_eq!(decoded.chars().count(), 3);
        assert!(!decoded.contains('\u{fffd}'));
    }

    #[test]
    fn test_windows_1252_decoding() {
        let decoded = decode_content(&[0x80, 0x20, 0xE9], "cp1252").unwrap();
        assert_eq!(decoded, "€ é");
    }

    #[test]
    fn test_bom_stripped() {
        let decoded = decode_content("\u{feff}a,b".as_bytes(), "utf-8").unwrap();
        assert_eq!(decoded, "a,b");
    }
}
