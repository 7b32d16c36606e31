//! Delimited text parsing with encoding detection.
//!
//! Uploads arrive as raw bytes in whatever encoding the producer used. They
//! are decoded to UTF-8, then split into a header row and data rows with the
//! rule's delimiter. Cells are kept verbatim; the mapping engine decides what
//! to do with them.

use std::path::Path;

/// CSV parsing error with its line number.
#[derive(Debug, Clone)]
pub struct CsvError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for CsvError {}

impl CsvError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line() as usize).unwrap_or(0);
        CsvError::new(line, err.to_string())
    }
}

/// Parsed upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv {
    /// First row, verbatim.
    pub headers: Vec<String>,
    /// Remaining rows. Rows may be shorter or longer than the headers.
    pub rows: Vec<Vec<String>>,
    /// Encoding the bytes were decoded from.
    pub encoding: String,
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string. Unknown encodings fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        label => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(enc) if enc != encoding_rs::UTF_8 => enc.decode(bytes).0.into_owned(),
            _ => String::from_utf8_lossy(bytes).into_owned(),
        },
    };

    match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    }
}

/// Split decoded text into headers and rows.
///
/// Quoted cells may contain the delimiter and line breaks. Blank lines are
/// skipped. An input without a header row is an error.
pub fn parse_rows(content: &str, delimiter: char) -> Result<(Vec<String>, Vec<Vec<String>>), CsvError> {
    let delimiter_byte = u8::try_from(delimiter)
        .map_err(|_| CsvError::new(0, format!("Delimiter '{}' is not a single byte", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let headers: Vec<String> = match records.next() {
        Some(record) => record?.iter().map(str::to_string).collect(),
        None => return Err(CsvError::new(1, "Empty CSV file")),
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok((headers, rows))
}

/// Decode and parse raw upload bytes.
pub fn parse_bytes(bytes: &[u8], delimiter: char) -> Result<ParsedCsv, CsvError> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let (headers, rows) = parse_rows(&content, delimiter)?;

    Ok(ParsedCsv {
        headers,
        rows,
        encoding,
        delimiter,
    })
}

/// Read, decode and parse a file.
pub fn parse_file(path: impl AsRef<Path>, delimiter: char) -> Result<ParsedCsv, CsvError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| CsvError::new(0, format!("Cannot read file '{}': {}", path.display(), e)))?;
    parse_bytes(&bytes, delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semicolon_rows() {
        let (headers, rows) = parse_rows("id;name;email\n1;Alice;alice@x.com\n2;Bob;bob@x.com", ';').unwrap();

        assert_eq!(headers, vec!["id", "name", "email"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["1", "Alice", "alice@x.com"]);
    }

    #[test]
    fn test_delimiter_hint_is_honored() {
        let (headers, rows) = parse_rows("a,b;c\n1,2;3", ',').unwrap();
        assert_eq!(headers, vec!["a", "b;c"]);
        assert_eq!(rows[0], vec!["1", "2;3"]);
    }

    #[test]
    fn test_quoted_cells() {
        let csv = "name;note\n\"Doe; John\";\"line one\nline two\"";
        let (_, rows) = parse_rows(csv, ';').unwrap();

        assert_eq!(rows[0][0], "Doe; John");
        assert_eq!(rows[0][1], "line one\nline two");
    }

    #[test]
    fn test_ragged_rows_are_kept() {
        let (_, rows) = parse_rows("a;b;c\n1\n1;2;3;4", ';').unwrap();
        assert_eq!(rows[0], vec!["1"]);
        assert_eq!(rows[1].len(), 4);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let (_, rows) = parse_rows("a;b\n1;2\n\n3;4\n", ';').unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        let err = parse_rows("", ';').unwrap_err();
        assert!(err.message.contains("Empty"));
    }

    #[test]
    fn test_multibyte_delimiter_rejected() {
        assert!(parse_rows("a€b", '€').is_err());
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        assert_eq!(decode_content(bytes, "iso-8859-1"), "Société");
    }

    #[test]
    fn test_bom_is_stripped() {
        let parsed = parse_bytes("\u{feff}id;name\n1;Alice".as_bytes(), ';').unwrap();
        assert_eq!(parsed.headers[0], "id");
        assert_eq!(parsed.encoding, "utf-8");
    }

    #[test]
    fn test_error_message_format() {
        let err = parse_bytes(b"", ';').unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.to_string(), "Line 1: Empty CSV file");
    }
}
