//! Minimal CSV encoding and parsing
//!
//! The toolkit's at-rest artifacts (code extracts, the mapping ledger,
//! deletion reports) are small fixed-schema CSV files. This module implements
//! just enough of RFC 4180 for those schemas: comma separation, double-quote
//! quoting, and escaped quotes. Fields containing commas, quotes, or newlines
//! are quoted on write.

/// Encode a single CSV row, quoting fields where required.
pub fn encode_row(fields: &[&str]) -> String {
    let mut out = String::new();

    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }

        if field.contains(',') || field.contains('"') || field.contains('\n') {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }

    out.push('\n');
    out
}

/// Parse a CSV document into rows of fields.
///
/// Handles quoted fields, escaped quotes (`""`), and newlines inside quoted
/// fields. A UTF-8 BOM at the start of the document is stripped, since
/// spreadsheet exports commonly carry one. Empty trailing lines are ignored.
pub fn parse_document(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => {
                row.push(std::mem::take(&mut field));
            }
            '\r' => {
                // Swallowed here; the following '\n' terminates the row.
            }
            '\n' => {
                row.push(std::mem::take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(std::mem::take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(c),
        }
    }

    // A final row without a trailing newline.
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}
