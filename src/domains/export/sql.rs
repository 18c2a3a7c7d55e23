//! SQLite text helpers. Every identifier and literal that reaches a
//! statement goes through `quote_ident` or `quote_literal`.

use super::schema::StoreSchema;

/// `"name"` with embedded quotes doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `'value'` with embedded quotes doubled.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `"table"."column"`
pub fn qualified(table: &str, column: &str) -> String {
    format!("{}.{}", quote_ident(table), quote_ident(column))
}

/// Parse the longest numeric prefix of `raw`, yielding 0.0 when there is none.
/// `"3.5kg"` is 3.5, `"abc"` is 0.0.
pub fn parse_float_prefix(raw: &str) -> f64 {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if digits > 0 || frac_end > frac_start {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }

    if digits == 0 {
        return 0.0;
    }

    // exponent only counts when digits follow it
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().unwrap_or(0.0)
}

/// Render a float as a SQLite REAL literal (`3` becomes `3.0`).
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "0.0".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "9e999" } else { "-9e999" }.to_string()
    } else {
        format!("{:?}", value)
    }
}

/// Backing tables for one job. Both names share one random suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTables {
    pub scratch: String,
    pub result: String,
}

impl JobTables {
    pub const SUFFIX_LEN: usize = 7;

    pub fn generate(schema: &StoreSchema) -> Self {
        let bytes: [u8; 4] = rand::random();
        let suffix = &hex::encode(bytes)[..Self::SUFFIX_LEN];
        Self::with_suffix(schema, suffix)
    }

    pub fn with_suffix(schema: &StoreSchema, suffix: &str) -> Self {
        Self {
            scratch: schema.table(&format!("csvexport_scratch_{}", suffix)),
            result: schema.table(&format!("csvexport_results_{}", suffix)),
        }
    }
}
