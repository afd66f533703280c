/// Column names, in wire and file order. The scale firmware emits one
/// reading per line as `time_since_tare,raw,raw_weight,raw_error`.
pub const COLUMNS: [&str; 4] = ["time_since_tare", "raw", "raw_weight", "raw_error"];

/// One reading as received from the scale. Fields are kept as the raw text
/// tokens - no numeric parsing, the file gets exactly what the wire said.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub time_since_tare: String,
    pub raw: String,
    pub raw_weight: String,
    pub raw_error: String,
}

impl Record {
    /// Parse one line into a Record. This cannot fail: the line is trimmed
    /// and split on ',' with no quoting support, tokens past the fourth are
    /// dropped, and missing trailing tokens become empty strings. (A proper
    /// CSV parser would be overkill here - the firmware never quotes or
    /// escapes, it just joins four numbers with commas.)
    pub fn from_line(line: &str) -> Record {
        let mut tokens = line.trim().split(',');
        let mut next = || tokens.next().unwrap_or("").to_string();
        Record {
            time_since_tare: next(),
            raw: next(),
            raw_weight: next(),
            raw_error: next(),
        }
    }

    /// Field values in COLUMNS order.
    pub fn fields(&self) -> [&str; 4] {
        [
            &self.time_since_tare,
            &self.raw,
            &self.raw_weight,
            &self.raw_error,
        ]
    }

    /// The CSV row for this record, without a trailing newline. Values are
    /// written as-is; see from_line for why no quoting is needed.
    pub fn to_row(&self) -> String {
        self.fields().join(",")
    }
}
