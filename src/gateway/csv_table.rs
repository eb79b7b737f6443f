use crate::error::Result;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// One data row: its line number in the file and either its cells or why it could not be read.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub line: u64,
    pub cells: std::result::Result<Vec<String>, String>,
}

/// An uploaded table read as strings. No type inference happens here.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let header: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let fallback_line = idx as u64 + 2;
            let row = match record {
                Ok(record) => RawRow {
                    line: record.position().map(|p| p.line()).unwrap_or(fallback_line),
                    cells: Ok(record.iter().map(|c| c.to_string()).collect()),
                },
                Err(e) => RawRow {
                    line: e.position().map(|p| p.line()).unwrap_or(fallback_line),
                    cells: Err(e.to_string()),
                },
            };
            rows.push(row);
        }

        Ok(Self { header, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}
