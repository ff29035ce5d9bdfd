//! Source map builder.
//!
//! Accumulates generated-position → original-position mappings and encodes
//! them as a standard v3 table: one `;`-separated group per generated line,
//! each segment a run of base64 VLQ deltas.

use serde::Serialize;

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// A finished source map, serializable as v3 JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingTable {
    pub version: u32,
    pub file: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl MappingTable {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Builds the `mappings` string for a single source file.
///
/// Mappings must be added in generated order: lines never go backwards and
/// columns only grow within a line.
#[derive(Debug, Clone)]
pub struct SourceMapBuilder {
    /// The generated file the map describes.
    file: String,
    source_name: String,
    source: String,
    lines: Vec<String>,
    last_generated_column: i64,
    last_original_line: i64,
    last_original_column: i64,
}

impl SourceMapBuilder {
    pub fn new(
        file: impl Into<String>,
        source_name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            source_name: source_name.into(),
            source: source.into(),
            lines: vec![String::new()],
            last_generated_column: 0,
            last_original_line: 0,
            last_original_column: 0,
        }
    }

    /// Record one mapping. All positions are 0-based.
    pub fn add_mapping(
        &mut self,
        generated_line: u32,
        generated_column: u32,
        original_line: u32,
        original_column: u32,
    ) {
        let generated_line = generated_line as usize;
        while self.lines.len() <= generated_line {
            self.lines.push(String::new());
            self.last_generated_column = 0;
        }

        let mut segment = String::new();
        encode_vlq(generated_column as i64 - self.last_generated_column, &mut segment);
        // Single source, always index 0.
        encode_vlq(0, &mut segment);
        encode_vlq(original_line as i64 - self.last_original_line, &mut segment);
        encode_vlq(original_column as i64 - self.last_original_column, &mut segment);

        self.last_generated_column = generated_column as i64;
        self.last_original_line = original_line as i64;
        self.last_original_column = original_column as i64;

        let line = &mut self.lines[generated_line];
        if !line.is_empty() {
            line.push(',');
        }
        line.push_str(&segment);
    }

    pub fn to_table(&self) -> MappingTable {
        MappingTable {
            version: 3,
            file: self.file.clone(),
            sources: vec![self.source_name.clone()],
            sources_content: vec![self.source.clone()],
            names: Vec::new(),
            mappings: self.lines.join(";"),
        }
    }
}

/// Name of the JavaScript file generated from `source_name`: `app.owt` is `app.js`.
pub fn output_file_name(source_name: &str) -> String {
    let stem = std::path::Path::new(source_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| source_name.to_string());
    format!("{stem}.js")
}

/// Append the base64 VLQ encoding of `value`.
pub fn encode_vlq(value: i64, out: &mut String) {
    let mut v = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (v & 31) as usize;
        v >>= 5;
        if v > 0 {
            digit |= 32;
        }
        out.push(BASE64[digit] as char);
        if v == 0 {
            break;
        }
    }
}

/// Decode a `mappings` string into absolute
/// `[generated_column, source, original_line, original_column]` segments per line.
#[cfg(test)]
pub(crate) fn decode_mappings(mappings: &str) -> Vec<Vec<[i64; 4]>> {
    let mut lines = Vec::new();
    let (mut source, mut orig_line, mut orig_col) = (0i64, 0i64, 0i64);

    for line in mappings.split(';') {
        let mut gen_col = 0i64;
        let mut segments = Vec::new();
        for segment in line.split(',').filter(|s| !s.is_empty()) {
            let values = decode_segment(segment);
            gen_col += values[0];
            source += values[1];
            orig_line += values[2];
            orig_col += values[3];
            segments.push([gen_col, source, orig_line, orig_col]);
        }
        lines.push(segments);
    }
    lines
}

#[cfg(test)]
fn decode_segment(segment: &str) -> Vec<i64> {
    let mut values = Vec::new();
    let (mut value, mut shift) = (0i64, 0);
    for c in segment.bytes() {
        let digit = BASE64.iter().position(|&b| b == c).expect("invalid base64") as i64;
        value += (digit & 31) << shift;
        if digit & 32 != 0 {
            shift += 5;
        } else {
            let negative = value & 1 == 1;
            value >>= 1;
            values.push(if negative { -value } else { value });
            value = 0;
            shift = 0;
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vlq(value: i64) -> String {
        let mut s = String::new();
        encode_vlq(value, &mut s);
        s
    }

    #[test]
    fn test_vlq_small_values() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
    }

    #[test]
    fn test_vlq_continuation() {
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(-16), "hB");
        assert_eq!(vlq(1000), "w+B");
    }

    #[test]
    fn test_first_mapping() {
        let mut b = SourceMapBuilder::new("a.js", "a.owt", "src");
        b.add_mapping(0, 0, 0, 0);
        assert_eq!(b.to_table().mappings, "AAAA");
    }

    #[test]
    fn test_deltas_across_lines() {
        let mut b = SourceMapBuilder::new("a.js", "a.owt", "");
        b.add_mapping(0, 2, 1, 4);
        b.add_mapping(0, 10, 1, 8);
        b.add_mapping(2, 4, 3, 0);
        let table = b.to_table();
        assert_eq!(table.mappings, "EACI,QAAI;;IAEP");
        assert_eq!(
            decode_mappings(&table.mappings),
            vec![
                vec![[2, 0, 1, 4], [10, 0, 1, 8]],
                vec![],
                vec![[4, 0, 3, 0]],
            ]
        );
    }

    #[test]
    fn test_table_json() {
        let mut b = SourceMapBuilder::new("app.js", "app.owt", "component A() {}");
        b.add_mapping(1, 0, 0, 0);
        let json: serde_json::Value =
            serde_json::from_str(&b.to_table().to_json().unwrap()).unwrap();
        assert_eq!(json["version"], 3);
        assert_eq!(json["file"], "app.js");
        assert_eq!(json["sources"][0], "app.owt");
        assert_eq!(json["sourcesContent"][0], "component A() {}");
        assert_eq!(json["mappings"], ";AAAA");
        assert!(json["names"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("app.owt"), "app.js");
        assert_eq!(output_file_name("src/ui/Counter.owt"), "Counter.js");
        assert_eq!(output_file_name("Counter"), "Counter.js");
    }
}
