//! Line-oriented output buffer.
//!
//! Every byte of generated code goes through [`Emitter`], which tracks the
//! current generated line and records a source mapping whenever the caller
//! knows where a statement came from.

use owt_lexer::Position;

use crate::sourcemap::{output_file_name, MappingTable, SourceMapBuilder};

const INDENT: &str = "  ";

pub struct Emitter {
    out: String,
    line: u32,
    indent: usize,
    map: SourceMapBuilder,
}

impl Emitter {
    /// `file` is the source file name; the map describes its `.js` output.
    pub fn new(file: &str, source: &str) -> Self {
        Self {
            out: String::new(),
            line: 0,
            indent: 0,
            map: SourceMapBuilder::new(output_file_name(file), file, source),
        }
    }

    /// Emit one statement with no original position.
    pub fn line(&mut self, text: &str) {
        self.write_line(text, None);
    }

    /// Emit one statement that originates at `pos`.
    pub fn line_at(&mut self, text: &str, pos: Position) {
        self.write_line(text, Some(original(pos)));
    }

    /// Emit `text` and indent what follows.
    pub fn open(&mut self, text: &str) {
        self.line(text);
        self.indent += 1;
    }

    pub fn open_at(&mut self, text: &str, pos: Position) {
        self.line_at(text, pos);
        self.indent += 1;
    }

    /// Dedent, then emit `text`.
    pub fn close(&mut self, text: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(text);
    }

    /// `} else {` and friends: dedent for one line, then indent again.
    pub fn reopen(&mut self, text: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(text);
        self.indent += 1;
    }

    pub fn reopen_at(&mut self, text: &str, pos: Position) {
        self.indent = self.indent.saturating_sub(1);
        self.line_at(text, pos);
        self.indent += 1;
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
        self.line += 1;
    }

    /// Emit user code that may span several lines, starting at `pos`.
    ///
    /// Continuation lines keep their indentation relative to each other and
    /// each maps back to its own original line.
    pub fn block_at(&mut self, code: &str, pos: Position) {
        let lines: Vec<&str> = code.lines().collect();
        let common = lines
            .iter()
            .skip(1)
            .filter(|l| !l.trim().is_empty())
            .map(|l| leading_width(l))
            .min()
            .unwrap_or(0);

        let (line0, column0) = original(pos);
        for (i, text) in lines.iter().enumerate() {
            if text.trim().is_empty() {
                continue;
            }
            if i == 0 {
                self.write_line(text.trim(), Some((line0, column0)));
            } else {
                let width = leading_width(text);
                let rest: String = text.chars().skip(common).collect();
                let at = (line0 + i as u32, width as u32);
                self.write_line(rest.trim_end(), Some(at));
            }
        }
    }

    /// Consume the buffer, returning the code and its source map.
    pub fn finish(self) -> (String, MappingTable) {
        (self.out, self.map.to_table())
    }

    fn write_line(&mut self, text: &str, origin: Option<(u32, u32)>) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
        if let Some((line, column)) = origin {
            let lead = leading_width(text);
            let column_out = (self.indent * INDENT.len() + lead) as u32;
            self.map.add_mapping(self.line, column_out, line, column);
        }
        self.out.push_str(text);
        self.out.push('\n');
        self.line += 1 + text.matches('\n').count() as u32;
    }
}

/// 0-based (line, column) of a 1-based lexer position.
fn original(pos: Position) -> (u32, u32) {
    (
        pos.line.saturating_sub(1) as u32,
        pos.column.saturating_sub(1) as u32,
    )
}

fn leading_width(text: &str) -> usize {
    text.chars().take_while(|c| c.is_whitespace()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sourcemap::decode_mappings;
    use pretty_assertions::assert_eq;

    fn at(line: usize, column: usize) -> Position {
        Position::new(0, line, column)
    }

    #[test]
    fn test_indentation() {
        let mut e = Emitter::new("a.owt", "");
        e.open("function f() {");
        e.line("return 1;");
        e.close("}");
        let (code, _) = e.finish();
        assert_eq!(code, "function f() {\n  return 1;\n}\n");
    }

    #[test]
    fn test_line_at_maps_first_column() {
        let mut e = Emitter::new("a.owt", "");
        e.line("// header");
        e.open("{");
        e.line_at("x();", at(3, 5));
        e.close("}");
        let (_, map) = e.finish();
        let decoded = decode_mappings(&map.mappings);
        assert_eq!(decoded[0], Vec::<[i64; 4]>::new());
        assert_eq!(decoded[2], vec![[2, 0, 2, 4]]);
    }

    #[test]
    fn test_block_at_dedents_and_maps_each_line() {
        let mut e = Emitter::new("a.owt", "");
        e.open("function f() {");
        e.block_at("a();\n        if (x) {\n          b();\n        }", at(4, 9));
        e.close("}");
        let (code, map) = e.finish();
        assert_eq!(
            code,
            "function f() {\n  a();\n  if (x) {\n    b();\n  }\n}\n"
        );
        let decoded = decode_mappings(&map.mappings);
        assert_eq!(decoded[1], vec![[2, 0, 3, 8]]);
        assert_eq!(decoded[2], vec![[2, 0, 4, 8]]);
        assert_eq!(decoded[3], vec![[4, 0, 5, 10]]);
    }

    #[test]
    fn test_blank_lines_advance_mapping_line() {
        let mut e = Emitter::new("a.owt", "");
        e.blank();
        e.blank();
        e.line_at("x;", at(1, 1));
        let (_, map) = e.finish();
        assert_eq!(map.mappings, ";;AAAA");
    }
}
