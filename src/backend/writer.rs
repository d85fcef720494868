//! PHP source writer with indentation tracking
//!
//! Generated mocks and harness files are built line by line through [`PhpWriter`], which keeps
//! indentation consistent so that generated code stays readable when a harness is inspected in the
//! cache directory.

/// Brace placement for [`PhpWriter::block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BraceStyle {
    /// `namespace App {`
    SameLine,
    /// Class and method bodies: the brace gets its own line.
    NextLine,
}

/// Writer that tracks indentation and builds PHP source
#[derive(Debug)]
pub struct PhpWriter {
    output: String,
    indent_level: usize,
    indent_width: usize,
    at_line_start: bool,
}

impl Default for PhpWriter {
    fn default() -> Self {
        Self::new(4)
    }
}

impl PhpWriter {
    pub fn new(indent_width: usize) -> Self {
        Self {
            output: String::new(),
            indent_level: 0,
            indent_width,
            at_line_start: true,
        }
    }

    /// Get the generated source
    pub fn finish(self) -> String {
        self.output
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    pub fn current_indent(&self) -> usize {
        self.indent_level
    }

    fn write_indent(&mut self) {
        if self.at_line_start {
            self.output
                .push_str(&" ".repeat(self.indent_level * self.indent_width));
            self.at_line_start = false;
        }
    }

    /// Write a string (with auto-indent)
    pub fn write(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        self.write_indent();
        self.output.push_str(s);
    }

    /// Write a string and newline
    pub fn writeln(&mut self, s: &str) {
        self.write(s);
        self.newline();
    }

    pub fn newline(&mut self) {
        self.output.push('\n');
        self.at_line_start = true;
    }

    /// Write `count` empty lines.
    pub fn blank_lines(&mut self, count: usize) {
        for _ in 0..count {
            self.newline();
        }
    }

    /// Write pre-rendered multi-line text, re-indenting every non-empty line.
    ///
    /// Blank lines stay empty so no trailing whitespace is produced.
    pub fn write_lines(&mut self, text: &str) {
        for line in text.lines() {
            if line.trim().is_empty() {
                self.newline();
            } else {
                self.writeln(line);
            }
        }
    }

    /// Write `header`, a braced body produced by `body`, and the closing brace.
    pub fn block<F>(&mut self, header: &str, style: BraceStyle, body: F)
    where
        F: FnOnce(&mut Self),
    {
        match style {
            BraceStyle::SameLine => self.writeln(&format!("{header} {{")),
            BraceStyle::NextLine => {
                self.writeln(header);
                self.writeln("{");
            }
        }
        self.indent();
        body(self);
        self.dedent();
        self.writeln("}");
    }
}

/// Render `value` as a single-quoted PHP string literal.
pub fn php_string(value: &str) -> String {
    let mut literal = String::with_capacity(value.len() + 2);
    literal.push('\'');
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            literal.push('\\');
        }
        literal.push(c);
    }
    literal.push('\'');
    literal
}
