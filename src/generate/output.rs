/// Output buffer that accumulates generated code line by line
pub struct Output {
    lines: Vec<String>,
    current_line: String,
    indent_width: usize,
}

impl Output {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            current_line: String::new(),
            indent_width: 4,
        }
    }

    /// Add text to the current line
    pub fn push(&mut self, text: &str) {
        self.current_line.push_str(text);
    }

    /// Add a newline
    pub fn newline(&mut self) {
        self.current_line.push('\n');
        self.lines.push(std::mem::take(&mut self.current_line));
    }

    /// Indent the current line
    pub fn indent(&mut self, level: usize) {
        self.current_line.push_str(&" ".repeat(level * self.indent_width));
    }

    /// Write one complete, indented line
    pub fn line(&mut self, level: usize, text: &str) {
        if !text.is_empty() {
            self.indent(level);
            self.push(text);
        }
        self.newline();
    }

    /// Write a block of text, indenting every non-empty line
    pub fn lines(&mut self, level: usize, text: &str) {
        for line in text.lines() {
            self.line(level, line);
        }
    }

    /// Finish and return the generated code
    pub fn finish(mut self) -> String {
        // Push final line if not empty (no trailing newline for last line)
        if !self.current_line.is_empty() {
            self.lines.push(std::mem::take(&mut self.current_line));
        }

        self.lines.join("")
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_indented() {
        let mut output = Output::new();
        output.line(0, "function() {");
        output.lines(1, "a();\n\nb();");
        output.push("}");
        assert_eq!(output.finish(), "function() {\n    a();\n\n    b();\n}");
    }
}
