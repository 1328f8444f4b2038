//! Indented SQL text builder.
//!
//! Statements that span multiple lines (CREATE TABLE bodies, the
//! dynamic default-constraint drop blocks) are assembled through this
//! builder so nesting stays readable without manual whitespace math.

/// Builds a single SQL statement line by line with indentation.
///
/// One builder produces one statement; construct a fresh instance per
/// statement rather than reusing across calls.
#[derive(Debug, Default)]
pub struct SqlBuilder {
    buffer: String,
    indent: usize,
}

impl SqlBuilder {
    /// Indentation unit.
    const INDENT: &'static str = "    ";

    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line at the current indentation level.
    pub fn push_line(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.buffer.push_str(Self::INDENT);
        }
        self.buffer.push_str(line);
        self.buffer.push('\n');
    }

    /// Increases the indentation level.
    pub fn indent(&mut self) {
        self.indent += 1;
    }

    /// Decreases the indentation level.
    pub fn unindent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Returns the accumulated text without the trailing newline.
    #[must_use]
    pub fn finish(mut self) -> String {
        if self.buffer.ends_with('\n') {
            self.buffer.pop();
        }
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_indented_block() {
        let mut b = SqlBuilder::new();
        b.push_line("CREATE TABLE \"t\" (");
        b.indent();
        b.push_line("\"id\" int,");
        b.push_line("\"name\" text");
        b.unindent();
        b.push_line(")");

        assert_eq!(
            b.finish(),
            "CREATE TABLE \"t\" (\n    \"id\" int,\n    \"name\" text\n)"
        );
    }

    #[test]
    fn unindent_saturates_at_zero() {
        let mut b = SqlBuilder::new();
        b.unindent();
        b.push_line("x");
        assert_eq!(b.finish(), "x");
    }
}
