//! Line metrics for the quality phase.

use crate::domain::extraction::FileMetrics;
use crate::domain::language::Language;

const TODO_MARKERS: &[&str] = &["TODO", "FIXME", "XXX", "HACK"];
const TAB_WIDTH: usize = 4;
const INDENT_UNIT: usize = 4;

pub fn measure(text: &str, language: Language) -> FileMetrics {
    let mut metrics = FileMetrics::default();
    let prefixes = language.comment_prefixes();

    for line in text.lines() {
        metrics.total_lines += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            metrics.blank_lines += 1;
            continue;
        }
        if TODO_MARKERS.iter().any(|m| trimmed.contains(m)) {
            metrics.todo_markers += 1;
        }
        if prefixes.iter().any(|p| trimmed.starts_with(p)) {
            metrics.comment_lines += 1;
            continue;
        }
        metrics.code_lines += 1;
        metrics.max_indent_depth = metrics.max_indent_depth.max(indent_width(line) / INDENT_UNIT);
    }
    metrics
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_python_lines() {
        let source = "# header\n\ndef f():\n    if x:\n        return 1  # TODO tidy\n";
        let m = measure(source, Language::Python);
        assert_eq!(m.total_lines, 5);
        assert_eq!(m.blank_lines, 1);
        assert_eq!(m.comment_lines, 1);
        assert_eq!(m.code_lines, 3);
        assert_eq!(m.todo_markers, 1);
        assert_eq!(m.max_indent_depth, 2);
    }

    #[test]
    fn test_tabs_count_as_one_level() {
        let m = measure("class A {\n\tint x;\n}\n", Language::Java);
        assert_eq!(m.max_indent_depth, 1);
    }
}
