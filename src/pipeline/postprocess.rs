//! Deterministic cleanup of model answers before they enter the report.
//!
//! The description and explanation are free prose dropped straight under a
//! Markdown heading, so the rules only fix artefacts that would disturb the
//! surrounding report structure:
//!
//! 1. Strip an outer code fence wrapping the whole answer
//! 2. Normalise line endings (CRLF → LF)
//! 3. Trim trailing whitespace per line
//! 4. Collapse runs of blank lines to a single blank line
//! 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 6. Trim leading and trailing blank space
//!
//! Content is never rewritten.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw model answer.
pub fn clean_response(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_outer_fence(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

/// Length of the longest run of consecutive backticks in `text`.
pub fn longest_backtick_run(text: &str) -> usize {
    RE_BACKTICKS
        .find_iter(text)
        .map(|m| m.as_str().len())
        .max()
        .unwrap_or(0)
}

// ── Rule 1: Strip outer code fence ───────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCE.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse blank lines ─────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 5: Invisible characters ─────────────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new("[\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}\u{00AD}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").to_string()
}

static RE_BACKTICKS: Lazy<Regex> = Lazy::new(|| Regex::new("`+").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wrapping_fence() {
        let input = "```markdown\nThe slide shows a diagram.\n```";
        assert_eq!(clean_response(input), "The slide shows a diagram.");
    }

    #[test]
    fn keeps_inner_fences() {
        let input = "Intro\n\n```rust\nfn main() {}\n```\n\nOutro";
        assert_eq!(clean_response(input), input);
    }

    #[test]
    fn normalises_whitespace() {
        let input = "\r\nLine one   \r\n\r\n\r\n\r\nLine two\t\n\n";
        assert_eq!(clean_response(input), "Line one\n\nLine two");
    }

    #[test]
    fn removes_invisible_chars() {
        let input = "\u{FEFF}Zero\u{200B}width";
        assert_eq!(clean_response(input), "Zerowidth");
    }

    #[test]
    fn backtick_runs() {
        assert_eq!(longest_backtick_run("plain text"), 0);
        assert_eq!(longest_backtick_run("use `x` here"), 1);
        assert_eq!(longest_backtick_run("```\ncode\n``` and ````"), 4);
    }
}
