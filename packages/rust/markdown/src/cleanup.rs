//! Section-body cleanup passes.
//!
//! Each pass is a function `&str -> String` applied in sequence. The pipeline
//! prepares a document body for embedding under its own `# Title` heading in
//! the consolidated artifact.

use std::sync::LazyLock;

use regex::Regex;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)(?:\s+#+)?\s*$").expect("valid regex"));

/// Run the cleanup pipeline on a document body.
pub(crate) fn run_pipeline(body: &str, title: &str) -> String {
    let mut result = body.replace("\r\n", "\n");

    result = strip_title_heading(&result, title);
    result = demote_headings(&result);
    result = clean_blank_lines(&result);
    result = normalize_whitespace(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Drop the heading that repeats the title
// ---------------------------------------------------------------------------

/// Remove a leading H1 equal to `title`; the assembler emits its own.
fn strip_title_heading(md: &str, title: &str) -> String {
    let trimmed = md.trim_start_matches('\n');
    let (first, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
    match HEADING_RE.captures(first) {
        Some(caps) if &caps[1] == "#" && caps[2].trim() == title.trim() => rest.to_string(),
        _ => md.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Pass 2: Demote headings one level
// ---------------------------------------------------------------------------

/// Shift every heading down one level (H6 stays H6). Fenced code is untouched.
fn demote_headings(md: &str) -> String {
    let mut in_fence = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.to_string();
            }
            if in_fence {
                return line.to_string();
            }
            match HEADING_RE.captures(line) {
                Some(caps) => {
                    let level = (caps[1].len() + 1).min(6);
                    format!("{} {}", "#".repeat(level), &caps[2])
                }
                None => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Collapse blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 3+ blank lines into exactly 2.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Trailing whitespace
// ---------------------------------------------------------------------------

fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim_start_matches('\n')
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Trailing newline
// ---------------------------------------------------------------------------

/// Ensure the text ends with exactly one newline (empty text stays empty).
pub(crate) fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{trimmed}\n")
}

/// First H1 heading text, if any.
pub(crate) fn first_h1(md: &str) -> Option<String> {
    let mut in_fence = false;
    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(caps) = HEADING_RE.captures(line) {
            if &caps[1] == "#" {
                return Some(caps[2].trim().to_string());
            }
        }
    }
    None
}
