//! Cleanup of the model's assessment before it is returned or written.
//!
//! Each rule is a pure `&str -> String` pass; [`clean_markdown`] runs them in
//! a fixed order. Line endings are normalised before any line-based rule, and
//! outer fences are stripped before heading detection.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to a raw model response.
///
/// 1. Strip an outer ```` ```markdown ```` fence
/// 2. Normalise CRLF / CR to LF
/// 3. Drop an echoed `ANSWER:` label on the first line
/// 4. Trim trailing whitespace per line
/// 5. Collapse runs of blank lines
/// 6. Blank line before every heading
/// 7. Insert a missing separator row under a table header
/// 8. Remove zero-width and other invisible characters
/// 9. End with exactly one newline
pub fn clean_markdown(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = strip_answer_label(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = space_headings(&s);
    let s = repair_table_headers(&s);
    let s = remove_invisible_chars(&s);
    final_newline(&s)
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*)\r?\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

static RE_ANSWER_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\*\*)?ANSWER:(?:\*\*)?[ \t]*\n?").unwrap());

fn strip_answer_label(input: &str) -> String {
    RE_ANSWER_LABEL.replace(input, "").to_string()
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").to_string()
}

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

fn space_headings(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 32);
    for (i, line) in input.lines().enumerate() {
        if i > 0 && is_heading(line) {
            let kept = out.trim_end_matches('\n').len();
            out.truncate(kept);
            out.push_str("\n\n");
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn repair_table_headers(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);
    let mut in_table = false;

    for (i, line) in lines.iter().enumerate() {
        out.push((*line).to_string());
        if !is_table_row(line) {
            in_table = false;
            continue;
        }
        let header = !in_table && !is_separator_row(line);
        in_table = true;
        if header {
            let next = lines.get(i + 1).copied().unwrap_or("");
            if is_table_row(next) && !is_separator_row(next) {
                let cols = line.trim().matches('|').count().saturating_sub(1).max(1);
                out.push(format!("|{}", " --- |".repeat(cols)));
            }
        }
    }
    out.join("\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'],
        "",
    )
}

fn final_newline(input: &str) -> String {
    let body = input.trim_end();
    if body.is_empty() {
        String::from("\n")
    } else {
        format!("{body}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence() {
        let raw = "```markdown\n# Acme\n\nRobots.\n```";
        assert_eq!(clean_markdown(raw), "# Acme\n\nRobots.\n");
    }

    #[test]
    fn inner_code_blocks_survive() {
        let raw = "# Model\n\n```\nARR = MRR * 12\n```\n";
        assert!(clean_markdown(raw).contains("```\nARR = MRR * 12\n```"));
    }

    #[test]
    fn drops_echoed_answer_label() {
        assert_eq!(clean_markdown("ANSWER:\n# Team\n"), "# Team\n");
        assert_eq!(clean_markdown("**ANSWER:** # Team"), "# Team\n");
        assert!(clean_markdown("# Summary\nANSWER: yes").contains("ANSWER: yes"));
    }

    #[test]
    fn crlf_and_trailing_spaces() {
        assert_eq!(clean_markdown("# A  \r\nline   \r\n"), "# A\nline\n");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(clean_markdown("a\n\n\n\n\nb"), "a\n\nb\n");
    }

    #[test]
    fn headings_get_a_blank_line_before() {
        let out = clean_markdown("# Acme\nIntro\n## Team\n- Jane: CEO");
        assert_eq!(out, "# Acme\nIntro\n\n## Team\n- Jane: CEO\n");
    }

    #[test]
    fn hashtag_text_is_not_a_heading() {
        let out = clean_markdown("Intro\n#hashtag");
        assert_eq!(out, "Intro\n#hashtag\n");
    }

    #[test]
    fn missing_table_separator_is_inserted() {
        let out = clean_markdown("| Metric | Value |\n| ARR | $1M |");
        assert_eq!(out, "| Metric | Value |\n| --- | --- |\n| ARR | $1M |\n");
    }

    #[test]
    fn well_formed_table_is_untouched() {
        let table = "| Metric | Value |\n|---|---|\n| ARR | $1M |\n| Users | 40k |\n";
        assert_eq!(clean_markdown(table), table);
    }

    #[test]
    fn invisible_characters_removed() {
        assert_eq!(clean_markdown("\u{FEFF}Mar\u{200B}ket"), "Market\n");
    }

    #[test]
    fn empty_input_is_single_newline() {
        assert_eq!(clean_markdown("   \n\n"), "\n");
    }
}
