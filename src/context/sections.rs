//! Declaration-based section extraction and one-line file summaries

use super::models::{CodeSection, SectionKind};
use once_cell::sync::Lazy;
use regex::Regex;

const VISIBILITY: &str = r"(?:pub(?:\([^)]*\))?\s+)?";

static FUNCTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*(?:(?:export\s+)?(?:default\s+)?(?:async\s+)?function\b|(?:async\s+)?def\s+\w+|{VISIBILITY}(?:async\s+)?fn\s+\w+|func\s+)"
    ))
    .expect("invalid regex")
});

static CLASS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*(?:(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+\w+|{VISIBILITY}(?:struct|impl)\b)"
    ))
    .expect("invalid regex")
});

static INTERFACE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*(?:(?:export\s+)?interface\s+\w+|{VISIBILITY}trait\s+\w+)"
    ))
    .expect("invalid regex")
});

static TYPE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*(?:(?:export\s+)?(?:declare\s+)?(?:type|enum)\s+\w+|{VISIBILITY}enum\s+\w+)"
    ))
    .expect("invalid regex")
});

static VARIABLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+\w+").expect("invalid regex")
});

static EXPORT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*export\b").expect("invalid regex"));

static IMPORT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:import\b|from\s+\S+\s+import\b|use\s+\w|require\()").expect("invalid regex")
});

const FALLBACK_SUMMARY: &str = "No summary available";
const SUMMARY_MAX_CHARS: usize = 50;

/// Classify a line as a section-opening declaration
pub fn classify_line(line: &str) -> Option<SectionKind> {
    if FUNCTION_PATTERN.is_match(line) {
        Some(SectionKind::Function)
    } else if CLASS_PATTERN.is_match(line) {
        Some(SectionKind::Class)
    } else if INTERFACE_PATTERN.is_match(line) {
        Some(SectionKind::Interface)
    } else if TYPE_PATTERN.is_match(line) {
        Some(SectionKind::Type)
    } else if VARIABLE_PATTERN.is_match(line) {
        Some(SectionKind::Variable)
    } else if EXPORT_PATTERN.is_match(line) {
        Some(SectionKind::Export)
    } else if IMPORT_PATTERN.is_match(line) {
        Some(SectionKind::Import)
    } else {
        None
    }
}

/// Splits file content into declaration sections and keeps the best-scoring ones
#[derive(Debug, Clone)]
pub struct SectionExtractor {
    max_sections: usize,
}

impl Default for SectionExtractor {
    fn default() -> Self {
        Self::new(5)
    }
}

impl SectionExtractor {
    pub fn new(max_sections: usize) -> Self {
        Self { max_sections }
    }

    /// Sections ordered by descending relevance, at most `max_sections`
    pub fn extract(&self, content: &str, query: &str, focus_area: Option<&str>) -> Vec<CodeSection> {
        let keywords = keywords(query, focus_area);
        let lines: Vec<&str> = content.lines().collect();

        let mut sections = Vec::new();
        let mut open: Option<(usize, SectionKind)> = None;

        for (idx, line) in lines.iter().enumerate() {
            let Some(kind) = classify_line(line) else {
                continue;
            };
            if let Some((start, open_kind)) = open.take() {
                // previous section ends on the line before this declaration
                sections.push(build_section(&lines, start, idx, open_kind, &keywords));
            }
            open = Some((idx + 1, kind));
        }

        if let Some((start, kind)) = open {
            sections.push(build_section(&lines, start, lines.len(), kind, &keywords));
        }

        sections.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
        sections.truncate(self.max_sections);
        sections
    }
}

fn keywords(query: &str, focus_area: Option<&str>) -> Vec<String> {
    let mut keywords: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    if let Some(focus) = focus_area.map(|f| f.trim().to_lowercase()) {
        if !focus.is_empty() {
            keywords.push(focus);
        }
    }

    keywords
}

fn build_section(
    lines: &[&str],
    start_line: usize,
    end_line: usize,
    kind: SectionKind,
    keywords: &[String],
) -> CodeSection {
    let content = lines[start_line - 1..end_line].join("\n");
    let lowered = content.to_lowercase();
    let relevance_score = keywords
        .iter()
        .map(|k| lowered.matches(k.as_str()).count() as u32)
        .sum();

    CodeSection {
        start_line,
        end_line,
        content,
        kind,
        relevance_score,
    }
}

/// One-line description of a file: its first export, else its first
/// non-comment non-import line, else a fixed fallback
pub fn summarize(content: &str) -> String {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let chosen = lines
        .iter()
        .find(|l| EXPORT_PATTERN.is_match(l))
        .or_else(|| {
            lines
                .iter()
                .find(|l| !is_comment(l) && !IMPORT_PATTERN.is_match(l))
        });

    match chosen {
        Some(line) => truncate(line, SUMMARY_MAX_CHARS),
        None => FALLBACK_SUMMARY.to_string(),
    }
}

fn is_comment(line: &str) -> bool {
    ["//", "#", "/*", "*", "--", "\"\"\""]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

fn truncate(line: &str, max_chars: usize) -> String {
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let kept: String = line.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
import { db } from './db';
import cache from './cache';

export interface User {
  id: string;
}

export async function loadUser(id: string) {
  return db.users.find(id);
}

const cacheTtl = 60;

class UserCache {
  get(id) { return cache.get(id); }
}
";

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("export default async function x() {"), Some(SectionKind::Function));
        assert_eq!(classify_line("pub(crate) fn run() {"), Some(SectionKind::Function));
        assert_eq!(classify_line("def handler(event):"), Some(SectionKind::Function));
        assert_eq!(classify_line("pub struct Config {"), Some(SectionKind::Class));
        assert_eq!(classify_line("export interface Props {"), Some(SectionKind::Interface));
        assert_eq!(classify_line("export type Id = string;"), Some(SectionKind::Type));
        assert_eq!(classify_line("  let count = 0;"), Some(SectionKind::Variable));
        assert_eq!(classify_line("export { a, b };"), Some(SectionKind::Export));
        assert_eq!(classify_line("use std::fmt;"), Some(SectionKind::Import));
        assert_eq!(classify_line("return implementation;"), None);
    }

    #[test]
    fn test_sections_cover_declarations() {
        let extractor = SectionExtractor::new(10);
        let mut sections = extractor.extract(SAMPLE, "user", None);
        sections.sort_by_key(|s| s.start_line);

        let spans: Vec<(usize, usize, SectionKind)> =
            sections.iter().map(|s| (s.start_line, s.end_line, s.kind)).collect();
        assert_eq!(
            spans,
            vec![
                (1, 1, SectionKind::Import),
                (2, 3, SectionKind::Import),
                (4, 7, SectionKind::Interface),
                (8, 11, SectionKind::Function),
                (12, 13, SectionKind::Variable),
                (14, 16, SectionKind::Class),
            ]
        );
    }

    #[test]
    fn test_sections_ranked_and_capped() {
        let extractor = SectionExtractor::new(2);
        let sections = extractor.extract(SAMPLE, "user id", Some("cache"));
        assert_eq!(sections.len(), 2);
        assert!(sections[0].relevance_score >= sections[1].relevance_score);
        // UserCache class: "user" x1, "id" x2, "cache" x2
        assert_eq!(sections[0].kind, SectionKind::Class);
        assert_eq!(sections[0].relevance_score, 5);
        assert_eq!(sections[1].kind, SectionKind::Function);
    }

    #[test]
    fn test_summary_prefers_export() {
        assert_eq!(summarize(SAMPLE), "export interface User {");
    }

    #[test]
    fn test_summary_fallbacks() {
        assert_eq!(summarize("// comment\nimport x from 'y';\nrun();"), "run();");
        assert_eq!(summarize("// only a comment\n"), FALLBACK_SUMMARY);

        let long = format!("export const value = \"{}\";", "x".repeat(80));
        let summary = summarize(&long);
        assert_eq!(summary.chars().count(), 50);
        assert!(summary.ends_with("..."));
    }
}
