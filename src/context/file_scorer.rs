//! Additive relevance scoring of project files
//!
//! Points, never normalized:
//! - extension class: ts/tsx/js/jsx +10, py/go/rs/java +8, json/yaml/yml +3, md/txt +2
//! - well-known base name (index, main, app, server, config, types, interfaces) +15
//! - path segments: /src/ +5, /lib/ +4, /components/ +6, /utils/ or /helpers/ +7,
//!   /api/ or /routes/ +8
//! - +5 per query token found in the path, +20 if the focus area is in the path

use super::models::Importance;
use std::path::Path;

const PRIMARY_CODE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];
const OTHER_CODE_EXTENSIONS: &[&str] = &["py", "go", "rs", "java"];
const DOC_EXTENSIONS: &[&str] = &["md", "txt"];
const CONFIG_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

const KEY_FILE_NAMES: &[&str] = &[
    "index",
    "main",
    "app",
    "server",
    "config",
    "types",
    "interfaces",
];

const SEGMENT_BONUSES: &[(&[&str], u32)] = &[
    (&["/src/"], 5),
    (&["/lib/"], 4),
    (&["/components/"], 6),
    (&["/utils/", "/helpers/"], 7),
    (&["/api/", "/routes/"], 8),
];

const KEY_FILE_BONUS: u32 = 15;
const QUERY_TOKEN_BONUS: u32 = 5;
const FOCUS_AREA_BONUS: u32 = 20;

/// Pure, stateless file scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct FileScorer;

impl FileScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score a path against an optional query and focus area
    pub fn score(&self, path: &str, query: Option<&str>, focus_area: Option<&str>) -> u32 {
        let normalized = path.replace('\\', "/").to_lowercase();
        let file_path = Path::new(&normalized);

        let mut score = extension_points(file_path);

        if let Some(stem) = file_path.file_stem().and_then(|s| s.to_str()) {
            if KEY_FILE_NAMES.contains(&stem) {
                score += KEY_FILE_BONUS;
            }
        }

        for (segments, bonus) in SEGMENT_BONUSES {
            if segments.iter().any(|segment| normalized.contains(segment)) {
                score += bonus;
            }
        }

        if let Some(query) = query {
            score += query
                .to_lowercase()
                .split_whitespace()
                .filter(|token| normalized.contains(token))
                .count() as u32
                * QUERY_TOKEN_BONUS;
        }

        if let Some(focus) = focus_area.map(|f| f.trim().to_lowercase()) {
            if !focus.is_empty() && normalized.contains(&focus) {
                score += FOCUS_AREA_BONUS;
            }
        }

        score
    }

    pub fn importance(&self, score: u32) -> Importance {
        Importance::from_score(score)
    }
}

fn extension_points(path: &Path) -> u32 {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return 0;
    };

    if PRIMARY_CODE_EXTENSIONS.contains(&ext) {
        10
    } else if OTHER_CODE_EXTENSIONS.contains(&ext) {
        8
    } else if CONFIG_EXTENSIONS.contains(&ext) {
        3
    } else if DOC_EXTENSIONS.contains(&ext) {
        2
    } else {
        0
    }
}

/// Language label for a path, from its extension
pub fn language_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "py" => "python",
        "go" => "go",
        "rs" => "rust",
        "java" => "java",
        "md" => "markdown",
        "txt" => "text",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        _ => "unknown",
    }
}
