//! Target-repository language detection.
//!
//! Build manifests win, checked in a fixed order. Without a manifest the
//! most common source extension decides, ties broken alphabetically.

use std::collections::BTreeMap;
use std::path::Path;

use walkdir::WalkDir;

pub const UNKNOWN: &str = "unknown";

const MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "rust"),
    ("go.mod", "go"),
    ("tsconfig.json", "typescript"),
    ("package.json", "javascript"),
    ("pyproject.toml", "python"),
    ("setup.py", "python"),
    ("setup.cfg", "python"),
    ("requirements.txt", "python"),
    ("pom.xml", "java"),
    ("build.gradle", "java"),
    ("build.gradle.kts", "java"),
];

/// Language for a file extension, if it is a source extension.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lang = match ext.to_ascii_lowercase().as_str() {
        "py" => "python",
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "go" => "go",
        "java" => "java",
        _ => return None,
    };
    Some(lang)
}

/// Extensions that belong to `language`.
pub fn extensions_for(language: &str) -> &'static [&'static str] {
    match language {
        "python" => &["py"],
        "rust" => &["rs"],
        "typescript" => &["ts", "tsx"],
        "javascript" => &["js", "jsx", "mjs", "cjs"],
        "go" => &["go"],
        "java" => &["java"],
        _ => &[],
    }
}

/// Files under `root` that detection and rename scans should consider,
/// repository-relative with `/` separators, sorted.
pub fn source_files(root: &Path, ignored_dirs: &[String]) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            if !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !ignored_dirs.iter().any(|d| d.as_str() == name)
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path().strip_prefix(root).ok().map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
        })
        .collect();
    files.sort();
    files
}

/// Detect the dominant language of the repository at `root`.
pub fn detect_language(root: &Path, ignored_dirs: &[String]) -> String {
    for (marker, lang) in MARKERS {
        if root.join(marker).is_file() {
            return lang.to_string();
        }
    }

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for file in source_files(root, ignored_dirs) {
        let ext = Path::new(&file)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(language_for_extension);
        if let Some(lang) = ext {
            *counts.entry(lang).or_default() += 1;
        }
    }

    // BTreeMap iterates alphabetically; keep the first language at the max.
    let mut best: Option<(&str, usize)> = None;
    for (lang, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((lang, count));
        }
    }
    best.map(|(lang, _)| lang.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    fn ignored() -> Vec<String> {
        crate::config::GatekeepConfig::default().ignored_dirs()
    }

    #[test]
    fn test_manifest_wins_over_extensions() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Cargo.toml");
        touch(dir.path(), "a.py");
        touch(dir.path(), "b.py");
        assert_eq!(detect_language(dir.path(), &ignored()), "rust");
    }

    #[test]
    fn test_tsconfig_beats_package_json() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "package.json");
        touch(dir.path(), "tsconfig.json");
        assert_eq!(detect_language(dir.path(), &ignored()), "typescript");
    }

    #[test]
    fn test_dominant_extension() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/a.go");
        touch(dir.path(), "src/b.go");
        touch(dir.path(), "src/c.py");
        assert_eq!(detect_language(dir.path(), &ignored()), "go");
    }

    #[test]
    fn test_tie_breaks_alphabetically() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.rs");
        touch(dir.path(), "b.py");
        assert_eq!(detect_language(dir.path(), &ignored()), "python");
    }

    #[test]
    fn test_ignored_directories_do_not_count() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "node_modules/x/a.js");
        touch(dir.path(), "node_modules/x/b.js");
        touch(dir.path(), ".hidden/c.js");
        touch(dir.path(), "main.py");
        assert_eq!(detect_language(dir.path(), &ignored()), "python");
    }

    #[test]
    fn test_empty_repo_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_language(dir.path(), &ignored()), UNKNOWN);
    }
}
