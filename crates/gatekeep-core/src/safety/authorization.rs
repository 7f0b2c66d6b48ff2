//! Diff authorization: which files does a unified diff touch, and are all of
//! them in the authorized set?

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::SafetyError;

const DEV_NULL: &str = "/dev/null";

static HUNK_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@@ -\d+(?:,(\d+))? \+\d+(?:,(\d+))? @@").unwrap());

static STAT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+)\s+\|\s+(\d+\s*[+-]*|Bin\b.*)\s*$").unwrap()
});

/// Lines still owed by the current hunk, old side then new side.
#[derive(Debug, Default, Clone, Copy)]
struct HunkBudget {
    old: u64,
    new: u64,
}

impl HunkBudget {
    fn open(line: &str) -> Option<Self> {
        let caps = HUNK_HEADER.captures(line)?;
        let count = |i: usize| {
            caps.get(i)
                .map_or(Ok(1), |m| m.as_str().parse::<u64>())
                .unwrap_or(0)
        };
        Some(Self {
            old: count(1),
            new: count(2),
        })
    }

    fn active(&self) -> bool {
        self.old > 0 || self.new > 0
    }

    /// Charge one body line against the budget.
    fn consume(&mut self, line: &str) {
        match line.as_bytes().first() {
            Some(b'-') => self.old = self.old.saturating_sub(1),
            Some(b'+') => self.new = self.new.saturating_sub(1),
            Some(b'\\') => {}
            // Context lines, including ones whose leading space was stripped.
            _ => {
                self.old = self.old.saturating_sub(1);
                self.new = self.new.saturating_sub(1);
            }
        }
    }
}

/// Header paths (`---`, `+++`, `diff --git`) in order of appearance.
///
/// Lines inside a hunk body are never headers, even when a removed `-- x`
/// or added `++ x` line looks like one.
fn header_paths(diff: &str) -> Vec<(char, String)> {
    let mut paths = Vec::new();
    let mut hunk = HunkBudget::default();
    for line in diff.lines() {
        if hunk.active() {
            hunk.consume(line);
            continue;
        }
        if let Some(budget) = HunkBudget::open(line) {
            hunk = budget;
        } else if let Some(rest) = line.strip_prefix("--- ") {
            paths.push(('a', clean_header(rest)));
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            paths.push(('b', clean_header(rest)));
        } else if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some((a, b)) = rest.split_once(" b/") {
                paths.push(('a', a.trim().to_string()));
                paths.push(('b', format!("b/{}", b.trim())));
            }
        }
    }
    paths
}

/// Drop the optional tab-separated timestamp and surrounding quotes.
fn clean_header(rest: &str) -> String {
    let path = rest.split('\t').next().unwrap_or(rest).trim();
    path.trim_matches('"').to_string()
}

/// Whether the headers carry git's `a/` and `b/` prefixes.
///
/// Decides both how touched paths are read and which `-p` level
/// `git apply` needs.
pub fn uses_prefixes(diff: &str) -> bool {
    let paths = header_paths(diff);
    let mut any = false;
    for (side, path) in &paths {
        if path == DEV_NULL {
            continue;
        }
        any = true;
        let prefix = if *side == 'a' { "a/" } else { "b/" };
        if !path.starts_with(prefix) {
            return false;
        }
    }
    any
}

/// `path | 3 ++-` summary lines from the preamble before the first header.
fn stat_paths(diff: &str) -> Vec<String> {
    diff.lines()
        .take_while(|l| {
            !(l.starts_with("--- ") || l.starts_with("+++ ") || l.starts_with("diff --git "))
        })
        .filter_map(|l| STAT_LINE.captures(l).map(|c| c[1].to_string()))
        .collect()
}

fn normalize(path: &str) -> String {
    path.trim().trim_start_matches("./").replace('\\', "/")
}

/// Every file a diff touches. `/dev/null` is never reported.
pub fn touched_files(diff: &str) -> BTreeSet<String> {
    let prefixed = uses_prefixes(diff);
    let mut touched = BTreeSet::new();

    for (side, path) in header_paths(diff) {
        if path == DEV_NULL || path.is_empty() {
            continue;
        }
        let path = if prefixed {
            let prefix = if side == 'a' { "a/" } else { "b/" };
            path.strip_prefix(prefix).unwrap_or(&path).to_string()
        } else {
            path
        };
        touched.insert(normalize(&path));
    }

    for path in stat_paths(diff) {
        touched.insert(normalize(&path));
    }

    touched
}

/// Touched files that are not in `authorized`.
pub fn unauthorized_files<'a, I>(diff: &str, authorized: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let authorized: BTreeSet<String> = authorized.into_iter().map(|p| normalize(p)).collect();
    touched_files(diff)
        .into_iter()
        .filter(|p| !authorized.contains(p))
        .collect()
}

/// Fail the whole diff when any touched file is unauthorized.
pub fn authorize<'a, I>(diff: &str, authorized: I) -> Result<BTreeSet<String>, SafetyError>
where
    I: IntoIterator<Item = &'a String>,
{
    let unauthorized = unauthorized_files(diff, authorized);
    if unauthorized.is_empty() {
        Ok(touched_files(diff))
    } else {
        Err(SafetyError::UnauthorizedFiles {
            files: unauthorized.into_iter().collect(),
        })
    }
}
