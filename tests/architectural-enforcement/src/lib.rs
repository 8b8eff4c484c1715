//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No blocking sleeps or OS threads in orchestration code
//! - No panicking shortcuts (`unwrap`/`expect`) outside tests
//! - Logging through `tracing`, never `println!`, in the library
//! - The core stays free of terminal and CLI dependencies
//! - Every runtime dependency of the core is used outside tests
//!
//! The helpers here find the workspace sources and strip test code so the
//! rules only apply to what ships.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Workspace root (two levels above this crate)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Every `.rs` file under `<workspace>/<relative>/src`
#[must_use]
pub fn rust_sources(relative: &str) -> Vec<PathBuf> {
    let src = workspace_root().join(relative).join("src");
    WalkDir::new(src)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Non-test lines of a source file, with their 1-based line numbers
///
/// Everything from the first `#[cfg(test)]` on is treated as test code, as
/// is any doc or line comment.
#[must_use]
pub fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(i, line)| (i + 1, line.to_string()))
        .collect()
}

/// `file:line: text` for every production line containing any of `needles`
#[must_use]
pub fn find_violations(relative: &str, needles: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for path in rust_sources(relative) {
        for (number, line) in production_lines(&path) {
            if needles.iter().any(|n| line.contains(n)) {
                violations.push(format!("{}:{number}: {}", path.display(), line.trim()));
            }
        }
    }
    violations
}

/// Crate names declared under `[dependencies]` in `<workspace>/<relative>/Cargo.toml`
#[must_use]
pub fn runtime_dependencies(relative: &str) -> Vec<String> {
    let Ok(manifest) = fs::read_to_string(workspace_root().join(relative).join("Cargo.toml")) else {
        return Vec::new();
    };
    manifest
        .lines()
        .map(str::trim)
        .skip_while(|line| *line != "[dependencies]")
        .skip(1)
        .take_while(|line| !line.starts_with('['))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split(['=', ' ', '.']).next())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_core_sources() {
        let sources = rust_sources("conductor/core");
        assert!(sources.iter().any(|p| p.ends_with("scope.rs")));
    }

    #[test]
    fn test_production_lines_stop_at_tests() {
        let dir = std::env::temp_dir().join("arch-enforcement-lines");
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("sample.rs");
        fs::write(&file, "fn a() {}\n// x.unwrap()\n#[cfg(test)]\nmod tests { fn b() { x.unwrap(); } }\n")
            .unwrap();

        let lines = production_lines(&file);
        assert_eq!(lines, vec![(1, "fn a() {}".to_string())]);
    }

    #[test]
    fn test_reads_runtime_dependencies_only() {
        let deps = runtime_dependencies("conductor/core");
        assert!(deps.iter().any(|d| d == "tokio"));
        assert!(deps.iter().any(|d| d == "parking_lot"));
        assert!(!deps.iter().any(|d| d == "tempfile"));
    }
}
