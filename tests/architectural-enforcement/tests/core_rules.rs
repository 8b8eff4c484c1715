//! Rules for the orchestration core and the chat host

use std::fs;

use architectural_enforcement::{
    find_violations, production_lines, runtime_dependencies, rust_sources, workspace_root,
};

const CORE: &str = "conductor/core";
const CHAT: &str = "conductor/chat";

fn assert_clean(what: &str, violations: &[String]) {
    assert!(violations.is_empty(), "{what}:\n{}", violations.join("\n"));
}

#[test]
fn test_no_blocking_sleep() {
    for krate in [CORE, CHAT] {
        let violations = find_violations(krate, &["std::thread::sleep", "thread::sleep("]);
        assert_clean("blocking sleep in async code", &violations);
    }
}

#[test]
fn test_timers_run_on_tokio() {
    let violations = find_violations(CORE, &["std::thread::spawn", "thread::spawn("]);
    assert_clean("OS threads in the core", &violations);
}

#[test]
fn test_no_panicking_shortcuts_in_core() {
    let violations = find_violations(CORE, &[".unwrap()", ".expect("]);
    assert_clean("unwrap/expect outside tests", &violations);
}

#[test]
fn test_core_logs_through_tracing() {
    let violations = find_violations(CORE, &["println!", "eprintln!", "dbg!("]);
    assert_clean("direct printing in the library", &violations);
}

#[test]
fn test_core_has_no_terminal_dependencies() {
    let manifest = fs::read_to_string(workspace_root().join(CORE).join("Cargo.toml")).unwrap();
    for forbidden in ["clap", "tracing-subscriber", "crossterm", "ratatui"] {
        let declared = manifest.lines().map(str::trim_start).any(|line| {
            line.starts_with(&format!("{forbidden} ")) || line.starts_with(&format!("{forbidden}="))
        });
        assert!(!declared, "companion-core must not depend on {forbidden}");
    }
}

#[test]
fn test_core_runtime_dependencies_are_used_outside_tests() {
    let production: Vec<String> = rust_sources(CORE)
        .iter()
        .flat_map(|path| production_lines(path))
        .map(|(_, line)| line)
        .collect();

    for dependency in runtime_dependencies(CORE) {
        let path = format!("{}::", dependency.replace('-', "_"));
        assert!(
            production.iter().any(|line| line.contains(&path)),
            "{dependency} is only used by tests; declare it under [dev-dependencies]"
        );
    }
}
