//! Safety screening of pack artifacts before they may back a manifest.
//!
//! Packs carry prose and configuration, never executables. A file is flagged
//! when its type is outside the allowlist, or when a line looks like it asks
//! the agent to run a shell command.

use crate::manifest::is_safe_relative_path;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub const ALLOWED_EXTENSIONS: &[&str] = &["md", "yaml", "yml", "txt", "template"];

pub const RULE_DISALLOWED_EXTENSION: &str = "disallowed-extension";
pub const RULE_UNSAFE_PATH: &str = "unsafe-path";
pub const RULE_SHELL_SIGIL: &str = "shell-sigil";
pub const RULE_EXEC_DIRECTIVE: &str = "exec-directive";
pub const RULE_SHELL_FENCE: &str = "shell-fence";

const SHELL_FENCE_LANGUAGES: &[&str] = &[
    "sh",
    "bash",
    "zsh",
    "fish",
    "shell",
    "console",
    "shell-session",
    "powershell",
    "pwsh",
    "ps1",
    "cmd",
    "bat",
];

static EXEC_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:-\s+)?(exec|run|shell)\s*:").expect("static regex is valid")
});

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:`{3,}|~{3,})\s*\{?\s*\.?([A-Za-z0-9_+-]+)")
        .expect("static regex is valid")
});

/// A single content policy finding.
///
/// Field order matters: the derived ordering sorts by `(path, rule, detail)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackPolicyViolation {
    pub path: String,
    pub rule: String,
    pub detail: String,
}

/// Scan pack artifacts (path -> text) and return every violation, sorted.
///
/// An empty result means the content is acceptable.
pub fn scan_pack_content(files: &BTreeMap<String, String>) -> Vec<PackPolicyViolation> {
    let mut violations = Vec::new();

    for (path, text) in files {
        if !is_safe_relative_path(path) {
            violations.push(violation(
                path,
                RULE_UNSAFE_PATH,
                "path must be relative and must not contain '..'".to_owned(),
            ));
        }

        match extension_of(path) {
            Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
            Some(ext) => {
                violations.push(violation(
                    path,
                    RULE_DISALLOWED_EXTENSION,
                    format!("file type '.{ext}' is not allowed"),
                ));
                continue;
            }
            None => {
                violations.push(violation(
                    path,
                    RULE_DISALLOWED_EXTENSION,
                    "file has no extension".to_owned(),
                ));
                continue;
            }
        }

        for (index, line) in text.lines().enumerate() {
            scan_line(path, index + 1, line, &mut violations);
        }
    }

    violations.sort();
    violations
}

fn scan_line(path: &str, line_no: usize, line: &str, out: &mut Vec<PackPolicyViolation>) {
    let trimmed = line.trim_start();

    if let Some(sigil) = shell_sigil(trimmed) {
        out.push(violation(
            path,
            RULE_SHELL_SIGIL,
            format!("line {line_no}: starts with shell sigil '{sigil}'"),
        ));
    }

    if let Some(caps) = EXEC_KEY.captures(line) {
        out.push(violation(
            path,
            RULE_EXEC_DIRECTIVE,
            format!("line {line_no}: execution key '{}'", &caps[1]),
        ));
    }

    if let Some(caps) = FENCE.captures(line) {
        let lang = caps[1].to_ascii_lowercase();
        if SHELL_FENCE_LANGUAGES.contains(&lang.as_str()) {
            out.push(violation(
                path,
                RULE_SHELL_FENCE,
                format!("line {line_no}: code fence tagged '{lang}'"),
            ));
        }
    }
}

fn shell_sigil(trimmed: &str) -> Option<&'static str> {
    if trimmed.starts_with("$ ") || trimmed == "$" {
        return Some("$");
    }
    if trimmed.starts_with("#!") {
        return Some("#!");
    }
    // `!cmd` (notebook-style escapes); markdown images start with `![`.
    let mut chars = trimmed.chars();
    if chars.next() == Some('!') && chars.next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Some("!");
    }
    None
}

fn extension_of(path: &str) -> Option<String> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn violation(path: &str, rule: &str, detail: String) -> PackPolicyViolation {
    PackPolicyViolation {
        path: path.to_owned(),
        rule: rule.to_owned(),
        detail,
    }
}
