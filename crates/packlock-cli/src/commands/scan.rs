use super::{json_pretty, EXIT_POLICY_VIOLATION, EXIT_SUCCESS};
use packlock_schema::scan_pack_content;
use std::collections::BTreeMap;
use std::path::Path;

pub fn run(dir: &Path, json: bool) -> Result<u8, String> {
    if !dir.is_dir() {
        return Err(format!("'{}' is not a directory", dir.display()));
    }
    let mut files = BTreeMap::new();
    collect_files(dir, "", &mut files)
        .map_err(|e| format!("failed to read '{}': {e}", dir.display()))?;

    let violations = scan_pack_content(&files);

    if json {
        let payload = serde_json::json!({
            "dir": dir.display().to_string(),
            "files": files.len(),
            "violations": violations,
        });
        println!("{}", json_pretty(&payload)?);
    } else if violations.is_empty() {
        println!("{}: {} file(s), no violations", dir.display(), files.len());
    } else {
        println!(
            "{}: {} violation(s) in {} file(s)",
            dir.display(),
            violations.len(),
            files.len()
        );
        for v in &violations {
            println!("  {} [{}] {}", v.path, v.rule, v.detail);
        }
    }

    if violations.is_empty() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_POLICY_VIOLATION)
    }
}

/// Read every regular file under `dir`, keyed by its `/`-separated relative
/// path. Symlinks are not followed.
fn collect_files(
    dir: &Path,
    prefix: &str,
    out: &mut BTreeMap<String, String>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), &rel, out)?;
        } else if file_type.is_file() {
            let bytes = std::fs::read(entry.path())?;
            out.insert(rel, String::from_utf8_lossy(&bytes).into_owned());
        }
    }
    Ok(())
}
