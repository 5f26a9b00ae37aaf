use anyhow::Context;
use cascade_core::{file_to_level, CascadeError, CascadeResult, Document, Level};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

struct Candidate {
    name: String,
    modified: SystemTime,
    document: Document,
}

/// Scan `directory` and return one document per level.
///
/// Only `.md` files whose name matches the level pattern table are seen.
/// When several files map to one level the most recently modified wins,
/// with ties going to the greater filename.
pub fn discover(directory: &Path) -> CascadeResult<BTreeMap<Level, Document>> {
    if !directory.is_dir() {
        return Err(CascadeError::NotFound(format!(
            "document directory not found: {}",
            directory.display()
        )));
    }

    let entries = fs::read_dir(directory)
        .with_context(|| format!("reading document directory: {}", directory.display()))?;

    let mut best: BTreeMap<Level, Candidate> = BTreeMap::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", directory.display()))?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(level) = file_to_level(&name) else {
            continue;
        };

        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .with_context(|| format!("reading mtime: {}", path.display()))?;

        let wins = match best.get(&level) {
            None => true,
            Some(current) => (modified, &name) > (current.modified, &current.name),
        };
        if !wins {
            continue;
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading document: {}", path.display()))?;
        best.insert(
            level,
            Candidate {
                name,
                modified,
                document: Document {
                    level,
                    path: path.to_string_lossy().to_string(),
                    content,
                },
            },
        );
    }

    Ok(best
        .into_iter()
        .map(|(level, c)| (level, c.document))
        .collect())
}
