use std::path::Path;

use cascade_core::LEVELS_ASCENDING;

pub fn execute(dir: &Path, json: bool) -> anyhow::Result<()> {
    let documents = cascade_store::discover(dir)?;

    if json {
        let map: serde_json::Map<String, serde_json::Value> = documents
            .values()
            .map(|d| (d.level.to_string(), serde_json::Value::String(d.path.clone())))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    for level in LEVELS_ASCENDING {
        match documents.get(&level) {
            Some(doc) => println!("{:<8} {}", level.as_str(), doc.path),
            None => println!("{:<8} -", level.as_str()),
        }
    }
    Ok(())
}
