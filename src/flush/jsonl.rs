use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DocumentError;
use crate::model::document::Document;
use crate::model::entity::EntityDump;
use crate::model::registry::Registry;

pub const ENTITIES_FILE: &str = "entities.jsonl";

/// Write an iterator of serializable items to a JSONL file (one JSON object per line).
fn write_jsonl<T: Serialize>(path: &Path, items: impl Iterator<Item = T>) -> Result<(), DocumentError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut writer, &item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a JSONL file back, skipping blank lines.
fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, DocumentError> {
    let reader = BufReader::new(File::open(path)?);
    let mut items = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        items.push(serde_json::from_str(&line)?);
    }
    Ok(items)
}

/// Write the document to `entities.jsonl` in `output_dir`, one entity dump
/// per line in id order. Creates the directory if it does not exist.
pub fn flush_to_jsonl(document: &Document, output_dir: &Path) -> Result<(), DocumentError> {
    fs::create_dir_all(output_dir)?;
    write_jsonl(&output_dir.join(ENTITIES_FILE), document.dump()?.into_iter())?;
    tracing::info!(
        "flushed {} entities to {}",
        document.len(),
        output_dir.display()
    );
    Ok(())
}

/// Load a document previously written by [`flush_to_jsonl`].
pub fn load_from_jsonl(registry: &Registry, input_dir: &Path) -> Result<Document, DocumentError> {
    let dumps: Vec<EntityDump> = read_jsonl(&input_dir.join(ENTITIES_FILE))?;
    Document::load(registry, dumps)
}
