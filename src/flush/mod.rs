mod jsonl;

pub use jsonl::{ENTITIES_FILE, flush_to_jsonl, load_from_jsonl};
