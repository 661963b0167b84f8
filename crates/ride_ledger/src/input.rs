//! Loading raw payload files.

use std::path::Path;

use serde_json::Value;

use crate::error::LedgerResult;

/// Read raw workout payloads from a JSON file.
///
/// Accepts a top-level array, an object with a `data` array (the provider's
/// listing shape), or a single payload object.
pub fn load_payloads(path: &Path) -> LedgerResult<Vec<Value>> {
    let text = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)?;
    let payloads = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) if obj.get("data").is_some_and(Value::is_array) => {
            match obj.remove("data") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }
        }
        other => vec![other],
    };
    tracing::debug!(path = %path.display(), count = payloads.len(), "loaded payloads");
    Ok(payloads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_arrays_listings_and_single_objects() {
        let f = write_temp(r#"[{"id": "a"}, {"id": "b"}]"#);
        assert_eq!(load_payloads(f.path()).unwrap().len(), 2);

        let f = write_temp(r#"{"data": [{"id": "a"}], "page_count": 1}"#);
        assert_eq!(load_payloads(f.path()).unwrap().len(), 1);

        let f = write_temp(r#"{"id": "a"}"#);
        let loaded = load_payloads(f.path()).unwrap();
        assert_eq!(loaded[0]["id"], "a");
    }

    #[test]
    fn bad_json_and_missing_file_are_errors() {
        let f = write_temp("not json");
        assert!(matches!(
            load_payloads(f.path()),
            Err(LedgerError::Serialization(_))
        ));
        let missing = f.path().with_extension("missing");
        assert!(matches!(load_payloads(&missing), Err(LedgerError::Io(_))));
    }
}
