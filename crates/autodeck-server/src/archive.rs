//! ZIP export/import of script projects.
//!
//! Export packs a script's project directory. Import recreates it under a
//! chosen name, renaming the main source file to match; a taken name
//! yields a conflict carrying a free suggestion.

use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;

use crate::error::ApiError;
use crate::scripts::ScriptStore;

/// Pack a script's project directory into a ZIP archive.
pub fn export_zip(store: &ScriptStore, id: &str) -> Result<Vec<u8>, ApiError> {
    let root = store.project_root(id)?;
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    for entry in walkdir::WalkDir::new(&root).min_depth(1) {
        let entry = entry.map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
        let rel = entry
            .path()
            .strip_prefix(&root)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?
            .to_string_lossy()
            .replace('\\', "/");

        if entry.path().is_dir() {
            writer
                .add_directory(format!("{rel}/"), options)
                .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
        } else {
            writer
                .start_file(rel, options)
                .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
            let data = std::fs::read(entry.path())?;
            writer.write_all(&data)?;
        }
    }

    let cursor = writer
        .finish()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
    Ok(cursor.into_inner())
}

/// Unpack an exported archive as a new script.
///
/// The source name is taken from the top-level `<name>.py` inside the
/// archive; `new_name` overrides the target. Returns the created id.
pub fn import_zip(
    store: &ScriptStore,
    bytes: &[u8],
    new_name: Option<&str>,
) -> Result<String, ApiError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ApiError::Validation(format!("invalid archive: {e}")))?;

    let source_name = find_main_name(&mut archive)?;
    let target_name = match new_name.filter(|n| !n.trim().is_empty()) {
        Some(name) => name.trim().to_string(),
        None => source_name.clone(),
    };

    // Create the target project (detects conflicts, writes the stub).
    let record = store.create(&target_name, "")?;
    let target_id = record.id.clone();

    let result = extract_into(store, &mut archive, &source_name, &target_id);
    if result.is_err() {
        let _ = store.delete(&target_id);
    }
    result?;
    Ok(target_id)
}

fn find_main_name(archive: &mut zip::ZipArchive<Cursor<&[u8]>>) -> Result<String, ApiError> {
    for i in 0..archive.len() {
        let file = archive
            .by_index(i)
            .map_err(|e| ApiError::Validation(format!("invalid archive: {e}")))?;
        let name = file.name();
        // Top-level python file, no directory component.
        if !name.contains('/') && !name.contains('\\') {
            if let Some(stem) = name.strip_suffix(".py") {
                return Ok(stem.to_string());
            }
        }
    }
    Err(ApiError::Validation(
        "archive has no top-level script file".into(),
    ))
}

fn extract_into(
    store: &ScriptStore,
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    source_name: &str,
    target_id: &str,
) -> Result<(), ApiError> {
    let main_file = format!("{source_name}.py");

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ApiError::Validation(format!("invalid archive: {e}")))?;

        // Zip-slip guard: only accept entries that resolve inside.
        let Some(rel) = file.enclosed_name() else {
            return Err(ApiError::Forbidden(format!(
                "archive entry escapes target: {}",
                file.name()
            )));
        };
        let rel = rel.to_string_lossy().replace('\\', "/");

        if file.is_dir() {
            store.mkdir(target_id, rel.trim_end_matches('/'))?;
            continue;
        }

        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;

        // The main source file follows the new script name.
        let rel = if rel == main_file {
            format!("{target_id}.py")
        } else {
            rel
        };
        store.write_asset(target_id, &rel, &data)?;
    }

    // Preserve an imported meta.json platform; the create() stub already
    // wrote one otherwise.
    let _ = ensure_meta(store, target_id);
    Ok(())
}

fn ensure_meta(store: &ScriptStore, id: &str) -> Result<(), ApiError> {
    let root = store.project_root(id)?;
    if !root.join("meta.json").is_file() {
        crate::scripts::write_meta(&root, "")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ScriptStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ScriptStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn export_then_import_under_new_name() {
        let (_dir, store) = store();
        store.create("alpha", "android").expect("create");
        store
            .save_content("alpha", None, "print('alpha')\n")
            .expect("save");
        store
            .write_asset("alpha", "images/icon.png", b"png")
            .expect("asset");

        let bytes = export_zip(&store, "alpha").expect("export");
        let imported = import_zip(&store, &bytes, Some("beta")).expect("import");
        assert_eq!(imported, "beta");

        // Contents match, with the main source file renamed.
        assert_eq!(
            store.content("beta", None).expect("content"),
            "print('alpha')\n"
        );
        assert_eq!(
            store.read_asset("beta", "images/icon.png").expect("asset"),
            b"png"
        );
        assert!(!store.resolve("beta", "alpha.py").expect("path").is_file());
    }

    #[test]
    fn import_conflict_suggests_name() {
        let (_dir, store) = store();
        store.create("alpha", "").expect("create");
        let bytes = export_zip(&store, "alpha").expect("export");

        match import_zip(&store, &bytes, None) {
            Err(ApiError::Conflict { suggested, .. }) => assert_eq!(suggested, "alpha_1"),
            other => panic!("expected conflict, got {other:?}"),
        }

        // Importing under the suggested name succeeds.
        let id = import_zip(&store, &bytes, Some("alpha_1")).expect("import");
        assert_eq!(id, "alpha_1");
        assert!(store.content("alpha_1", None).is_ok());
    }

    #[test]
    fn import_rejects_invalid_bytes() {
        let (_dir, store) = store();
        assert!(matches!(
            import_zip(&store, b"not a zip", None),
            Err(ApiError::Validation(_))
        ));
    }
}
