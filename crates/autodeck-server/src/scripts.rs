//! Filesystem store for scripts and their assets.
//!
//! Scripts live under `<core>/script/custom/<id>/` with a main source file
//! `<id>.py`, a `meta.json` carrying the platform tag, and arbitrary asset
//! files (images, data). Every user-supplied path is resolved under the
//! script's project root; after normalization the target must stay a
//! prefix-descendant of that root or the operation is forbidden.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::ApiError;

/// One script as listed to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptRecord {
    pub id: String,
    pub name: String,
    /// Path of the main source file, relative to the core directory.
    pub path: String,
    pub platform: String,
}

/// One asset entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Path relative to the project root, forward slashes.
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct ScriptMeta {
    #[serde(default)]
    platform: String,
}

/// Store rooted at the core directory.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    root: PathBuf,
}

impl ScriptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn custom_dir(&self) -> PathBuf {
        self.root.join("script").join("custom")
    }

    /// Absolute, normalized project root for one script.
    pub fn project_root(&self, id: &str) -> Result<PathBuf, ApiError> {
        let id = sanitize_id(id)?;
        let dir = self.custom_dir().join(&id);
        if !dir.is_dir() {
            return Err(ApiError::NotFound(format!("script not found: {id}")));
        }
        Ok(absolutize(&dir))
    }

    /// Resolve a user-supplied relative path inside a script's project.
    pub fn resolve(&self, id: &str, rel: &str) -> Result<PathBuf, ApiError> {
        let root = self.project_root(id)?;
        resolve_under(&root, rel)
    }

    // ── script CRUD ──────────────────────────────────────────────────────

    pub fn list(&self) -> Result<Vec<ScriptRecord>, ApiError> {
        let dir = self.custom_dir();
        let mut records = Vec::new();
        if !dir.is_dir() {
            return Ok(records);
        }

        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            let main = entry.path().join(format!("{id}.py"));
            if !main.is_file() {
                continue;
            }

            let platform = read_meta(&entry.path()).platform;
            records.push(ScriptRecord {
                path: format!("script/custom/{id}/{id}.py"),
                name: id.clone(),
                id,
                platform,
            });
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    pub fn create(&self, name: &str, platform: &str) -> Result<ScriptRecord, ApiError> {
        let id = sanitize_id(name)?;
        let dir = self.custom_dir().join(&id);
        if dir.exists() {
            return Err(ApiError::Conflict {
                suggested: self.suggest_name(&id),
                name: id,
            });
        }

        std::fs::create_dir_all(&dir)?;
        std::fs::write(
            dir.join(format!("{id}.py")),
            "def main(params):\n    pass\n",
        )?;
        write_meta(&dir, platform)?;

        Ok(ScriptRecord {
            path: format!("script/custom/{id}/{id}.py"),
            name: id.clone(),
            id,
            platform: platform.to_string(),
        })
    }

    pub fn delete(&self, id: &str) -> Result<(), ApiError> {
        let root = self.project_root(id)?;
        std::fs::remove_dir_all(root)?;
        Ok(())
    }

    /// Rename a script directory and its main source file.
    pub fn rename(&self, id: &str, new_name: &str) -> Result<(), ApiError> {
        let old_root = self.project_root(id)?;
        let new_id = sanitize_id(new_name)?;
        let new_root = self.custom_dir().join(&new_id);
        if new_root.exists() {
            return Err(ApiError::Conflict {
                suggested: self.suggest_name(&new_id),
                name: new_id,
            });
        }

        std::fs::rename(&old_root, &new_root)?;
        let old_main = new_root.join(format!("{}.py", sanitize_id(id)?));
        let new_main = new_root.join(format!("{new_id}.py"));
        if old_main.is_file() {
            std::fs::rename(old_main, new_main)?;
        }
        Ok(())
    }

    /// First free `name_N` variant for conflict responses.
    pub fn suggest_name(&self, base: &str) -> String {
        for n in 1..100 {
            let candidate = format!("{base}_{n}");
            if !self.custom_dir().join(&candidate).exists() {
                return candidate;
            }
        }
        format!("{base}_{}", chrono::Utc::now().timestamp())
    }

    // ── content ──────────────────────────────────────────────────────────

    /// Read a source file; defaults to the main `<id>.py`.
    pub fn content(&self, id: &str, rel: Option<&str>) -> Result<String, ApiError> {
        let path = self.content_path(id, rel)?;
        if !path.is_file() {
            return Err(ApiError::NotFound(format!("file not found: {}", path.display())));
        }
        Ok(std::fs::read_to_string(path)?)
    }

    pub fn save_content(&self, id: &str, rel: Option<&str>, content: &str) -> Result<(), ApiError> {
        let path = self.content_path(id, rel)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    fn content_path(&self, id: &str, rel: Option<&str>) -> Result<PathBuf, ApiError> {
        match rel {
            Some(rel) if !rel.is_empty() => self.resolve(id, rel),
            _ => {
                let id = sanitize_id(id)?;
                self.resolve(&id, &format!("{id}.py"))
            }
        }
    }

    // ── assets ───────────────────────────────────────────────────────────

    pub fn list_assets(&self, id: &str) -> Result<Vec<AssetRecord>, ApiError> {
        let root = self.project_root(id)?;
        let mut records = Vec::new();
        for entry in walkdir::WalkDir::new(&root).min_depth(1) {
            let entry = entry.map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
            let rel = entry
                .path()
                .strip_prefix(&root)
                .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
            let rel = rel.to_string_lossy().replace('\\', "/");
            if rel == "meta.json" {
                continue;
            }
            let meta = entry.metadata().map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;
            records.push(AssetRecord {
                path: rel,
                is_dir: meta.is_dir(),
                size: meta.len(),
            });
        }
        records.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(records)
    }

    pub fn read_asset(&self, id: &str, rel: &str) -> Result<Vec<u8>, ApiError> {
        let path = self.resolve(id, rel)?;
        if !path.is_file() {
            return Err(ApiError::NotFound(format!("asset not found: {rel}")));
        }
        Ok(std::fs::read(path)?)
    }

    pub fn write_asset(&self, id: &str, rel: &str, data: &[u8]) -> Result<(), ApiError> {
        let path = self.resolve(id, rel)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn delete_asset(&self, id: &str, rel: &str) -> Result<(), ApiError> {
        let path = self.resolve(id, rel)?;
        if path.is_dir() {
            std::fs::remove_dir_all(path)?;
        } else if path.is_file() {
            std::fs::remove_file(path)?;
        } else {
            return Err(ApiError::NotFound(format!("asset not found: {rel}")));
        }
        Ok(())
    }

    pub fn mkdir(&self, id: &str, rel: &str) -> Result<(), ApiError> {
        let path = self.resolve(id, rel)?;
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    pub fn create_asset(&self, id: &str, rel: &str) -> Result<(), ApiError> {
        let path = self.resolve(id, rel)?;
        if path.exists() {
            return Err(ApiError::Conflict {
                name: rel.to_string(),
                suggested: format!("{rel}_1"),
            });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"")?;
        Ok(())
    }

    /// Copy-then-delete rename, tolerating platforms that hold file locks
    /// on open files. Directories try a plain rename first.
    pub fn rename_asset(&self, id: &str, old_rel: &str, new_rel: &str) -> Result<(), ApiError> {
        let old_path = self.resolve(id, old_rel)?;
        let new_path = self.resolve(id, new_rel)?;
        if !old_path.exists() {
            return Err(ApiError::NotFound(format!("asset not found: {old_rel}")));
        }
        if new_path.exists() {
            return Err(ApiError::Conflict {
                name: new_rel.to_string(),
                suggested: format!("{new_rel}_1"),
            });
        }
        if let Some(parent) = new_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if old_path.is_dir() {
            std::fs::rename(&old_path, &new_path)?;
            return Ok(());
        }

        std::fs::copy(&old_path, &new_path)?;
        std::fs::remove_file(&old_path)?;
        Ok(())
    }

    pub fn move_asset(&self, id: &str, from: &str, to: &str) -> Result<(), ApiError> {
        self.rename_asset(id, from, to)
    }
}

fn read_meta(dir: &Path) -> ScriptMeta {
    std::fs::read_to_string(dir.join("meta.json"))
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub(crate) fn write_meta(dir: &Path, platform: &str) -> std::io::Result<()> {
    let meta = ScriptMeta {
        platform: platform.to_string(),
    };
    std::fs::write(
        dir.join("meta.json"),
        serde_json::to_string_pretty(&meta).unwrap_or_default(),
    )
}

/// Script ids become directory names; reject anything path-like.
fn sanitize_id(name: &str) -> Result<String, ApiError> {
    let id = name.trim().replace(' ', "_");
    if id.is_empty() {
        return Err(ApiError::Validation("script name is required".into()));
    }
    if id.contains('/') || id.contains('\\') || id.contains("..") || id.starts_with('.') {
        return Err(ApiError::Validation(format!("invalid script name: {name}")));
    }
    Ok(id)
}

/// Resolve `rel` under `root`, rejecting absolute paths and any result
/// that escapes the root after normalization.
pub(crate) fn resolve_under(root: &Path, rel: &str) -> Result<PathBuf, ApiError> {
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() || looks_absolute(rel) {
        return Err(ApiError::Forbidden(format!("absolute paths are not allowed: {rel}")));
    }

    let target = normalize(&root.join(rel_path));
    if !target.starts_with(root) {
        return Err(ApiError::Forbidden(format!("path escapes project root: {rel}")));
    }
    Ok(target)
}

/// Windows-style absolute paths must be rejected on every platform.
fn looks_absolute(rel: &str) -> bool {
    rel.starts_with('/')
        || rel.starts_with('\\')
        || (rel.len() >= 2 && rel.as_bytes()[1] == b':')
}

/// Make a path absolute against the current directory without requiring it
/// to exist.
fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };
    normalize(&joined)
}

/// Lexical normalization: fold `.` and `..` components without touching
/// the filesystem (targets may not exist yet).
fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
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
    fn create_list_and_content() {
        let (_dir, store) = store();
        store.create("demo", "android").expect("create");

        let listed = store.list().expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "demo");
        assert_eq!(listed[0].platform, "android");
        assert_eq!(listed[0].path, "script/custom/demo/demo.py");

        let content = store.content("demo", None).expect("content");
        assert!(content.contains("def main"));

        store
            .save_content("demo", None, "print('hi')\n")
            .expect("save");
        assert_eq!(store.content("demo", None).expect("content"), "print('hi')\n");
    }

    #[test]
    fn create_conflict_suggests_name() {
        let (_dir, store) = store();
        store.create("demo", "").expect("create");
        match store.create("demo", "") {
            Err(ApiError::Conflict { suggested, .. }) => assert_eq!(suggested, "demo_1"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn rename_moves_main_file() {
        let (_dir, store) = store();
        store.create("old", "").expect("create");
        store.rename("old", "new").expect("rename");

        let listed = store.list().expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "new");
        assert!(store.content("new", None).is_ok());
    }

    #[test]
    fn path_safety_rejects_escapes() {
        let (_dir, store) = store();
        store.create("demo", "").expect("create");

        assert!(store.resolve("demo", "images/icon.png").is_ok());
        assert!(store.resolve("demo", "demo.py").is_ok());

        assert!(matches!(
            store.resolve("demo", "../../secret.txt"),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            store.resolve("demo", "/etc/passwd"),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            store.resolve("demo", "C:\\Windows\\System32\\cmd.exe"),
            Err(ApiError::Forbidden(_))
        ));
        // Escaping and coming back is still an escape attempt lexically,
        // but normalization keeps it inside the root.
        assert!(store.resolve("demo", "images/../demo.py").is_ok());
    }

    #[test]
    fn asset_roundtrip_and_rename() {
        let (_dir, store) = store();
        store.create("demo", "").expect("create");

        store
            .write_asset("demo", "images/icon.png", b"png-bytes")
            .expect("write");
        assert_eq!(
            store.read_asset("demo", "images/icon.png").expect("read"),
            b"png-bytes"
        );

        store
            .rename_asset("demo", "images/icon.png", "images/logo.png")
            .expect("rename");
        assert!(store.read_asset("demo", "images/icon.png").is_err());
        assert_eq!(
            store.read_asset("demo", "images/logo.png").expect("read"),
            b"png-bytes"
        );

        let assets = store.list_assets("demo").expect("list");
        assert!(assets.iter().any(|a| a.path == "images/logo.png"));
        assert!(assets.iter().all(|a| a.path != "meta.json"));
    }

    #[test]
    fn unknown_script_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.list_assets("nope"), Err(ApiError::NotFound(_))));
        assert!(matches!(store.delete("nope"), Err(ApiError::NotFound(_))));
    }
}
