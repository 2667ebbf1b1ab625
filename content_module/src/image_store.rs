use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::GenerationError;

const MAX_HINT_CHARS: usize = 50;

/// Directory of generated post images.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` as `<sanitised-hint>_<timestamp>.png` and returns the path.
    pub fn save(&self, bytes: &[u8], hint: &str) -> Result<PathBuf, GenerationError> {
        fs::create_dir_all(&self.dir).map_err(|err| GenerationError::Io {
            path: self.dir.clone(),
            message: err.to_string(),
        })?;
        let filename = format!(
            "{}_{}.png",
            sanitize_hint(hint),
            Utc::now().timestamp_millis()
        );
        let path = self.dir.join(filename);
        fs::write(&path, bytes).map_err(|err| GenerationError::Io {
            path: path.clone(),
            message: err.to_string(),
        })?;
        info!("image saved: {}", path.display());
        Ok(path)
    }
}

fn sanitize_hint(hint: &str) -> String {
    let kept: String = hint
        .chars()
        .take(MAX_HINT_CHARS)
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let name = kept.trim().replace(' ', "_");
    if name.is_empty() {
        "image".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_hint_keeps_safe_characters() {
        assert_eq!(sanitize_hint("AI & data: a/b test!"), "AI__data_ab_test");
        assert_eq!(sanitize_hint("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_hint("???"), "image");
        assert_eq!(sanitize_hint(&"x".repeat(80)).len(), MAX_HINT_CHARS);
    }

    #[test]
    fn save_writes_png_under_directory() {
        let temp = TempDir::new().expect("tempdir");
        let store = ImageStore::new(temp.path().join("media").join("generated"));
        let path = store.save(b"\x89PNG", "Quarterly outlook").expect("save");

        assert!(path.starts_with(store.dir()));
        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("Quarterly_outlook_"));
        assert!(name.ends_with(".png"));
        assert_eq!(fs::read(&path).expect("read"), b"\x89PNG");
    }
}
