use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

/// Archive of accepted punch photos. The returned path becomes the record's `photo_ref`.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(
        &self,
        employee_id: &str,
        record_id: &str,
        taken_at: DateTime<Utc>,
        frame: &[u8],
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create photo directory {}", self.dir.display()))?;

        let extension = image::guess_format(frame)
            .ok()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("img");
        let file_name = format!(
            "punch_{}_{}_{}.{extension}",
            sanitize(employee_id),
            taken_at.with_timezone(&Local).format("%Y%m%d%H%M%S"),
            record_id.chars().take(8).collect::<String>(),
        );
        let path = self.dir.join(file_name);

        std::fs::write(&path, frame)
            .with_context(|| format!("failed to write photo {}", path.display()))?;
        Ok(path)
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
