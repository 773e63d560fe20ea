//! ZIP bundling of finished artifacts
//!
//! A bundle lands next to the artifacts as `<zip id>.zip`, so it is served
//! and swept exactly like a job's file.

use crate::error::{Error, Result};
use crate::storage;
use crate::types::JobId;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use zip::CompressionMethod;
use zip::write::FileOptions;

/// A written bundle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ZipBundle {
    /// Identifier the bundle is retrievable under
    pub zip_id: JobId,
    /// Number of artifacts included
    pub files_count: usize,
}

/// Bundle the artifacts of `ids` into `<dir>/<zip id>.zip`
///
/// Ids that are malformed or have no file are skipped. Fails when nothing
/// could be added, leaving no empty archive behind.
pub async fn create_zip(dir: &Path, ids: &[String]) -> Result<ZipBundle> {
    let mut sources = Vec::new();
    for raw in ids {
        let Ok(id) = JobId::parse(raw) else {
            debug!(id = %raw, "skipping malformed id");
            continue;
        };
        match storage::find_by_prefix(dir, id.as_str()).await? {
            Some(path) => sources.push(path),
            None => debug!(job_id = %id, "no artifact to bundle"),
        }
    }
    if sources.is_empty() {
        return Err(Error::NotFound("No files found to zip".into()));
    }

    let zip_id = JobId::generate();
    let zip_path = dir.join(format!("{zip_id}.zip"));
    let target = zip_path.clone();
    let written = tokio::task::spawn_blocking(move || write_zip(&target, &sources))
        .await
        .map_err(|e| Error::Other(format!("zip task failed: {e}")))?;

    match written {
        Ok(files_count) => {
            info!(zip_id = %zip_id, files_count, "created bundle");
            Ok(ZipBundle {
                zip_id,
                files_count,
            })
        }
        Err(e) => {
            if let Err(remove_err) = tokio::fs::remove_file(&zip_path).await {
                warn!(path = ?zip_path, error = %remove_err, "failed to remove partial bundle");
            }
            Err(e)
        }
    }
}

fn write_zip(target: &Path, sources: &[PathBuf]) -> Result<usize> {
    let mut writer = zip::ZipWriter::new(BufWriter::new(File::create(target)?));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    let mut added = 0;
    for source in sources {
        let Some(name) = source.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let mut input = match File::open(source) {
            Ok(file) => file,
            // Swept between lookup and bundling
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        writer.start_file(name, options)?;
        std::io::copy(&mut input, &mut writer)?;
        added += 1;
    }
    writer.finish()?;

    if added == 0 {
        return Err(Error::NotFound("No files found to zip".into()));
    }
    Ok(added)
}
