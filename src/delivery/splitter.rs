//! Chunk splitter for artifacts above the single-file ceiling
//!
//! Parts are `<stem>.partNNN<.ext>`, 1-indexed, every part exactly
//! `chunk_size` bytes except the last. Copying goes through a fixed-size
//! buffer so memory use does not depend on the artifact size.

use crate::error::{Error, Result};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};

const COPY_BLOCK: usize = 1024 * 1024;

/// One planned or written part
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    /// 1-indexed sequence number
    pub index: usize,
    /// Number of parts in the set
    pub count: usize,
    /// Byte offset in the source
    pub offset: u64,
    /// Size in bytes
    pub size: u64,
    /// Where the part is (or will be) written
    pub path: PathBuf,
}

/// `clip.mp4`, part 2 → `clip.part002.mp4`
pub fn part_name(source: &Path, index: usize) -> String {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("artifact");
    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.part{index:03}.{ext}"),
        None => format!("{stem}.part{index:03}"),
    }
}

/// Compute part boundaries for a source of `size` bytes
///
/// Yields `ceil(size / chunk_size)` parts next to the source.
pub fn plan_parts(source: &Path, size: u64, chunk_size: u64) -> Result<Vec<Part>> {
    if chunk_size == 0 {
        return Err(Error::Validation("chunk size must be positive".into()));
    }
    let count = size.div_ceil(chunk_size) as usize;
    let dir = source.parent().unwrap_or_else(|| Path::new("."));

    Ok((0..count)
        .map(|i| {
            let offset = i as u64 * chunk_size;
            Part {
                index: i + 1,
                count,
                offset,
                size: chunk_size.min(size - offset),
                path: dir.join(part_name(source, i + 1)),
            }
        })
        .collect())
}

/// Write one planned part by copying its byte range from `source`
pub async fn write_part(source: &Path, part: &Part) -> Result<()> {
    let mut input = File::open(source).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::ArtifactMissing {
            path: source.to_path_buf(),
        },
        _ => Error::Io(e),
    })?;
    input.seek(SeekFrom::Start(part.offset)).await?;

    let mut output = BufWriter::new(File::create(&part.path).await?);
    let mut buf = vec![0u8; COPY_BLOCK];
    let mut remaining = part.size;

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let read = input.read(&mut buf[..want]).await?;
        if read == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "source ended {} bytes early while writing {}",
                    remaining,
                    part.path.display()
                ),
            )));
        }
        output.write_all(&buf[..read]).await?;
        remaining -= read as u64;
    }
    output.flush().await?;
    Ok(())
}
