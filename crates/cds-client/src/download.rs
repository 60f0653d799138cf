//! Streaming an asset to disk.
//!
//! Bytes go to `<dest>.partial` first and the file is renamed into place
//! only once the body has been fully written and synced, so a file at
//! `dest` is always complete.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::Response;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::error::TransportError;

/// Temporary path used while `dest` is being written.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Stream a response body to `dest`, writing in `chunk_size` blocks.
pub async fn stream_to_file(
    response: Response,
    dest: &Path,
    chunk_size: usize,
) -> Result<u64, TransportError> {
    let stream = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(TransportError::from));
    write_stream(stream, dest, chunk_size).await
}

/// Write a stream of byte chunks to `dest` via a `.partial` file.
pub async fn write_stream<S>(
    mut stream: S,
    dest: &Path,
    chunk_size: usize,
) -> Result<u64, TransportError>
where
    S: futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Unpin,
{
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = partial_path(dest);
    let file = File::create(&temp_path).await?;
    let mut writer = BufWriter::with_capacity(chunk_size.max(1), file);
    let mut written = 0u64;

    let result = async {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        Ok::<_, TransportError>(())
    }
    .await;

    if let Err(e) = result {
        debug!(path = %temp_path.display(), error = %e, "Removing partial download");
        fs::remove_file(&temp_path).await.ok();
        return Err(e);
    }

    fs::rename(&temp_path, dest).await?;
    info!(path = %dest.display(), bytes = written, "Download completed");
    Ok(written)
}
