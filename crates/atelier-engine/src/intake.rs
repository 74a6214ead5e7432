use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use atelier_contracts::image::EncodedImage;
use image::ImageFormat;

/// Upper bound on how long a clothing batch may spend reading from disk
/// before the whole upload is abandoned.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Reads one file and types it by content. The extension is only a
/// fallback for formats the sniffer does not know.
pub fn read_image(path: &Path) -> Result<EncodedImage> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mime = image::guess_format(&bytes)
        .ok()
        .and_then(mime_for_format)
        .or_else(|| mime_for_path(path));
    let Some(mime) = mime else {
        bail!("{} is not a recognized image", path.display());
    };
    Ok(EncodedImage::new(mime, bytes))
}

/// Reads every path on its own thread and reassembles the results in
/// input order. One failed read aborts the batch; a batch that overruns
/// `timeout` is abandoned rather than returned half-filled.
pub fn read_image_batch(paths: &[PathBuf], timeout: Duration) -> Result<Vec<EncodedImage>> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }

    let (tx, rx) = mpsc::channel();
    for (index, path) in paths.iter().cloned().enumerate() {
        let tx = tx.clone();
        thread::spawn(move || {
            let _ = tx.send((index, read_image(&path)));
        });
    }
    drop(tx);

    let deadline = Instant::now() + timeout;
    let mut slots: Vec<Option<EncodedImage>> = vec![None; paths.len()];
    let mut filled = 0usize;
    while filled < slots.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("clothing batch timed out after {}s", timeout.as_secs());
        }
        match rx.recv_timeout(remaining) {
            Ok((index, Ok(image))) => {
                slots[index] = Some(image);
                filled += 1;
            }
            Ok((_, Err(err))) => return Err(err).context("clothing batch aborted"),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                bail!("clothing batch timed out after {}s", timeout.as_secs());
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                bail!("clothing batch reader exited early");
            }
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

fn mime_for_format(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        _ => None,
    }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
