use std::{
    fs::{File, create_dir_all},
    io::{Cursor, copy},
    path::{Path, PathBuf},
};

use log::info;
use reqwest::blocking::get;

/// Mask R-CNN checkpoint trained on COCO, the starting point for fine tuning.
pub const COCO_WEIGHTS_URL: &str =
    "https://github.com/matterport/Mask_RCNN/releases/download/v2.0/mask_rcnn_coco.h5";

#[derive(Debug, thiserror::Error)]
pub enum WeightsError {
    #[error("failed to write weights to {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to download weights from {url}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("downloaded weights from {url} are empty")]
    Empty { url: String },
}

fn download_bytes(url: &str) -> Result<Vec<u8>, WeightsError> {
    let download = |source| WeightsError::Download {
        url: url.to_string(),
        source,
    };

    let response = get(url).and_then(|r| r.error_for_status()).map_err(download)?;
    let bytes = response.bytes().map_err(download)?;

    Ok(bytes.to_vec())
}

fn save_bytes_to_file(bytes: &[u8], path: &Path) -> Result<u64, WeightsError> {
    let io = |source| WeightsError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        create_dir_all(parent).map_err(io)?;
    }

    let mut file = File::create(path).map_err(io)?;
    copy(&mut Cursor::new(bytes), &mut file).map_err(io)
}

/// Downloads `url` to `path` unless a file is already there.
///
/// # Errors
///
/// When the download fails, returns no bytes, or the file can't be written. An empty
/// download leaves no file behind.
pub fn resolve_weights_from(path: impl AsRef<Path>, url: &str) -> Result<PathBuf, WeightsError> {
    let path = path.as_ref();

    if path.exists() {
        info!("Using weights at {}", path.display());
        return Ok(path.to_path_buf());
    }

    info!("Downloading pretrained weights from {} to {}", url, path.display());
    let bytes = download_bytes(url)?;

    if bytes.is_empty() {
        return Err(WeightsError::Empty { url: url.to_string() });
    }

    let byte_count = save_bytes_to_file(&bytes, path)?;
    info!("Saved {} bytes of weights", byte_count);

    Ok(path.to_path_buf())
}

/// Returns `path` when the COCO weights exist there, otherwise downloads them first.
pub fn resolve_weights(path: impl AsRef<Path>) -> Result<PathBuf, WeightsError> {
    resolve_weights_from(path, COCO_WEIGHTS_URL)
}
