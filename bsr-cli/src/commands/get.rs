//! in - Materialize a stored version on local disk

use std::path::Path;

use bsr_core::{Version, VersionResponse};
use bsr_state::StorageClient;
use log::info;

use crate::error::ResourceResult;

/// Download `version` (or the latest version) into `target_dir`
pub async fn get(
    storage: &StorageClient,
    version: Option<&Version>,
    target_dir: &Path,
) -> ResourceResult<VersionResponse> {
    let reference = version.map(|version| version.reference.as_str());
    match storage.download(target_dir, reference).await? {
        Some(version) => Ok(VersionResponse::new(version)),
        None => {
            info!("No state has been stored at {} yet", storage.key());
            Ok(VersionResponse::empty())
        }
    }
}
