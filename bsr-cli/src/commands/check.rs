//! check - List the versions a pipeline has not seen yet

use bsr_core::Version;
use bsr_state::StorageClient;
use log::info;

use crate::error::ResourceResult;

/// Versions at or after `current`, oldest first
///
/// Without a known `current` only the latest version is reported, so a
/// pipeline that has never seen a version starts from the newest one.
pub async fn check(
    storage: &StorageClient,
    current: Option<&Version>,
) -> ResourceResult<Vec<Version>> {
    let versions = storage.list_versions().await?;
    let window = versions_since(versions, current);
    info!("Reporting {} version(s) of {}", window.len(), storage.key());
    Ok(window)
}

fn versions_since(mut versions: Vec<Version>, current: Option<&Version>) -> Vec<Version> {
    let position = current.and_then(|current| {
        versions
            .iter()
            .position(|version| version.same_generation(current))
    });

    match position {
        Some(position) => versions.split_off(position),
        None => versions.pop().into_iter().collect(),
    }
}
