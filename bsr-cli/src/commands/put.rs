//! out - Run a provisioning command and publish the resulting state

use std::path::Path;

use bsr_core::{OutParams, STATE_DIR_NAME, STATE_FILE_NAME, Source, Version, VersionResponse};
use bsr_state::StorageClient;
use chrono::Utc;
use log::{error, info, warn};

use crate::error::{ResourceError, ResourceResult};
use crate::provisioner::Provisioner;

/// Seed `<working_dir>/bbl-state` with the latest state, provision, then
/// upload the result
///
/// A state file left behind by a failed command is still uploaded before the
/// failure is reported. A teardown that removes the state file publishes no
/// new version: the key is marked removed, so an unpinned `in` finds nothing,
/// and the response echoes the version the teardown started from.
pub async fn put(
    storage: &StorageClient,
    provisioner: &dyn Provisioner,
    source: &Source,
    params: &OutParams,
    working_dir: &Path,
) -> ResourceResult<VersionResponse> {
    let state_dir = working_dir.join(STATE_DIR_NAME);
    let seeded = storage.download(&state_dir, None).await?;
    match &seeded {
        Some(version) => info!(
            "Starting from version {} of {}",
            version.reference,
            storage.key()
        ),
        None => info!("No state stored at {}, starting fresh", storage.key()),
    }

    let outcome = provisioner
        .run(working_dir, &state_dir, source, params)
        .await;

    let state_file = state_dir.join(STATE_FILE_NAME);
    let has_state = tokio::fs::try_exists(&state_file).await.map_err(|e| {
        ResourceError::Io(format!("Failed to inspect {}: {}", state_file.display(), e))
    })?;

    if has_state {
        let uploaded = match storage.upload(&state_dir).await {
            Ok(version) => decorate(storage, version),
            Err(err) => {
                if let Err(provision_error) = &outcome {
                    error!("{} also failed: {}", params.command, provision_error);
                }
                return Err(err.into());
            }
        };

        return match outcome {
            Ok(()) => Ok(VersionResponse::new(uploaded)),
            Err(source) => {
                warn!("Uploaded partial state as version {}", uploaded.reference);
                Err(ResourceError::ProvisioningPreserved {
                    command: params.command.clone(),
                    reference: uploaded.reference,
                    source,
                })
            }
        };
    }

    if let Err(source) = outcome {
        return Err(ResourceError::Provisioning {
            command: params.command.clone(),
            source,
        });
    }

    if params.is_teardown() {
        info!("{} removed the state file, nothing to publish", params.command);
        storage.remove().await?;
        return Ok(VersionResponse {
            version: seeded.map(|version| decorate(storage, version)),
        });
    }

    Err(ResourceError::MissingState {
        command: params.command.clone(),
        directory: state_dir.display().to_string(),
    })
}

fn decorate(storage: &StorageClient, version: Version) -> Version {
    version
        .with_name(storage.name().map(str::to_string))
        .with_updated(Utc::now())
}
