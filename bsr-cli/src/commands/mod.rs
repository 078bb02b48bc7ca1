//! The three resource verbs and their process adapters
//!
//! `check`, `get` and `put` hold the verb logic against a `StorageClient`.
//! The `run_*` adapters read the request from `input`, build the storage
//! client from its source and write the JSON response to `output`, which the
//! binaries wire to standard input and output.

mod check;
mod get;
mod put;

pub use check::check;
pub use get::get;
pub use put::put;

use std::io::{Read, Write};
use std::path::Path;

use bsr_core::{CheckRequest, InRequest, OutRequest, Request};
use bsr_state::StorageClient;
use serde::Serialize;

use crate::error::{ResourceError, ResourceResult};
use crate::provisioner::Provisioner;

/// `check`: print the versions since the requested one
pub async fn run_check<R: Read, W: Write>(input: R, output: W) -> ResourceResult<()> {
    let request: CheckRequest = read_request(input)?;
    let storage = StorageClient::from_source(&request.source).await?;
    let versions = check(&storage, request.version.as_ref()).await?;
    write_response(output, &versions)
}

/// `in`: download the requested version into `target_dir`
pub async fn run_in<R: Read, W: Write>(
    input: R,
    output: W,
    target_dir: &Path,
) -> ResourceResult<()> {
    let request: InRequest = read_request(input)?;
    let storage = StorageClient::from_source(&request.source).await?;
    let response = get(&storage, request.version.as_ref(), target_dir).await?;
    write_response(output, &response)
}

/// `out`: provision in `working_dir` and publish the resulting state
pub async fn run_out<R: Read, W: Write>(
    input: R,
    output: W,
    working_dir: &Path,
    provisioner: &dyn Provisioner,
) -> ResourceResult<()> {
    let request: OutRequest = read_request(input)?;
    let source = request.effective_source();
    let storage = StorageClient::from_source(&source).await?;
    let response = put(&storage, provisioner, &source, &request.params, working_dir).await?;
    write_response(output, &response)
}

fn read_request<T: Request, R: Read>(mut input: R) -> ResourceResult<T> {
    let mut raw = Vec::new();
    input
        .read_to_end(&mut raw)
        .map_err(ResourceError::ReadRequest)?;
    Ok(T::from_slice(&raw)?)
}

fn write_response<W: Write, T: Serialize>(mut output: W, response: &T) -> ResourceResult<()> {
    serde_json::to_writer(&mut output, response)
        .map_err(|e| ResourceError::Output(e.to_string()))?;
    output
        .flush()
        .map_err(|e| ResourceError::Output(e.to_string()))
}
