//! bbl state resource core
//!
//! Data model shared by the storage layer and the resource protocol driver:
//! the `source` configuration, the `Version` of a stored state generation,
//! and the typed request/response envelopes of the `check`, `in` and `out` verbs.

pub mod request;
pub mod source;
pub mod version;

pub use request::{
    CheckRequest, InParams, InRequest, OutParams, OutRequest, Request, RequestError,
    VersionResponse,
};
pub use source::{STATE_DIR_NAME, STATE_FILE_NAME, Source, object_key_for};
pub use version::Version;
