//! The boundary to whatever actually performs HTTP.
//!
//! A transport takes a `WireRequest`, starts the exchange somewhere off the
//! caller's thread, returns an `Operation` that can cancel it, and later calls
//! the completion exactly once with a `ResponseEnvelope`. A cancelled
//! operation still completes, with a `TransportErrorKind::Cancelled` error.

mod ureq_transport;

pub use ureq_transport::UreqTransport;

use tempfile::TempPath;

use crate::handle::Operation;
use crate::http::{RequestOptions, ResponseEnvelope, WireRequest};

/// Receives the envelope of a data request.
pub type DataCompletion = Box<dyn FnOnce(ResponseEnvelope<Vec<u8>>) + Send>;

/// Receives the envelope of a download; the body is a temporary file owned by
/// the transport until the completion takes it.
pub type DownloadCompletion = Box<dyn FnOnce(ResponseEnvelope<TempPath>) + Send>;

pub trait Transport: Send + Sync + 'static {
    /// Start a request whose body is returned in memory.
    fn submit(
        &self,
        request: WireRequest,
        options: RequestOptions,
        completion: DataCompletion,
    ) -> Box<dyn Operation>;

    /// Start a request whose body is streamed to a temporary file.
    fn download(
        &self,
        request: WireRequest,
        options: RequestOptions,
        completion: DownloadCompletion,
    ) -> Box<dyn Operation>;
}
