//! Generic HTTP request pipeline with typed results and race-free
//! cancellation.
//!
//! # Overview
//! A `Dispatcher` takes any `Requestable` value, builds a `WireRequest` on a
//! worker pool, hands it to a `Transport`, validates the status with
//! `StatusPolicy`, converts the body with a `DataConvertible` converter and
//! delivers the result on a single serial completion context. Every request
//! returns a `CancellableHandle` that can be cancelled at any point, even
//! before the transport operation exists.
//!
//! # Design
//! - The dispatcher is stateless per request and cheap to clone.
//! - The transport is a trait; `UreqTransport` is the bundled implementation.
//! - Converters are chosen at the call site by type, never by inspection.
//! - Every request completes exactly once, with a value or an `ApiError`.

pub mod codec;
pub mod completion;
pub mod config;
pub mod convert;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod http;
pub mod request;
pub mod status;
pub mod transport;
pub mod work;

mod download;

pub use codec::{JsonCodec, KeyCasing};
pub use completion::{CompletionLoop, CompletionQueue};
pub use config::{DispatcherConfig, TransportConfig};
pub use convert::{BytesConvertible, Convertible, DataConvertible, Empty, Json, MaybeBytes, RawBytes, Text};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{ApiError, ConversionError, StatusCodeError, TransportError, TransportErrorKind};
pub use handle::{Binder, CancellableHandle, HandleState, Operation};
pub use http::{HttpMethod, RequestOptions, ResponseEnvelope, WireRequest};
pub use request::{Endpoint, PostRequest, Request, Requestable};
pub use status::StatusPolicy;
pub use transport::{Transport, UreqTransport};
pub use work::{InFlight, NoWork, UnitOfWork, WorkGuard};
