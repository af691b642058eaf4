//! The request pipeline.
//!
//! # Design
//! `Dispatcher` returns a `CancellableHandle` immediately and does everything
//! else elsewhere:
//!
//! 1. a worker from the tokio pool builds the `WireRequest` and submits it to
//!    the transport, then binds the returned operation into the handle;
//! 2. the transport's completion (on a transport thread) checks for a
//!    transport error, validates the status and converts the body;
//! 3. the result is posted to the completion context and the caller's
//!    callback runs there.
//!
//! A `Responder` owns the caller's callback. It is consumed by delivering a
//! result, and if it is dropped undelivered (a transport that never calls
//! back, a worker task torn down) it delivers `InvariantViolation` itself, so
//! every request completes exactly once. The dispatcher holds no per-request
//! state and is cheap to clone.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tempfile::TempPath;
use tokio::runtime::{Handle, Runtime};
use uuid::Uuid;

use crate::codec::JsonCodec;
use crate::completion::CompletionQueue;
use crate::config::{DispatcherConfig, TransportConfig};
use crate::convert::{Convertible, DataConvertible, Json};
use crate::download;
use crate::error::{ApiError, Result};
use crate::handle::{Binder, CancellableHandle};
use crate::http::{RequestOptions, ResponseEnvelope, WireRequest};
use crate::request::Requestable;
use crate::status::StatusPolicy;
use crate::transport::{Transport, UreqTransport};
use crate::work::{InFlight, UnitOfWork, WorkGuard};

type Callback<T> = Box<dyn FnOnce(Result<T>) + Send>;

/// Sends requests and delivers typed results on the completion context.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    workers: Workers,
    completions: CompletionQueue,
    scopes: Arc<Scopes>,
    codec: JsonCodec,
}

impl Dispatcher {
    /// Dispatcher over `UreqTransport` with an owned worker pool and
    /// completion thread, configured from the environment.
    pub fn new() -> io::Result<Self> {
        DispatcherBuilder::new(DispatcherConfig::from_env())
            .transport(UreqTransport::new(TransportConfig::from_env()))
            .build()
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Requests whose completion has not run yet.
    pub fn in_flight(&self) -> usize {
        self.inner.scopes.in_flight.count()
    }

    pub fn codec(&self) -> JsonCodec {
        self.inner.codec
    }

    /// Send `request` and convert the body with `converter`.
    pub fn send<R, C, F>(&self, request: R, converter: C, completion: F) -> CancellableHandle
    where
        R: Requestable,
        C: DataConvertible,
        F: FnOnce(Result<C::Output>) + Send + 'static,
    {
        let handle = CancellableHandle::new();
        let binder = handle.binder();
        let id = Uuid::new_v4();
        let responder = self.responder(id, completion);
        let transport = Arc::clone(&self.inner.transport);

        self.inner.workers.spawn(move || {
            let (wire, options) = match prepare(id, &request) {
                Ok(prepared) => prepared,
                Err(err) => return responder.deliver(Err(err)),
            };
            let on_complete = {
                let binder = binder.clone();
                Box::new(move |envelope: ResponseEnvelope<Vec<u8>>| {
                    binder.complete();
                    let result = settle(id, envelope, &options)
                        .and_then(|body| converter.convert(Some(body)).map_err(ApiError::from));
                    responder.deliver(result);
                })
            };
            let operation = transport.submit(wire, options, on_complete);
            bind(id, &binder, operation);
        });
        handle
    }

    /// Send `request` with the converter the output type `T` names.
    pub fn fetch<T, R, F>(&self, request: R, completion: F) -> CancellableHandle
    where
        T: Convertible,
        R: Requestable,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        self.send(request, T::Converter::default(), completion)
    }

    /// Send `request` and decode a JSON body with the dispatcher's codec.
    pub fn send_json<T, R, F>(&self, request: R, completion: F) -> CancellableHandle
    where
        T: DeserializeOwned + Send + 'static,
        R: Requestable,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        self.send(request, Json::<T>::new(self.inner.codec), completion)
    }

    /// Stream the body to disk and replace `destination` with it. With
    /// `unzip` the body is treated as a zip archive and `destination` becomes
    /// a directory holding its contents. Completes with the destination path.
    pub fn download<R, F>(&self, request: R, destination: impl Into<PathBuf>, unzip: bool, completion: F) -> CancellableHandle
    where
        R: Requestable,
        F: FnOnce(Result<PathBuf>) + Send + 'static,
    {
        let handle = CancellableHandle::new();
        let binder = handle.binder();
        let id = Uuid::new_v4();
        let responder = self.responder(id, completion);
        let transport = Arc::clone(&self.inner.transport);
        let destination = destination.into();

        self.inner.workers.spawn(move || {
            let (wire, options) = match prepare(id, &request) {
                Ok(prepared) => prepared,
                Err(err) => return responder.deliver(Err(err)),
            };
            let on_complete = {
                let binder = binder.clone();
                Box::new(move |envelope: ResponseEnvelope<TempPath>| {
                    binder.complete();
                    let result = settle(id, envelope, &options)
                        .and_then(|staged| download::install(staged, &destination, unzip));
                    responder.deliver(result);
                })
            };
            let operation = transport.download(wire, options, on_complete);
            bind(id, &binder, operation);
        });
        handle
    }

    fn responder<T, F>(&self, id: Uuid, completion: F) -> Responder<T>
    where
        T: Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let guard = WorkGuard::begin(self.inner.scopes.clone(), id.to_string());
        Responder {
            id,
            pending: Some(Pending {
                callback: Box::new(completion),
                queue: self.inner.completions.clone(),
                guard,
            }),
        }
    }
}

fn prepare<R: Requestable>(id: Uuid, request: &R) -> Result<(WireRequest, RequestOptions)> {
    let wire = request.build()?;
    let options = request.options().unwrap_or_default();
    tracing::debug!(
        target: "courier",
        request = %id,
        method = %wire.method(),
        url = wire.url(),
        follow_redirects = options.follow_redirects,
        "submitting request"
    );
    Ok((wire, options))
}

fn bind(id: Uuid, binder: &Binder, operation: Box<dyn crate::handle::Operation>) {
    if binder.bind(operation).is_err() {
        tracing::warn!(target: "courier", request = %id, "operation already bound; ignoring rebind");
    }
}

/// Turn the transport's envelope into the body to convert, or the error to
/// report.
fn settle<B>(id: Uuid, envelope: ResponseEnvelope<B>, options: &RequestOptions) -> Result<B> {
    if let Some(error) = envelope.error {
        tracing::debug!(target: "courier", request = %id, kind = %error.kind(), cause = error.message(), "transport error");
        return Err(error.into());
    }
    let Some(body) = envelope.body else {
        tracing::error!(target: "courier", request = %id, status = envelope.status, "transport returned neither a body nor an error");
        return Err(ApiError::InvariantViolation);
    };
    StatusPolicy::validate(envelope.status, options)?;
    Ok(body)
}

struct Pending<T> {
    callback: Callback<T>,
    queue: CompletionQueue,
    guard: WorkGuard,
}

/// Owns a request's callback until a result is delivered.
struct Responder<T: Send + 'static> {
    id: Uuid,
    pending: Option<Pending<T>>,
}

impl<T: Send + 'static> Responder<T> {
    fn deliver(mut self, result: Result<T>) {
        self.post(result);
    }

    fn post(&mut self, result: Result<T>) {
        let Some(Pending {
            callback,
            queue,
            guard,
        }) = self.pending.take()
        else {
            return;
        };
        let id = self.id;
        let posted = queue.post(move || {
            callback(result);
            drop(guard);
        });
        if !posted {
            tracing::warn!(target: "courier", request = %id, "completion context is gone; result dropped");
        }
    }
}

impl<T: Send + 'static> Drop for Responder<T> {
    fn drop(&mut self) {
        if self.pending.is_some() {
            tracing::error!(target: "courier", request = %self.id, "request abandoned without a result");
            self.post(Err(ApiError::InvariantViolation));
        }
    }
}

/// In-flight counting plus the host's own unit of work.
struct Scopes {
    in_flight: InFlight,
    host: Option<Arc<dyn UnitOfWork>>,
}

impl UnitOfWork for Scopes {
    fn begin(&self, label: &str) {
        self.in_flight.begin(label);
        if let Some(host) = &self.host {
            host.begin(label);
        }
    }

    fn end(&self, label: &str) {
        if let Some(host) = &self.host {
            host.end(label);
        }
        self.in_flight.end(label);
    }
}

/// Pool that builds and submits requests. Building may serialize and
/// submitting may block, so jobs run on the runtime's blocking threads.
struct Workers {
    handle: Handle,
    owned: Option<Runtime>,
}

impl Workers {
    fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        self.handle.spawn_blocking(job);
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        // Safe from async contexts too, unlike dropping the runtime.
        if let Some(runtime) = self.owned.take() {
            runtime.shutdown_background();
        }
    }
}

/// Assembles a `Dispatcher`; every part has a default.
#[derive(Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    transport: Option<Arc<dyn Transport>>,
    worker_handle: Option<Handle>,
    completions: Option<CompletionQueue>,
    unit_of_work: Option<Arc<dyn UnitOfWork>>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Run build/submit on an existing runtime instead of an owned pool.
    pub fn worker_handle(mut self, handle: Handle) -> Self {
        self.worker_handle = Some(handle);
        self
    }

    /// Deliver completions through a caller-driven queue instead of a
    /// dedicated thread.
    pub fn completion_queue(mut self, queue: CompletionQueue) -> Self {
        self.completions = Some(queue);
        self
    }

    pub fn unit_of_work(mut self, work: impl UnitOfWork) -> Self {
        self.unit_of_work = Some(Arc::new(work));
        self
    }

    pub fn build(self) -> io::Result<Dispatcher> {
        let workers = match self.worker_handle {
            Some(handle) => Workers {
                handle,
                owned: None,
            },
            None => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(self.config.worker_threads.max(1))
                    .thread_name("courier-worker")
                    .build()?;
                Workers {
                    handle: runtime.handle().clone(),
                    owned: Some(runtime),
                }
            }
        };
        let completions = match self.completions {
            Some(queue) => queue,
            None => CompletionQueue::spawn_thread(&self.config.completion_thread_name)?.0,
        };
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(UreqTransport::default()));

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                transport,
                workers,
                completions,
                scopes: Arc::new(Scopes {
                    in_flight: InFlight::default(),
                    host: self.unit_of_work,
                }),
                codec: JsonCodec::new(self.config.wire_casing),
            }),
        })
    }
}
