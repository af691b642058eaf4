//! Blocking `ureq` agents driven from transport-owned threads.
//!
//! Each operation runs on its own named thread and reports exactly one
//! envelope. Cancellation is a flag checked before connecting, once the
//! response head arrives, and between body chunks.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use ureq::http;
use ureq::{Agent, Body};

use super::{DataCompletion, DownloadCompletion, Transport};
use crate::config::TransportConfig;
use crate::error::{TransportError, TransportErrorKind};
use crate::handle::Operation;
use crate::http::{RequestOptions, ResponseEnvelope, WireRequest};

#[derive(Debug, Clone, Default)]
struct UreqOperation {
    cancelled: Arc<AtomicBool>,
}

impl Operation for UreqOperation {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// `Transport` backed by two `ureq` agents: one following redirects, one
/// returning 3xx responses untouched.
#[derive(Clone)]
pub struct UreqTransport {
    config: TransportConfig,
    following: Agent,
    direct: Agent,
}

impl UreqTransport {
    pub fn new(config: TransportConfig) -> Self {
        let following = agent(&config, config.max_redirects);
        let direct = agent(&config, 0);
        Self {
            config,
            following,
            direct,
        }
    }

    fn agent_for(&self, options: RequestOptions) -> Agent {
        if options.follow_redirects {
            self.following.clone()
        } else {
            self.direct.clone()
        }
    }

    /// Run `job` on a fresh thread and hand its result to `completion`.
    fn spawn<B, J>(&self, label: String, job: J, completion: Box<dyn FnOnce(ResponseEnvelope<B>) + Send>) -> Box<dyn Operation>
    where
        B: Send + 'static,
        J: FnOnce(&AtomicBool) -> Result<ResponseEnvelope<B>, TransportError> + Send + 'static,
    {
        let operation = UreqOperation::default();
        let cancelled = Arc::clone(&operation.cancelled);
        // Shared so a failed spawn can still complete the operation.
        let completion = Arc::new(Mutex::new(Some(completion)));
        let thread_completion = Arc::clone(&completion);

        let spawned = thread::Builder::new()
            .name("courier-transport".to_string())
            .spawn(move || {
                let envelope = job(&*cancelled).unwrap_or_else(ResponseEnvelope::failure);
                tracing::debug!(target: "courier", request = %label, status = envelope.status, "transport finished");
                if let Some(completion) = take(&thread_completion) {
                    completion(envelope);
                }
            });

        if let Err(err) = spawned {
            if let Some(completion) = take(&completion) {
                completion(ResponseEnvelope::failure(TransportError::new(
                    TransportErrorKind::Io,
                    format!("could not start transport thread: {err}"),
                )));
            }
        }
        Box::new(operation)
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl Transport for UreqTransport {
    fn submit(&self, request: WireRequest, options: RequestOptions, completion: DataCompletion) -> Box<dyn Operation> {
        let agent = self.agent_for(options);
        let chunk_size = self.config.read_chunk_size;
        let label = format!("{} {}", request.method(), request.url());
        self.spawn(
            label,
            move |cancelled| {
                let mut response = execute(&agent, request, cancelled)?;
                let status = response.status().as_u16();
                let mut body = Vec::new();
                copy_cancellable(&mut response.body_mut().as_reader(), &mut body, cancelled, chunk_size)?;
                Ok(ResponseEnvelope::success(status, body))
            },
            completion,
        )
    }

    fn download(&self, request: WireRequest, options: RequestOptions, completion: DownloadCompletion) -> Box<dyn Operation> {
        let agent = self.agent_for(options);
        let chunk_size = self.config.read_chunk_size;
        let temp_dir = self.config.temp_dir.clone();
        let label = format!("{} {}", request.method(), request.url());
        self.spawn(
            label,
            move |cancelled| {
                let mut response = execute(&agent, request, cancelled)?;
                let status = response.status().as_u16();
                let builder = {
                    let mut builder = tempfile::Builder::new();
                    builder.prefix("courier-download-");
                    builder
                };
                let staged = match &temp_dir {
                    Some(dir) => builder.tempfile_in(dir),
                    None => builder.tempfile(),
                }
                .map_err(io_error)?;
                let mut file = staged.as_file();
                copy_cancellable(&mut response.body_mut().as_reader(), &mut file, cancelled, chunk_size)?;
                file.flush().map_err(io_error)?;
                Ok(ResponseEnvelope::success(status, staged.into_temp_path()))
            },
            completion,
        )
    }
}

fn agent(config: &TransportConfig, max_redirects: u32) -> Agent {
    Agent::config_builder()
        .http_status_as_error(false)
        .max_redirects(max_redirects)
        .timeout_global(config.timeout)
        .build()
        .new_agent()
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

fn execute(agent: &Agent, request: WireRequest, cancelled: &AtomicBool) -> Result<http::Response<Body>, TransportError> {
    check_cancelled(cancelled)?;
    let (method, url, headers, body) = request.into_parts();
    let mut builder = http::Request::builder().method(method.as_str()).uri(url);
    for (name, value) in &headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let sent = match body {
        Some(body) => builder.body(body).map(|req| agent.run(req)),
        None => builder.body(()).map(|req| agent.run(req)),
    };
    let response = sent
        .map_err(|e| TransportError::new(TransportErrorKind::InvalidRequest, e.to_string()))?
        .map_err(transport_error)?;
    check_cancelled(cancelled)?;
    Ok(response)
}

fn check_cancelled(cancelled: &AtomicBool) -> Result<(), TransportError> {
    if cancelled.load(Ordering::SeqCst) {
        Err(TransportError::cancelled())
    } else {
        Ok(())
    }
}

fn copy_cancellable(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    cancelled: &AtomicBool,
    chunk_size: usize,
) -> Result<u64, TransportError> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        check_cancelled(cancelled)?;
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_error(e)),
        };
        writer.write_all(&buf[..n]).map_err(io_error)?;
        total += n as u64;
    }
}

fn io_error(err: io::Error) -> TransportError {
    TransportError::new(TransportErrorKind::Io, err.to_string())
}

fn transport_error(err: ureq::Error) -> TransportError {
    let kind = match &err {
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        ureq::Error::BadUri(_) => TransportErrorKind::InvalidRequest,
        _ => TransportErrorKind::Connection,
    };
    TransportError::new(kind, err.to_string())
}
