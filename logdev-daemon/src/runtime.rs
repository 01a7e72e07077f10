use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};

use logdev_core::{
    ChangeHandler, DispatchOutcome, Dispatcher, Notification, Timestamp, WatchConfig,
    WatchService,
};

use crate::backend::NotifyBackend;
use crate::devices::{DeviceKind, Devices};
use crate::error::{io_err, DaemonError};
use crate::paths::{logdev_root, socket_path, trailing_tick, READ_TIMEOUT};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Largest device read served in one request.
const DEVICE_READ_CHUNK: usize = 4096;

/// Forwards backend notifications into the worker queue so that handling
/// never runs on the watcher's own thread.
struct QueueHandler {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChangeHandler for QueueHandler {
    fn on_change(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("event queue closed; dropping notification");
        }
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, config: WatchConfig) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Arm the watch, then serve events and socket clients until stopped.
pub async fn run(home: PathBuf, config: WatchConfig) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let backend = Arc::new(NotifyBackend::new());
    let mut service = WatchService::new(config.clone(), backend)?;
    let dispatcher = service.dispatcher().clone();

    let (event_tx, event_rx) = mpsc::unbounded_channel::<Notification>();
    service.start_with_handler(Arc::new(QueueHandler { tx: event_tx }))?;

    let devices = Arc::new(Devices::new());
    let started_at_unix = unix_seconds_now();
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let worker_handle = {
        let shutdown = shutdown_tx.clone();
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            let result = worker_task(dispatcher, event_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let trailing_handle = {
        let shutdown = shutdown_tx.clone();
        let dispatcher = dispatcher.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let result = trailing_task(dispatcher, &config, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let config = config.clone();
        let dispatcher = dispatcher.clone();
        let devices = devices.clone();
        tokio::spawn(async move {
            let context = ClientContext {
                home,
                config,
                dispatcher,
                devices,
                shutdown_tx: shutdown.clone(),
                started_at_unix,
            };
            let result = socket_server_task(context, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (worker_result, trailing_result, socket_result, signal_result) =
        tokio::join!(worker_handle, trailing_handle, socket_handle, signal_handle);

    service.shutdown();

    handle_join("worker", worker_result)?;
    handle_join("trailing_edge", trailing_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Drain the event queue one notification at a time.
async fn worker_task(
    dispatcher: Arc<Dispatcher>,
    mut event_rx: mpsc::UnboundedReceiver<Notification>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let in_flight = Arc::new(AtomicBool::new(false));
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_event = event_rx.recv() => {
                let Some(notification) = maybe_event else { break };
                let dispatcher = dispatcher.clone();
                run_bounded("dispatch", READ_TIMEOUT, &in_flight, move || {
                    dispatcher.dispatch(&notification)
                })
                .await;
            }
        }
    }
    Ok(())
}

async fn trailing_task(
    dispatcher: Arc<Dispatcher>,
    config: &WatchConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    if !config.trailing_edge {
        let _ = shutdown_rx.recv().await;
        return Ok(());
    }

    let mut interval = tokio::time::interval(trailing_tick(config.debounce));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    let in_flight = Arc::new(AtomicBool::new(false));
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let dispatcher = dispatcher.clone();
                run_bounded("trailing flush", READ_TIMEOUT, &in_flight, move || {
                    dispatcher.flush_trailing(Timestamp::now())
                })
                .await;
            }
        }
    }
    Ok(())
}

/// What `run_bounded` did with a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepRun {
    Finished,
    TimedOut,
    /// An earlier step from the same task timed out and is still blocked.
    Skipped,
}

/// Clears the in-flight flag when the blocking step ends, panics included.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Run one blocking dispatch step, giving up on it after `timeout`.
/// Errors were already logged by the dispatcher.
///
/// `in_flight` stays set until the blocking step returns, even after the
/// caller gave up on it; while it is set, further steps are dropped instead
/// of parking more pool threads behind the stuck one.
async fn run_bounded<F>(
    label: &'static str,
    timeout: Duration,
    in_flight: &Arc<AtomicBool>,
    step: F,
) -> StepRun
where
    F: FnOnce() -> Result<DispatchOutcome, logdev_core::WatchError> + Send + 'static,
{
    if in_flight.swap(true, Ordering::AcqRel) {
        tracing::warn!(step = label, "previous step still blocked; skipping");
        return StepRun::Skipped;
    }

    let release = InFlight(in_flight.clone());
    let task = tokio::task::spawn_blocking(move || {
        let _release = release;
        step()
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => {
            match joined {
                Ok(Ok(outcome)) => tracing::trace!(step = label, ?outcome, "dispatch step finished"),
                Ok(Err(err)) => tracing::debug!(step = label, error = %err, "dispatch step failed"),
                Err(err) => tracing::error!(step = label, error = %err, "dispatch task join error"),
            }
            StepRun::Finished
        }
        Err(_) => {
            tracing::warn!(
                step = label,
                timeout_ms = timeout.as_millis() as u64,
                "dispatch step timed out",
            );
            StepRun::TimedOut
        }
    }
}

#[derive(Clone)]
struct ClientContext {
    home: PathBuf,
    config: WatchConfig,
    dispatcher: Arc<Dispatcher>,
    devices: Arc<Devices>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
}

async fn socket_server_task(
    context: ClientContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let root = logdev_root(&context.home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }

    let socket = socket_path(&context.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, context).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, context: ClientContext) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = handle_request(&request, &context);
        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

fn handle_request(request: &DaemonRequest, context: &ClientContext) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => DaemonResponse::ok(build_status_payload(
            &context.home,
            &context.config,
            &context.dispatcher,
            context.started_at_unix,
        )),
        "stop" => {
            let _ = context.shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        "read" => into_response(device_read(&context.devices, request)),
        "write" => into_response(device_write(&context.devices, request)),
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

fn into_response(result: Result<Value, DaemonError>) -> DaemonResponse {
    match result {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => DaemonResponse::error(err.to_string()),
    }
}

fn requested_device(request: &DaemonRequest) -> Result<DeviceKind, DaemonError> {
    request
        .device
        .as_deref()
        .ok_or_else(|| DaemonError::Protocol(format!("'{}' requires a device", request.cmd)))?
        .parse()
}

fn device_read(devices: &Devices, request: &DaemonRequest) -> Result<Value, DaemonError> {
    let kind = requested_device(request)?;
    let handle = devices.get(kind).open()?;
    let bytes = handle.read(request.offset.unwrap_or(0), DEVICE_READ_CHUNK);
    Ok(json!({
        "device": kind.as_str(),
        "bytes": bytes.len(),
        "content": String::from_utf8_lossy(bytes),
    }))
}

fn device_write(devices: &Devices, request: &DaemonRequest) -> Result<Value, DaemonError> {
    let kind = requested_device(request)?;
    let data = request.data.as_deref().unwrap_or_default();
    let handle = devices.get(kind).open()?;
    let written = handle.write(data.as_bytes())?;
    Ok(json!({ "device": kind.as_str(), "written": written }))
}

fn build_status_payload(
    home: &Path,
    config: &WatchConfig,
    dispatcher: &Dispatcher,
    started_at_unix: u64,
) -> Value {
    let last_read = dispatcher.last_report().map(|report| {
        json!({
            "bytes_read": report.bytes_read,
            "content": report.content_lossy(),
        })
    });

    json!({
        "running": true,
        "watch_path": dispatcher.path().display().to_string(),
        "debounce_ms": config.debounce.as_millis() as u64,
        "buffer_capacity": config.buffer_capacity,
        "trailing_edge": config.trailing_edge,
        "state": dispatcher.state(),
        "stats": dispatcher.stats(),
        "last_read": last_read,
        "started_at_unix": started_at_unix,
        "uptime_secs": unix_seconds_now().saturating_sub(started_at_unix),
        "socket": socket_path(home).display().to_string(),
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = logdev_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `RUST_LOG` picks the filter (default `info`); `LOGDEV_LOG_FORMAT=json`
/// switches to one JSON object per line.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOGDEV_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
