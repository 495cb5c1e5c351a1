//! Background service thread: a dedicated tokio runtime serving the API

use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use efca_core::ShutdownToken;

/// How often the server checks the stop token.
const STOP_POLL: Duration = Duration::from_millis(100);

/// How a joined service ended.
#[derive(Debug)]
pub enum ServiceExit {
    /// Drained and stopped after a stop request.
    Stopped,
    /// Server loop returned an error or the thread panicked.
    Failed(anyhow::Error),
    /// Did not stop within the join timeout; the thread is abandoned.
    TimedOut,
}

/// Handle to the running API server thread.
pub struct ServiceHandle {
    addr: SocketAddr,
    stop: ShutdownToken,
    thread: Option<JoinHandle<()>>,
    done: mpsc::Receiver<Result<()>>,
}

/// Bind `host:port` and serve `app` on a new thread.
///
/// The bind happens on the caller's thread so an unavailable address is
/// reported here as an error. The server stops gracefully once `stop` is
/// requested.
pub fn start_background_service(
    host: &str,
    port: u16,
    app: Router,
    stop: ShutdownToken,
) -> Result<ServiceHandle> {
    let listener = std::net::TcpListener::bind((host, port))
        .with_context(|| format!("failed to bind API server to {host}:{port}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener")?;
    let addr = listener.local_addr().context("API listener has no address")?;

    let (tx, rx) = mpsc::channel();
    let server_stop = stop.clone();
    let thread = std::thread::Builder::new()
        .name("api-server".into())
        .spawn(move || {
            let result = serve(listener, app, server_stop);
            if let Err(e) = &result {
                log::error!("API server stopped with error: {e:#}");
            }
            // Receiver may already be gone if the handle was dropped
            let _ = tx.send(result);
        })
        .context("failed to spawn API server thread")?;

    log::info!("API server running at http://{addr}");
    Ok(ServiceHandle {
        addr,
        stop,
        thread: Some(thread),
        done: rx,
    })
}

fn serve(listener: std::net::TcpListener, app: Router, stop: ShutdownToken) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("api-worker")
        .enable_all()
        .build()
        .context("failed to build API runtime")?;

    rt.block_on(async move {
        let listener =
            tokio::net::TcpListener::from_std(listener).context("failed to adopt API listener")?;
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_stop(stop))
            .await
            .context("API server failed")
    })
}

async fn wait_for_stop(stop: ShutdownToken) {
    while !stop.is_requested() {
        tokio::time::sleep(STOP_POLL).await;
    }
    log::debug!("API server draining connections");
}

impl ServiceHandle {
    /// Address actually bound (resolves port 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Ask the server to stop. Same atomic store as [`ShutdownToken::request`].
    pub fn request_stop(&self) {
        self.stop.request();
    }

    /// Whether the server thread is still alive.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Wait up to `timeout` for the server thread to finish.
    pub fn join(mut self, timeout: Duration) -> ServiceExit {
        match self.done.recv_timeout(timeout) {
            Ok(result) => {
                if let Some(thread) = self.thread.take() {
                    // Already sent its result, so this returns promptly
                    let _ = thread.join();
                }
                match result {
                    Ok(()) => ServiceExit::Stopped,
                    Err(e) => ServiceExit::Failed(e),
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => ServiceExit::TimedOut,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                ServiceExit::Failed(anyhow::anyhow!("API server thread panicked"))
            }
        }
    }
}
