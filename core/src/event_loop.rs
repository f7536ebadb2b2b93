//! Reactors that exchanges are spawned on.
//!
//! # Design
//! An `EventLoop` is a handle to a single-threaded tokio runtime. Exchanges
//! spawned on it interleave cooperatively and only yield at I/O and timer
//! awaits. A loop either owns a background thread that drives it
//! ([`EventLoop::spawn`]) or borrows a runtime the caller already has
//! ([`EventLoop::from_handle`]), which is how tests inject their own.
//!
//! The process-wide default loop sits in a `OnceLock`, so concurrent first
//! use still starts exactly one runtime and one thread. It lives in a static
//! and is therefore never dropped or shut down.

use std::future::Future;
use std::io;
use std::sync::OnceLock;
use std::thread::JoinHandle;

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

const DEFAULT_LOOP_NAME: &str = "fetch-default-loop";

static DEFAULT_LOOP: OnceLock<EventLoop> = OnceLock::new();

/// The process-wide loop used when no other is given.
///
/// # Panics
/// Panics if the runtime or its thread cannot be created on first use.
pub fn default_loop() -> &'static EventLoop {
    DEFAULT_LOOP.get_or_init(|| {
        EventLoop::spawn(DEFAULT_LOOP_NAME).expect("failed to start the default event loop")
    })
}

/// A single-threaded reactor that runs fetch tasks.
#[derive(Debug)]
pub struct EventLoop {
    handle: Handle,
    driver: Option<Driver>,
}

#[derive(Debug)]
struct Driver {
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

impl EventLoop {
    /// Start a new current-thread runtime on a dedicated OS thread.
    ///
    /// The thread stops, and tasks still pending on it are dropped, when the
    /// returned loop is dropped.
    pub fn spawn(name: &str) -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (shutdown, stopped) = oneshot::channel::<()>();
        let thread_name = name.to_string();
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                tracing::debug!(loop_name = %thread_name, "event loop running");
                runtime.block_on(async {
                    let _ = stopped.await;
                });
                tracing::debug!(loop_name = %thread_name, "event loop stopped");
            })?;
        Ok(Self {
            handle,
            driver: Some(Driver { shutdown, thread }),
        })
    }

    /// Spawn onto a runtime owned by someone else.
    ///
    /// Dropping the loop leaves that runtime untouched.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            driver: None,
        }
    }

    /// Use the runtime driving the current task.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn current() -> Self {
        Self::from_handle(Handle::current())
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub(crate) fn spawn_task<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(task);
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            let _ = driver.shutdown.send(());
            if driver.thread.join().is_err() {
                tracing::error!("event loop thread panicked");
            }
        }
    }
}
