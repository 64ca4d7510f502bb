// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Network namespace handles and the executor that runs work inside them.
//!
//! The network namespace is an attribute of an OS thread, not of a process or of an async task.
//! [`NetnsExecutor`] owns a small pool of dedicated threads, each with its own single-threaded
//! tokio runtime. A job borrows one thread exclusively: the thread enters the target namespace,
//! opens a netlink socket there, drives the job to completion and goes back home before it
//! accepts another job.

use crossbeam_channel::{Receiver, Sender};
use futures::FutureExt;
use nix::sched::{CloneFlags, setns};
use rtnetlink::Handle;
use std::fmt::{Debug, Formatter};
use std::fs::File;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
#[allow(unused)]
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum NetnsError {
    #[error("Failed to open network namespace {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to enter network namespace {path}: {source}")]
    Enter {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
    /// The worker could not go back to its namespace. It has been retired.
    #[error("Failed to restore the namespace of a worker thread: {0}")]
    Restore(nix::Error),
    #[error("Failed to open netlink socket in {path}: {source}")]
    Netlink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Work in network namespace {0} panicked")]
    Panicked(PathBuf),
    #[error("Failed to spawn namespace worker: {0}")]
    Spawn(std::io::Error),
    #[error("No namespace worker is left")]
    ExecutorGone,
}

/// An open handle on a network namespace.
///
/// Holding the file keeps the namespace alive and makes it reachable even if its bind mount
/// goes away.
#[derive(Clone)]
pub struct Netns {
    path: PathBuf,
    file: Arc<File>,
}

impl Debug for Netns {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Netns({})", self.path.display())
    }
}

impl Netns {
    /// Open the namespace bound at `path`, typically `/run/netns/<name>`.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NetnsError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| NetnsError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            file: Arc::new(file),
        })
    }

    /// The namespace of the calling thread.
    ///
    /// # Errors
    ///
    /// Fails if procfs is not available.
    pub fn current() -> Result<Self, NetnsError> {
        Self::open("/proc/thread-self/ns/net")
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    fn enter(&self) -> Result<(), NetnsError> {
        setns(self.file.as_ref(), CloneFlags::CLONE_NEWNET).map_err(|source| NetnsError::Enter {
            path: self.path.clone(),
            source,
        })
    }
}

/// A job handed to a worker. It returns false if the worker must not be reused.
type Job = Box<dyn FnOnce(&Runtime, &Netns) -> bool + Send>;

/// Pool of OS threads dedicated to namespace-switched work.
#[derive(Debug)]
pub struct NetnsExecutor {
    jobs: Sender<Job>,
}

impl NetnsExecutor {
    /// Spawn `workers` threads (at least one).
    ///
    /// # Errors
    ///
    /// Fails if a thread can't be spawned.
    pub fn new(workers: usize) -> Result<Self, NetnsError> {
        let (jobs, queue) = crossbeam_channel::unbounded::<Job>();
        for n in 0..workers.max(1) {
            let queue = queue.clone();
            std::thread::Builder::new()
                .name(format!("netns-worker-{n}"))
                .spawn(move || worker(&queue))
                .map_err(NetnsError::Spawn)?;
        }
        Ok(Self { jobs })
    }

    /// Run `exec` with a netlink handle opened inside `netns`, on a thread switched into it.
    ///
    /// The thread is switched back before it is handed to anybody else, whether `exec` succeeds,
    /// fails or panics. The caller only awaits the outcome; it never changes namespace itself.
    ///
    /// # Errors
    ///
    /// Returns the error of `exec`, or a [`NetnsError`] if switching namespaces failed. A
    /// [`NetnsError::Restore`] means the outcome of `exec` is unreliable.
    pub async fn run_in<F, Fut, T, E>(&self, netns: &Netns, exec: F) -> Result<T, E>
    where
        F: FnOnce(Handle) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>>,
        T: Send + 'static,
        E: From<NetnsError> + Send + 'static,
    {
        let (reply, outcome) = oneshot::channel();
        let target = netns.clone();
        let job: Job = Box::new(move |runtime, home| {
            let (result, sane) = run_switched(runtime, home, &target, exec);
            if reply.send(result).is_err() {
                debug!("Caller gave up on work in {}", target.path.display());
            }
            sane
        });
        self.jobs
            .send(job)
            .map_err(|_| E::from(NetnsError::ExecutorGone))?;
        outcome.await.map_err(|_| E::from(NetnsError::ExecutorGone))?
    }
}

fn worker(queue: &Receiver<Job>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Namespace worker can't start a runtime: {e}");
            return;
        }
    };
    let home = match Netns::current() {
        Ok(home) => home,
        Err(e) => {
            error!("Namespace worker can't find its own namespace: {e}");
            return;
        }
    };
    while let Ok(job) = queue.recv() {
        if !job(&runtime, &home) {
            error!("Retiring namespace worker: its namespace is unknown");
            return;
        }
    }
}

/// Enter `target`, drive `exec`, go back to `home`. The boolean tells if we made it back.
fn run_switched<F, Fut, T, E>(
    runtime: &Runtime,
    home: &Netns,
    target: &Netns,
    exec: F,
) -> (Result<T, E>, bool)
where
    F: FnOnce(Handle) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<NetnsError>,
{
    if let Err(e) = target.enter() {
        // a failed setns leaves the thread where it was
        return (Err(e.into()), true);
    }
    let outcome = runtime.block_on(async {
        let (connection, handle, _) =
            rtnetlink::new_connection().map_err(|source| NetnsError::Netlink {
                path: target.path.clone(),
                source,
            })?;
        let connection = tokio::spawn(connection);
        // building the future may panic too
        let outcome = AssertUnwindSafe(async move { exec(handle).await })
            .catch_unwind()
            .await;
        connection.abort();
        outcome.map_err(|_| NetnsError::Panicked(target.path.clone()))
    });
    if let Err(e) = setns(home.file(), CloneFlags::CLONE_NEWNET) {
        error!(
            "Failed to leave network namespace {}: {e}",
            target.path.display()
        );
        return (Err(NetnsError::Restore(e).into()), false);
    }
    match outcome {
        Ok(result) => (result, true),
        Err(e) => (Err(e.into()), true),
    }
}
