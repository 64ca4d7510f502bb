// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fixtures for tests that touch the kernel networking stack.
//!
//! Everything here panics on failure: a test that can't set up its environment can't say
//! anything useful.

use caps::{CapSet, Capability};
use nix::sched::CloneFlags;
use rtnetlink::NetworkNamespace;
use std::fs::File;
use std::future::Future;
use std::panic::{UnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Fixture which runs the supplied function with _additional_ granted capabilities.
///
/// Capabilities raised here are dropped again afterwards, even if the function panics. Threads
/// spawned by the function inherit them.
pub fn with_caps<F: UnwindSafe + FnOnce() -> T, T>(
    caps: impl IntoIterator<Item = Capability>,
) -> impl FnOnce(F) -> T {
    move |f: F| {
        let current = match caps::read(None, CapSet::Effective) {
            Ok(current) => current,
            Err(err) => {
                error!("caps error: {err}");
                panic!("caps error: {err}");
            }
        };
        let raised: Vec<_> = caps
            .into_iter()
            .filter(|cap| !current.contains(cap))
            .collect();
        for cap in &raised {
            caps::raise(None, CapSet::Effective, *cap)
                .unwrap_or_else(|err| panic!("unable to raise capability {cap}: {err}"));
        }
        let ret = catch_unwind(f);
        for cap in &raised {
            caps::drop(None, CapSet::Effective, *cap)
                .unwrap_or_else(|err| panic!("unable to drop capability {cap}: {err}"));
        }
        match ret {
            Ok(ret) => ret,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

fn block_on<Fut: Future>(fut: Fut) -> Fut::Output {
    #[allow(clippy::expect_used)] // the inability to start tokio is fatal
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .expect("failed to build tokio runtime");
    runtime.block_on(fut)
}

/// A named network namespace which lives as long as this value.
///
/// Creating and deleting namespaces requires `CAP_SYS_ADMIN`.
#[derive(Debug)]
pub struct ScopedNetns {
    name: String,
    path: PathBuf,
}

impl ScopedNetns {
    /// Create the namespace `name`, bound under `/run/netns`.
    ///
    /// # Panics
    ///
    /// If the namespace can't be created, for instance because it already exists.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let created = name.clone();
        with_caps([Capability::CAP_SYS_ADMIN])(|| {
            block_on(async move {
                if let Err(err) = NetworkNamespace::add(created.clone()).await {
                    panic!("failed to create network namespace {created}: {err}");
                }
            });
        });
        debug!("Created network namespace {name}");
        Self {
            path: PathBuf::from(format!("/run/netns/{name}")),
            name,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedNetns {
    fn drop(&mut self) {
        let name = self.name.clone();
        with_caps([Capability::CAP_SYS_ADMIN])(|| {
            block_on(async move {
                if let Err(err) = NetworkNamespace::del(name.clone()).await {
                    error!("failed to remove network namespace {name}: {err}");
                }
            });
        });
    }
}

/// Run an (async) function or closure in another network namespace.
///
/// This spawns a thread, moves it into `netns` and drives `exec` on a thread local tokio
/// runtime. Threads spawned by `exec` start in `netns` too.
///
/// # Panics
///
/// * If the thread can't be spawned or can't enter `netns`
/// * If the provided function / closure panics
pub fn in_netns<Exec, Fut, Out>(netns: &Path, exec: Exec) -> Out
where
    Exec: (FnOnce() -> Fut) + Send + 'static,
    Fut: Future<Output = Out>,
    Out: Send + 'static,
{
    let path = netns.to_path_buf();
    let thread = std::thread::Builder::new()
        .name(format!("netns-{}", path.display()))
        .spawn(move || {
            let file = File::open(&path)
                .unwrap_or_else(|err| panic!("failed to open {}: {err}", path.display()));
            if let Err(err) = nix::sched::setns(&file, CloneFlags::CLONE_NEWNET) {
                panic!("failed to enter {}: {err}", path.display());
            }
            block_on(exec())
        })
        .unwrap_or_else(|err| panic!("failed to spawn netns thread: {err}"));
    match thread.join() {
        Ok(out) => out,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
