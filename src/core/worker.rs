// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Handles to scoped worker threads.

use crate::error::{Error, Result};
use crate::macros::{log_debug, log_error};
#[cfg(test)]
use std::cell::Cell;
use std::thread::{Builder, Scope, ScopedJoinHandle};

#[cfg(test)]
thread_local! {
    /// Number of spawns from this thread that still succeed before spawning
    /// starts failing. `None` means spawning never fails on purpose.
    static SPAWNS_BEFORE_FAILURE: Cell<Option<usize>> = const { Cell::new(None) };
}

/// A stack size no 64-bit address space can map, so that the operating
/// system refuses to create the thread.
const UNMAPPABLE_STACK_SIZE: usize = usize::MAX >> 4;

/// Runs `f` with spawning from the current thread limited to `successes`
/// threads. Every later spawn from this thread fails as if the operating system
/// ran out of resources. Threads spawned by those workers are not affected.
#[cfg(test)]
pub(crate) fn with_spawn_limit<R>(successes: usize, f: impl FnOnce() -> R) -> R {
    SPAWNS_BEFORE_FAILURE.with(|budget| budget.set(Some(successes)));
    let result = f();
    SPAWNS_BEFORE_FAILURE.with(|budget| budget.set(None));
    result
}

/// Thread builder for a worker named `name`.
fn builder(name: String) -> Builder {
    let builder = Builder::new().name(name);
    if spawn_limit_reached() {
        builder.stack_size(UNMAPPABLE_STACK_SIZE)
    } else {
        builder
    }
}

/// Consumes one spawn of the limit set by [`with_spawn_limit()`], and returns
/// whether the limit was already reached.
#[cfg(test)]
fn spawn_limit_reached() -> bool {
    SPAWNS_BEFORE_FAILURE.with(|budget| {
        let remaining = budget.get();
        budget.set(remaining.map(|n| n.saturating_sub(1)));
        remaining == Some(0)
    })
}

#[cfg(not(test))]
fn spawn_limit_reached() -> bool {
    false
}

/// Ownership token for a spawned worker thread.
///
/// The spawner owns the handle until it calls [`join()`](Self::join), which is
/// the only way to observe the worker's completion and to retrieve its
/// output.
pub struct WorkerHandle<'scope, T> {
    /// Thread name, used in logs and errors.
    name: String,
    /// Thread handle object.
    handle: ScopedJoinHandle<'scope, T>,
}

impl<'scope, T: Send + 'scope> WorkerHandle<'scope, T> {
    /// Spawns a named thread in the given scope.
    ///
    /// A failure of the operating system to create the thread is reported as
    /// [`Error::ResourceExhausted`].
    pub fn spawn<'env, F>(scope: &'scope Scope<'scope, 'env>, name: String, f: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'scope,
    {
        match builder(name.clone()).spawn_scoped(scope, f) {
            Ok(handle) => {
                log_debug!("[{name}] Spawned");
                Ok(Self { name, handle })
            }
            Err(source) => {
                log_error!("[{name}] Failed to spawn: {source}");
                Err(Error::ResourceExhausted {
                    worker: name,
                    source,
                })
            }
        }
    }

    /// Name given to this worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the worker to finish and returns its output.
    ///
    /// If the worker panicked, the panic is converted into
    /// [`Error::WorkerPanicked`].
    pub fn join(self) -> Result<T> {
        match self.handle.join() {
            Ok(output) => {
                log_debug!("[{}] Joined", self.name);
                Ok(output)
            }
            Err(payload) => {
                let err = Error::worker_panicked(self.name, payload);
                log_error!("Joined a panicked worker: {err}");
                Err(err)
            }
        }
    }
}

/// Joins all the given handles in order, even after a failure, and returns the
/// outputs or the first error.
pub fn join_all<'scope, T: Send + 'scope>(
    handles: impl IntoIterator<Item = WorkerHandle<'scope, T>>,
) -> Result<Vec<T>> {
    let mut outputs = Vec::new();
    let mut first_error = None;
    for handle in handles {
        match handle.join() {
            Ok(output) => outputs.push(output),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(outputs),
    }
}
