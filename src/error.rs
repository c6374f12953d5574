// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error type shared by the partitioner, the reducers and the estimators.

use std::any::Any;
use thiserror::Error;

/// Errors reported by this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A precondition on the arguments doesn't hold (zero workers, zero
    /// samples, unsupported configuration). Reported before any thread is
    /// spawned.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the violated precondition.
        message: String,
    },

    /// No sample landed in a region of non-zero density, so the centroid is
    /// undefined.
    #[error("total mass is zero after {samples} samples, the centroid is undefined")]
    ZeroMass {
        /// Number of samples that were drawn.
        samples: u64,
    },

    /// The density produced a NaN or an infinite value on some sample, so the
    /// centroid is undefined.
    #[error("total mass is {mass} after {samples} samples, the centroid is undefined")]
    NonFiniteMass {
        /// Accumulated mass.
        mass: f64,
        /// Number of samples that were drawn.
        samples: u64,
    },

    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread {worker}: {source}")]
    ResourceExhausted {
        /// Name of the worker that couldn't be spawned.
        worker: String,
        /// Underlying error returned by the thread builder.
        #[source]
        source: std::io::Error,
    },

    /// A worker thread panicked. All other workers were joined before this
    /// error was returned.
    #[error("worker {worker} panicked: {message}")]
    WorkerPanicked {
        /// Name of the worker that panicked.
        worker: String,
        /// Panic message, if the payload was a string.
        message: String,
    },
}

/// Result type using [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Converts the payload of a panicked thread.
    pub(crate) fn worker_panicked(worker: impl Into<String>, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::WorkerPanicked {
            worker: worker.into(),
            message,
        }
    }
}
