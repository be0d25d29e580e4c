//! Internal implementation details.

pub(crate) mod circular;

use std::future::Future;
use std::pin::Pin;

pub(crate) use circular::{next_id, BuilderId, Frame, ResolutionStack};

/// Boxed, sendable future used by async lambdas and interceptors.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
