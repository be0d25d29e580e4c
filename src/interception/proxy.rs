//! Runtime method interception for already-built objects.
//!
//! Rust has no dynamic proxies, so a proxy is a hand-written wrapper that
//! implements the plugin trait and forwards each method through an
//! [`InterceptionChain`]. Installing the wrapper is an ordinary decorator.
//!
//! Synchronous methods go through [`InterceptionChain::call`]. Methods
//! returning futures go through [`InterceptionChain::call_async`], which runs
//! the whole chain inside the returned future: nothing happens until it is
//! polled, and every failure, from an interceptor or from the target,
//! surfaces at `.await`.
//!
//! # Examples
//!
//! ```rust
//! use ferrous_ioc::{BoxError, InterceptionChain, MethodCall, MethodInterceptor};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! trait Accounts: Send + Sync {
//!     fn balance(&self, id: u32) -> Result<u64, std::io::Error>;
//! }
//!
//! struct Ledger;
//! impl Accounts for Ledger {
//!     fn balance(&self, _id: u32) -> Result<u64, std::io::Error> {
//!         Ok(100)
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Counting(AtomicUsize);
//! impl MethodInterceptor for Counting {
//!     fn description(&self) -> String {
//!         "count calls".to_string()
//!     }
//!     fn before(&self, _call: &MethodCall<'_>) -> Result<(), BoxError> {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     }
//! }
//!
//! struct AccountsProxy {
//!     inner: Arc<dyn Accounts>,
//!     chain: InterceptionChain,
//! }
//!
//! impl Accounts for AccountsProxy {
//!     fn balance(&self, id: u32) -> Result<u64, std::io::Error> {
//!         self.chain
//!             .call("balance", || self.inner.balance(id))
//!             .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
//!     }
//! }
//!
//! let counter = Arc::new(Counting::default());
//! let proxy = AccountsProxy {
//!     inner: Arc::new(Ledger),
//!     chain: InterceptionChain::new("Accounts").with(counter.clone()),
//! };
//! assert_eq!(proxy.balance(1).unwrap(), 100);
//! assert_eq!(counter.0.load(Ordering::SeqCst), 1);
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::error::BoxError;

/// The method call an interceptor is observing.
#[derive(Debug, Clone, Copy)]
pub struct MethodCall<'a> {
    /// Name of the proxied type.
    pub target: &'a str,
    /// Name of the method being called.
    pub method: &'a str,
}

/// Hooks around a proxied method call.
///
/// `before` hooks run in registration order; `after_success` and
/// `after_error` run in reverse order, so the first interceptor registered is
/// the outermost.
pub trait MethodInterceptor: Send + Sync {
    fn description(&self) -> String;

    /// Runs before the target. An error here skips the target.
    fn before(&self, _call: &MethodCall<'_>) -> Result<(), BoxError> {
        Ok(())
    }

    /// Runs after the target returned `Ok`.
    fn after_success(&self, _call: &MethodCall<'_>) -> Result<(), BoxError> {
        Ok(())
    }

    /// Observes a failure of the target. The failure is always propagated.
    fn after_error(&self, _call: &MethodCall<'_>, _error: &(dyn StdError + 'static)) {}
}

/// Failure of a proxied call.
#[derive(Debug, Error)]
pub enum InterceptedCallError<E: StdError + 'static> {
    /// The target itself failed; the original error is preserved.
    #[error(transparent)]
    Target(E),

    /// An interceptor failed.
    #[error("Interceptor '{description}' failed on {method}: {source}")]
    Interceptor {
        description: String,
        method: String,
        #[source]
        source: BoxError,
    },
}

impl<E: StdError + 'static> InterceptedCallError<E> {
    /// The target's error, when the target is what failed.
    pub fn into_target(self) -> Option<E> {
        match self {
            InterceptedCallError::Target(err) => Some(err),
            InterceptedCallError::Interceptor { .. } => None,
        }
    }
}

/// Ordered method interceptors for one proxied type.
#[derive(Clone)]
pub struct InterceptionChain {
    target: Arc<str>,
    interceptors: Vec<Arc<dyn MethodInterceptor>>,
}

impl InterceptionChain {
    pub fn new(target: &str) -> Self {
        Self {
            target: Arc::from(target),
            interceptors: Vec::new(),
        }
    }

    /// Appends an interceptor.
    pub fn with(mut self, interceptor: Arc<dyn MethodInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    fn before<E: StdError + 'static>(&self, call: &MethodCall<'_>) -> Result<(), InterceptedCallError<E>> {
        for interceptor in &self.interceptors {
            interceptor
                .before(call)
                .map_err(|source| Self::failure(interceptor.as_ref(), call, source))?;
        }
        Ok(())
    }

    fn after<R, E: StdError + 'static>(&self, call: &MethodCall<'_>, outcome: Result<R, E>) -> Result<R, InterceptedCallError<E>> {
        match outcome {
            Ok(result) => {
                for interceptor in self.interceptors.iter().rev() {
                    interceptor
                        .after_success(call)
                        .map_err(|source| Self::failure(interceptor.as_ref(), call, source))?;
                }
                Ok(result)
            }
            Err(err) => {
                for interceptor in self.interceptors.iter().rev() {
                    interceptor.after_error(call, &err);
                }
                Err(InterceptedCallError::Target(err))
            }
        }
    }

    fn failure<E: StdError + 'static>(
        interceptor: &dyn MethodInterceptor,
        call: &MethodCall<'_>,
        source: BoxError,
    ) -> InterceptedCallError<E> {
        InterceptedCallError::Interceptor {
            description: interceptor.description(),
            method: format!("{}::{}", call.target, call.method),
            source,
        }
    }

    /// Runs a synchronous target through the chain.
    pub fn call<R, E, F>(&self, method: &str, target: F) -> Result<R, InterceptedCallError<E>>
    where
        E: StdError + 'static,
        F: FnOnce() -> Result<R, E>,
    {
        let call = MethodCall {
            target: &self.target,
            method,
        };
        trace!(target: "ferrous_ioc", proxied = call.target, method, "intercepted call");
        self.before(&call)?;
        self.after(&call, target())
    }

    /// Runs an async target through the chain.
    ///
    /// The returned future is lazy: interceptors and the target only run once
    /// it is polled, and every failure is reported by the future itself.
    pub fn call_async<'a, R, E, Fut>(
        &'a self,
        method: &'a str,
        target: Fut,
    ) -> impl Future<Output = Result<R, InterceptedCallError<E>>> + Send + 'a
    where
        E: StdError + Send + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'a,
        R: Send + 'a,
    {
        async move {
            let call = MethodCall {
                target: &self.target,
                method,
            };
            trace!(target: "ferrous_ioc", proxied = call.target, method, "intercepted async call");
            self.before(&call)?;
            let outcome = target.await;
            self.after(&call, outcome)
        }
    }
}

impl fmt::Debug for InterceptionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let descriptions: Vec<String> = self.interceptors.iter().map(|i| i.description()).collect();
        f.debug_struct("InterceptionChain")
            .field("target", &self.target)
            .field("interceptors", &descriptions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Error)]
    #[error("target failed")]
    struct TargetError;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_before: bool,
    }

    impl MethodInterceptor for Recorder {
        fn description(&self) -> String {
            self.name.to_string()
        }

        fn before(&self, call: &MethodCall<'_>) -> Result<(), BoxError> {
            self.log.lock().push(format!("{} before {}", self.name, call.method));
            if self.fail_before {
                return Err("refused".into());
            }
            Ok(())
        }

        fn after_success(&self, _call: &MethodCall<'_>) -> Result<(), BoxError> {
            self.log.lock().push(format!("{} success", self.name));
            Ok(())
        }

        fn after_error(&self, _call: &MethodCall<'_>, error: &(dyn StdError + 'static)) {
            self.log.lock().push(format!("{} error: {}", self.name, error));
        }
    }

    fn chain(log: &Arc<Mutex<Vec<String>>>, fail_second: bool) -> InterceptionChain {
        InterceptionChain::new("Service")
            .with(Arc::new(Recorder {
                name: "outer",
                log: log.clone(),
                fail_before: false,
            }))
            .with(Arc::new(Recorder {
                name: "inner",
                log: log.clone(),
                fail_before: fail_second,
            }))
    }

    #[test]
    fn hooks_wrap_the_target_like_an_onion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = chain(&log, false).call("run", || {
            log.lock().push("target".to_string());
            Ok::<_, TargetError>(5)
        });

        assert_eq!(result.unwrap(), 5);
        assert_eq!(
            *log.lock(),
            vec!["outer before run", "inner before run", "target", "inner success", "outer success"]
        );
    }

    #[test]
    fn target_errors_are_preserved() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let err = chain(&log, false)
            .call("run", || Err::<(), _>(TargetError))
            .unwrap_err();

        assert!(matches!(err, InterceptedCallError::Target(TargetError)));
        assert!(log.lock().contains(&"outer error: target failed".to_string()));
    }

    #[test]
    fn interceptor_failures_skip_the_target() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut called = false;
        let err = chain(&log, true)
            .call("run", || {
                called = true;
                Ok::<_, TargetError>(())
            })
            .unwrap_err();

        assert!(!called);
        assert!(err.to_string().contains("'inner'"));
        assert!(err.to_string().contains("Service::run"));
        assert!(err.into_target().is_none());
    }

    #[tokio::test]
    async fn async_calls_are_lazy_and_fail_at_await() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(&log, false);

        let pending = chain.call_async("fetch", async { Err::<u32, _>(TargetError) });
        assert!(log.lock().is_empty());

        let err = pending.await.unwrap_err();
        assert!(matches!(err, InterceptedCallError::Target(TargetError)));
        assert_eq!(log.lock().len(), 4);
    }
}
