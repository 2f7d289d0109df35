//! Vigur FFI - C bindings for the Vigur embedding engine.
//!
//! This crate exposes the engine through a C ABI for use from C, C++, C#,
//! Go, Python, and similar hosts. Conventions across the whole surface:
//!
//! - Fallible functions return NULL or a negative sentinel and record a
//!   `PREFIX:details` message retrievable with `get_last_error` on the same
//!   thread.
//! - Every pointer handed to the caller has exactly one matching `free_*`
//!   function; all frees accept NULL.
//! - Panics never cross the boundary; they surface as `FFI_ERROR` results.

mod async_ops;
mod device;
mod embed;
mod error;
mod model;
mod stream;
mod types;

pub use async_ops::*;
pub use device::*;
pub use embed::*;
pub use error::*;
pub use model::*;
pub use stream::*;
pub use types::*;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::Runtime;

use crate::error::{ErrorKind, set_last_error};

/// Global tokio runtime for async operations.
static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Worker count requested before the runtime started. Zero means default.
static POOL_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Get or initialize the global runtime.
pub(crate) fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all();
        let workers = POOL_SIZE.load(Ordering::SeqCst);
        if workers > 0 {
            builder.worker_threads(workers);
        }
        builder.build().expect("Failed to create tokio runtime")
    })
}

/// Run an entry point body, converting any panic into an `FFI_ERROR` and the
/// given failure value.
pub(crate) fn ffi_guard<T, F: FnOnce() -> T>(context: &str, failure: T, body: F) -> T {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => value,
        Err(payload) => {
            set_last_error(
                ErrorKind::Ffi,
                &format!("panic in {context}: {}", panic_message(&*payload)),
            );
            failure
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Initialize logging, the compute thread pool, and the async runtime.
///
/// Optional; everything is also initialized lazily on first use. Returns 0
/// on success, -1 on failure.
#[unsafe(no_mangle)]
pub extern "C" fn init_runtime() -> i32 {
    ffi_guard("init_runtime", -1, || {
        let _ = env_logger::Builder::from_default_env().try_init();

        // Rayon defaults to one thread per logical core; physical cores give
        // better throughput for the vectorized inner loops. build_global
        // errors when the pool already exists, which is fine.
        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get_physical())
            .build_global();

        let _ = runtime();
        0
    })
}

/// Set the async runtime's worker thread count.
///
/// Must be called before the runtime starts, i.e. before `init_runtime` and
/// before the first embedding call. Returns 0 on success, -2 when `count` is
/// zero, -1 when the runtime is already running.
#[unsafe(no_mangle)]
pub extern "C" fn configure_thread_pool(count: usize) -> i32 {
    if count == 0 {
        set_last_error(ErrorKind::InvalidConfig, "thread count must be at least 1");
        return -2;
    }
    if RUNTIME.get().is_some() {
        set_last_error(
            ErrorKind::InvalidConfig,
            "thread pool cannot be resized after the runtime has started",
        );
        return -1;
    }
    POOL_SIZE.store(count, Ordering::SeqCst);
    0
}

/// Worker thread count the runtime uses: the configured value, the running
/// runtime's actual worker count, or the detected hardware concurrency.
#[unsafe(no_mangle)]
pub extern "C" fn get_thread_pool_size() -> i32 {
    if let Some(rt) = RUNTIME.get() {
        return rt.metrics().num_workers() as i32;
    }
    let configured = POOL_SIZE.load(Ordering::SeqCst);
    if configured > 0 {
        configured as i32
    } else {
        num_cpus::get() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn guard_turns_panic_into_ffi_error() {
        let value = ffi_guard("test_entry", -1i32, || panic!("boom"));
        assert_eq!(value, -1);
        let ptr = get_last_error();
        let msg = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        unsafe { free_error_string(ptr) };
        assert!(msg.starts_with("FFI_ERROR:panic in test_entry"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn guard_passes_through_success() {
        assert_eq!(ffi_guard("ok", 0, || 42), 42);
    }

    #[test]
    fn zero_thread_count_is_rejected_before_runtime_check() {
        // Force the runtime up so only the count check can produce -2.
        let _ = runtime();
        assert_eq!(configure_thread_pool(0), -2);
        unsafe { free_error_string(get_last_error()) };
    }

    #[test]
    fn resize_after_start_is_rejected() {
        let _ = runtime();
        assert_eq!(configure_thread_pool(4), -1);
        unsafe { free_error_string(get_last_error()) };
    }

    #[test]
    fn pool_size_is_positive() {
        assert!(get_thread_pool_size() > 0);
    }

    #[test]
    fn init_runtime_is_idempotent() {
        assert_eq!(init_runtime(), 0);
        assert_eq!(init_runtime(), 0);
    }
}
