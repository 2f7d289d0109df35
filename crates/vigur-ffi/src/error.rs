//! Thread-local error channel.
//!
//! Every fallible entry point records its failure here before returning a
//! sentinel. Errors are stored per OS thread, so concurrent callers never see
//! each other's failures; `get_last_error` must run on the thread that made
//! the failing call.
//!
//! The wire format is `PREFIX:details` with no space after the colon, e.g.
//! `UNSUPPORTED_FORMAT:.xyz`. Callers dispatch on the prefix and show the
//! details.

use std::cell::RefCell;
use std::ffi::{CString, c_char};

use vigur::VigurError;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Error category, rendered as the message prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    ModelNotFound,
    InvalidConfig,
    EmbeddingFailed,
    MultiVector,
    FileNotFound,
    UnsupportedFormat,
    FileRead,
    Ffi,
}

impl ErrorKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::ModelNotFound => "MODEL_NOT_FOUND",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::EmbeddingFailed => "EMBEDDING_FAILED",
            Self::MultiVector => "MULTI_VECTOR",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            Self::FileRead => "FILE_READ_ERROR",
            Self::Ffi => "FFI_ERROR",
        }
    }
}

pub(crate) fn format_error(kind: ErrorKind, details: &str) -> String {
    format!("{}:{}", kind.prefix(), details)
}

/// Record an error on the current thread, replacing any previous one.
pub(crate) fn set_last_error(kind: ErrorKind, details: &str) {
    let message = format_error(kind, details);
    log::debug!("ffi error: {message}");
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

/// Record an already-formatted `PREFIX:details` message.
pub(crate) fn set_last_error_message(message: String) {
    log::debug!("ffi error: {message}");
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

pub(crate) fn take_last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow_mut().take())
}

/// Map an engine error onto its wire category.
pub(crate) fn classify(err: &VigurError) -> ErrorKind {
    match err {
        VigurError::UnknownModel(_) => ErrorKind::ModelNotFound,
        VigurError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        VigurError::FileNotFound(_) => ErrorKind::FileNotFound,
        VigurError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
        VigurError::FileRead { .. } => ErrorKind::FileRead,
        VigurError::MultiVector(_) => ErrorKind::MultiVector,
        VigurError::EmbeddingFailed(_) => ErrorKind::EmbeddingFailed,
    }
}

/// Detail text for an engine error, kept tight so the prefix carries the
/// category and the details stay parseable.
pub(crate) fn engine_error_details(err: &VigurError) -> String {
    match err {
        VigurError::UnknownModel(id) => id.clone(),
        VigurError::InvalidConfig(msg) => msg.clone(),
        VigurError::FileNotFound(path) => path.display().to_string(),
        VigurError::UnsupportedFormat(ext) => format!(".{ext}"),
        VigurError::FileRead { path, source } => format!("{}: {source}", path.display()),
        VigurError::MultiVector(model) => {
            format!("model '{model}' produces multiple vectors per input")
        }
        VigurError::EmbeddingFailed(e) => e.to_string(),
    }
}

pub(crate) fn engine_error_message(err: &VigurError) -> String {
    format_error(classify(err), &engine_error_details(err))
}

pub(crate) fn set_engine_error(err: &VigurError) {
    set_last_error_message(engine_error_message(err));
}

/// Convert to a C string, replacing interior NULs so conversion cannot fail.
pub(crate) fn into_c_string(message: String) -> *mut c_char {
    let sanitized = if message.as_bytes().contains(&0) {
        message.replace('\0', " ")
    } else {
        message
    };
    match CString::new(sanitized) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Retrieve and clear the last error recorded on the calling thread.
///
/// Returns NULL when no error is pending. The caller owns the returned
/// string and must release it with `free_error_string`.
#[unsafe(no_mangle)]
pub extern "C" fn get_last_error() -> *mut c_char {
    match take_last_error() {
        Some(message) => into_c_string(message),
        None => std::ptr::null_mut(),
    }
}

/// Release a string returned by `get_last_error`.
///
/// NULL is a no-op.
///
/// # Safety
///
/// `ptr` must be NULL or a pointer previously returned by `get_last_error`,
/// and must not be used after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_error_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    fn read_and_free(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        unsafe { free_error_string(ptr) };
        s
    }

    #[test]
    fn format_has_no_space_after_colon() {
        assert_eq!(
            format_error(ErrorKind::UnsupportedFormat, ".xyz"),
            "UNSUPPORTED_FORMAT:.xyz"
        );
    }

    #[test]
    fn get_last_error_takes_ownership() {
        set_last_error(ErrorKind::InvalidConfig, "bad value");
        let msg = read_and_free(get_last_error());
        assert_eq!(msg, "INVALID_CONFIG:bad value");
        // Second read finds nothing.
        assert!(get_last_error().is_null());
    }

    #[test]
    fn newer_error_replaces_older() {
        set_last_error(ErrorKind::InvalidConfig, "first");
        set_last_error(ErrorKind::Ffi, "second");
        assert_eq!(read_and_free(get_last_error()), "FFI_ERROR:second");
    }

    #[test]
    fn errors_are_thread_isolated() {
        set_last_error(ErrorKind::InvalidConfig, "main thread error");
        let handle = std::thread::spawn(|| {
            // A fresh thread starts with no pending error.
            assert!(get_last_error().is_null());
            set_last_error(ErrorKind::Ffi, "worker error");
        });
        handle.join().unwrap();
        // The worker's error never leaks into this thread.
        assert_eq!(
            read_and_free(get_last_error()),
            "INVALID_CONFIG:main thread error"
        );
    }

    #[test]
    fn engine_errors_map_to_prefixes() {
        use std::path::PathBuf;
        let cases = [
            (
                VigurError::UnknownModel("mystery".into()),
                "MODEL_NOT_FOUND:mystery",
            ),
            (
                VigurError::UnsupportedFormat("xyz".into()),
                "UNSUPPORTED_FORMAT:.xyz",
            ),
            (
                VigurError::FileNotFound(PathBuf::from("/tmp/missing.txt")),
                "FILE_NOT_FOUND:/tmp/missing.txt",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(engine_error_message(&err), expected);
        }
    }

    #[test]
    fn interior_nul_is_sanitized() {
        let ptr = into_c_string("bad\0value".to_string());
        assert_eq!(read_and_free(ptr), "bad value");
    }

    #[test]
    fn free_error_string_accepts_null() {
        unsafe { free_error_string(std::ptr::null_mut()) };
    }
}
