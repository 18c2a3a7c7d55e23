use std::ffi::{c_char, CStr, CString};
use std::future::Future;
use std::os::raw::c_int;
use lazy_static::lazy_static;
use serde::Serialize;
use tokio::runtime::Runtime;

use crate::ffi::error::{ErrorCode, FFIError};

pub mod error;
pub mod export;

pub use error::FFIResult;

lazy_static! {
    // Export batches are spawned onto this runtime and outlive the call that submitted them.
    static ref RUNTIME: std::io::Result<Runtime> = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("csv-export")
        .build();
}

/// Run an async future to completion on the shared runtime.
pub fn block_on_async<F, T>(future: F) -> FFIResult<T>
where
    F: Future<Output = FFIResult<T>>,
{
    let runtime = RUNTIME
        .as_ref()
        .map_err(|e| FFIError::internal(format!("Failed to start async runtime: {}", e)))?;
    runtime.block_on(future)
}

/// Error handling helper for FFI boundaries (returns error code)
pub fn handle_status_result<F>(func: F) -> c_int
where
    F: FnOnce() -> FFIResult<()>,
{
    match func() {
        Ok(()) => ErrorCode::Success as c_int,
        Err(e) => {
            log::warn!(
                "[FFI] Code: {:?}, Message: {}, Details: {}",
                e.code,
                e.message,
                e.details.as_deref().unwrap_or("None")
            );
            e.code as c_int
        }
    }
}

/// Serialize `value` and hand ownership of the C string to the caller.
pub fn to_json_c_string<T: Serialize>(value: &T) -> FFIResult<*mut c_char> {
    let json = serde_json::to_string(value)
        .map_err(|e| FFIError::internal(format!("JSON serialization failed: {}", e)))?;
    Ok(CString::new(json)?.into_raw())
}

/// Borrow a required C string argument.
///
/// # Safety
/// `ptr` must be null or point to a valid NUL-terminated string.
pub unsafe fn read_c_str<'a>(ptr: *const c_char, name: &str) -> FFIResult<&'a str> {
    if ptr.is_null() {
        return Err(FFIError::new(ErrorCode::NullPointer, &format!("{} is null", name)));
    }
    Ok(unsafe { CStr::from_ptr(ptr) }.to_str()?)
}
