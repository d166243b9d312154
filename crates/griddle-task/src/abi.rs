//! The C ABI shared by the host and compiled task modules.
//!
//! A task module exports one [`TaskDescriptor`] static per task. The host checks
//! `magic` and `abi_version` before touching any other field, then drives the instance
//! exclusively through the descriptor's function pointers. Error text produced by the
//! module is returned as a NUL-terminated string owned by the module and must be released
//! with `free_message`.

use std::any::Any;
use std::ffi::{CString, c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::bind::bind_params;
use crate::context::Context;
use crate::Task;

pub const TASK_MAGIC: u64 = u64::from_le_bytes(*b"GRIDDLE\0");

pub const TASK_ABI_VERSION: u32 = 1;

pub const STATUS_OK: i32 = 0;
pub const STATUS_ERROR: i32 = 1;
pub const STATUS_PANIC: i32 = 2;

#[repr(C)]
pub struct RawContext {
    pub working_dir: *const u8,
    pub working_dir_len: usize,
    pub cancel_state: *const c_void,
    pub is_cancelled: unsafe extern "C" fn(*const c_void) -> bool,
}

impl RawContext {
    /// Borrows `working_dir`; the result must not outlive it or `cancel_state`.
    pub fn new(
        working_dir: &Path,
        cancel_state: *const c_void,
        is_cancelled: unsafe extern "C" fn(*const c_void) -> bool,
    ) -> Self {
        let bytes = path_bytes(working_dir);
        Self {
            working_dir: bytes.as_ptr(),
            working_dir_len: bytes.len(),
            cancel_state,
            is_cancelled,
        }
    }
}

#[repr(C)]
pub struct TaskDescriptor {
    pub magic: u64,
    pub abi_version: u32,
    /// Returns a new default instance, or null if construction panicked.
    pub create: extern "C" fn() -> *mut c_void,
    pub bind: unsafe extern "C" fn(
        instance: *mut c_void,
        params: *const u8,
        params_len: usize,
        error: *mut *mut c_char,
    ) -> i32,
    pub execute: unsafe extern "C" fn(
        instance: *mut c_void,
        context: *const RawContext,
        error: *mut *mut c_char,
    ) -> i32,
    pub destroy: unsafe extern "C" fn(instance: *mut c_void),
    pub free_message: unsafe extern "C" fn(message: *mut c_char),
}

impl TaskDescriptor {
    pub const fn of<T>() -> Self
    where
        T: Task + Default + Serialize + DeserializeOwned + 'static,
    {
        Self {
            magic: TASK_MAGIC,
            abi_version: TASK_ABI_VERSION,
            create: create_shim::<T>,
            bind: bind_shim::<T>,
            execute: execute_shim::<T>,
            destroy: destroy_shim::<T>,
            free_message: free_message_shim,
        }
    }
}

extern "C" fn create_shim<T: Task + Default + 'static>() -> *mut c_void {
    match panic::catch_unwind(|| Box::new(T::default())) {
        Ok(task) => Box::into_raw(task).cast(),
        Err(_) => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn bind_shim<T>(
    instance: *mut c_void,
    params: *const u8,
    params_len: usize,
    error: *mut *mut c_char,
) -> i32
where
    T: Serialize + DeserializeOwned + 'static,
{
    if instance.is_null() || params.is_null() {
        return report(Ok(Err("null instance or params".to_string())), error);
    }

    let task = unsafe { &mut *instance.cast::<T>() };
    let bytes = unsafe { std::slice::from_raw_parts(params, params_len) };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let text =
            std::str::from_utf8(bytes).map_err(|err| format!("params are not UTF-8: {err}"))?;
        bind_params(task, text).map_err(|err| err.to_string())
    }));
    report(outcome, error)
}

unsafe extern "C" fn execute_shim<T: Task + 'static>(
    instance: *mut c_void,
    context: *const RawContext,
    error: *mut *mut c_char,
) -> i32 {
    if instance.is_null() || context.is_null() {
        return report(Ok(Err("null instance or context".to_string())), error);
    }

    let task = unsafe { &mut *instance.cast::<T>() };
    let context = unsafe { Context::from_raw(&*context) };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        task.execute(&context).map_err(|err| render_error(&*err))
    }));
    report(outcome, error)
}

unsafe extern "C" fn destroy_shim<T: 'static>(instance: *mut c_void) {
    if instance.is_null() {
        return;
    }
    let task = unsafe { Box::from_raw(instance.cast::<T>()) };
    let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(task)));
}

unsafe extern "C" fn free_message_shim(message: *mut c_char) {
    if message.is_null() {
        return;
    }
    unsafe {
        let _ = CString::from_raw(message);
    }
}

fn report(outcome: std::thread::Result<Result<(), String>>, error: *mut *mut c_char) -> i32 {
    match outcome {
        Ok(Ok(())) => STATUS_OK,
        Ok(Err(message)) => {
            write_message(error, message);
            STATUS_ERROR
        }
        Err(payload) => {
            write_message(error, format!("task panicked: {}", panic_message(&*payload)));
            STATUS_PANIC
        }
    }
}

fn write_message(slot: *mut *mut c_char, message: String) {
    if slot.is_null() {
        return;
    }
    let message = CString::new(message.replace('\0', "\\0")).unwrap_or_default();
    unsafe {
        *slot = message.into_raw();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

fn render_error(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> &[u8] {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> &[u8] {
    path.to_str().unwrap_or_default().as_bytes()
}
