use std::ffi::c_void;
use std::path::Path;

use crate::abi::RawContext;

/// The view of the host's execution context handed to [`crate::Task::execute`].
///
/// Borrowed from the host for the duration of one call; tasks that run for a while should
/// check [`Context::is_cancelled`] between units of work.
pub struct Context<'a> {
    working_dir: &'a Path,
    cancel_state: *const c_void,
    is_cancelled: unsafe extern "C" fn(*const c_void) -> bool,
}

impl<'a> Context<'a> {
    /// # Safety
    ///
    /// `raw.working_dir` must point to `raw.working_dir_len` readable bytes and
    /// `raw.cancel_state` must stay valid for `raw.is_cancelled`, both for `'a`.
    pub unsafe fn from_raw(raw: &'a RawContext) -> Self {
        let bytes = if raw.working_dir.is_null() {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(raw.working_dir, raw.working_dir_len) }
        };

        Self {
            working_dir: path_from_bytes(bytes),
            cancel_state: raw.cancel_state,
            is_cancelled: raw.is_cancelled,
        }
    }

    pub fn working_dir(&self) -> &'a Path {
        self.working_dir
    }

    pub fn is_cancelled(&self) -> bool {
        unsafe { (self.is_cancelled)(self.cancel_state) }
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> &Path {
    use std::os::unix::ffi::OsStrExt;
    Path::new(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> &Path {
    Path::new(std::str::from_utf8(bytes).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    unsafe extern "C" fn read_flag(state: *const c_void) -> bool {
        unsafe { (*state.cast::<AtomicBool>()).load(Ordering::SeqCst) }
    }

    #[test]
    fn reads_working_dir_and_cancellation() {
        let dir = PathBuf::from("/tmp/project");
        let flag = AtomicBool::new(false);
        let raw = RawContext::new(&dir, (&flag as *const AtomicBool).cast(), read_flag);

        let context = unsafe { Context::from_raw(&raw) };
        assert_eq!(context.working_dir(), dir.as_path());
        assert!(!context.is_cancelled());

        flag.store(true, Ordering::SeqCst);
        assert!(context.is_cancelled());
    }
}
