use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use griddle_task::RawContext;

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Ambient state handed to every task in a run.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    working_dir: PathBuf,
    cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// ABI view of this context. Borrows `self`; valid only while `self` is alive.
    pub(crate) fn as_raw(&self) -> RawContext {
        let flag: *const AtomicBool = Arc::as_ptr(&self.cancellation.flag);
        RawContext::new(&self.working_dir, flag.cast(), read_cancellation_flag)
    }
}

unsafe extern "C" fn read_cancellation_flag(state: *const c_void) -> bool {
    if state.is_null() {
        return false;
    }
    unsafe { (*state.cast::<AtomicBool>()).load(Ordering::SeqCst) }
}
