use std::ffi::{CStr, c_char, c_void};
use std::path::Path;
use std::ptr::{self, NonNull};

use griddle_task::TaskDescriptor;
use griddle_task::abi::STATUS_OK;

use crate::context::ExecutionContext;
use crate::models::{BindFailure, CoreError, CoreErrorKind, CoreResult, LoadFailure};

pub use dl::Library;

/// Opens compiled task modules and resolves one task from each.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, artifact: &Path, symbol: &str) -> CoreResult<LoadedTask>;
}

/// Loads task modules with the platform dynamic linker.
pub struct DylibLoader;

impl ModuleLoader for DylibLoader {
    fn load(&self, artifact: &Path, symbol: &str) -> CoreResult<LoadedTask> {
        let library = Library::open(artifact)?;
        let address = library.symbol(symbol)?;

        tracing::debug!(artifact = %artifact.display(), symbol, "resolved task symbol");

        // SAFETY: `address` comes from `library`, which the task keeps open.
        unsafe { LoadedTask::instantiate(address.as_ptr().cast(), symbol, Some(library)) }
    }
}

/// A task instance created from a descriptor, together with the module that defines it.
///
/// The instance is destroyed before the module is closed.
pub struct LoadedTask {
    descriptor: NonNull<TaskDescriptor>,
    instance: NonNull<c_void>,
    _library: Option<Library>,
}

// SAFETY: descriptors can only be built for `Task: Send` types and the instance is never
// shared; the module handle is process-global.
unsafe impl Send for LoadedTask {}

impl LoadedTask {
    /// Instantiates a task from a descriptor linked into this binary.
    pub fn from_static(descriptor: &'static TaskDescriptor) -> CoreResult<Self> {
        unsafe { Self::instantiate(descriptor, "<static>", None) }
    }

    /// # Safety
    ///
    /// `descriptor` must point to readable memory of at least the descriptor header size that
    /// stays valid as long as `library` (or forever, when `library` is `None`).
    unsafe fn instantiate(
        descriptor: *const TaskDescriptor,
        symbol: &str,
        library: Option<Library>,
    ) -> CoreResult<Self> {
        let descriptor = NonNull::new(descriptor.cast_mut()).ok_or_else(|| {
            not_a_task(format!("symbol `{symbol}` resolves to a null address"))
        })?;

        let magic = unsafe { ptr::read_unaligned(ptr::addr_of!((*descriptor.as_ptr()).magic)) };
        if magic != griddle_task::TASK_MAGIC {
            return Err(not_a_task(format!(
                "symbol `{symbol}` is not a task; export it with griddle_task::export_task!"
            )));
        }
        let version =
            unsafe { ptr::read_unaligned(ptr::addr_of!((*descriptor.as_ptr()).abi_version)) };
        if version != griddle_task::TASK_ABI_VERSION {
            return Err(not_a_task(format!(
                "symbol `{symbol}` was built against task ABI v{version}, host expects v{}",
                griddle_task::TASK_ABI_VERSION
            )));
        }

        let create = unsafe { descriptor.as_ref() }.create;
        let instance = NonNull::new(create())
            .ok_or_else(|| not_a_task(format!("constructor for `{symbol}` panicked")))?;

        Ok(Self {
            descriptor,
            instance,
            _library: library,
        })
    }

    fn descriptor(&self) -> &TaskDescriptor {
        // SAFETY: checked in `instantiate`; the defining module outlives `self`.
        unsafe { self.descriptor.as_ref() }
    }

    /// Applies JSON-encoded params through the module's bind entry.
    pub fn bind_json(&mut self, params: &str) -> CoreResult<()> {
        let mut message = ptr::null_mut();
        let status = unsafe {
            (self.descriptor().bind)(
                self.instance.as_ptr(),
                params.as_ptr(),
                params.len(),
                &mut message,
            )
        };
        self.check(status, message, CoreErrorKind::Bind(BindFailure::Apply))
    }

    /// Runs the task. Blocks for as long as the task does.
    pub fn execute(&mut self, context: &ExecutionContext) -> CoreResult<()> {
        let raw = context.as_raw();
        let mut message = ptr::null_mut();
        let status =
            unsafe { (self.descriptor().execute)(self.instance.as_ptr(), &raw, &mut message) };
        self.check(status, message, CoreErrorKind::Execution)
    }

    fn check(&self, status: i32, message: *mut c_char, kind: CoreErrorKind) -> CoreResult<()> {
        let text = self.take_message(message);
        if status == STATUS_OK {
            return Ok(());
        }
        Err(CoreError::new(
            kind,
            text.unwrap_or_else(|| format!("task returned status {status}")),
        ))
    }

    fn take_message(&self, message: *mut c_char) -> Option<String> {
        if message.is_null() {
            return None;
        }
        let text = unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned();
        unsafe { (self.descriptor().free_message)(message) };
        Some(text)
    }
}

impl Drop for LoadedTask {
    fn drop(&mut self) {
        unsafe { (self.descriptor().destroy)(self.instance.as_ptr()) };
    }
}

fn not_a_task(message: String) -> CoreError {
    CoreError::new(CoreErrorKind::Load(LoadFailure::NotATask), message)
}

#[cfg(unix)]
mod dl {
    use std::ffi::{CStr, CString, c_void};
    use std::os::unix::ffi::OsStrExt;
    use std::path::{Path, PathBuf};
    use std::ptr::NonNull;

    use crate::models::{CoreError, CoreErrorKind, CoreResult, LoadFailure};

    /// An open shared object. Closed on drop.
    pub struct Library {
        handle: NonNull<c_void>,
        path: PathBuf,
    }

    // SAFETY: dlopen handles are valid process-wide.
    unsafe impl Send for Library {}

    impl Library {
        pub fn open(path: &Path) -> CoreResult<Self> {
            let open_error = |message: String| {
                CoreError::new(CoreErrorKind::Load(LoadFailure::Open), message)
            };

            let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
                open_error(format!("module path {} contains NUL", path.display()))
            })?;

            let handle =
                unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
            let handle = NonNull::new(handle).ok_or_else(|| {
                open_error(format!(
                    "could not open task module {}: {}",
                    path.display(),
                    last_error()
                ))
            })?;

            Ok(Self {
                handle,
                path: path.to_path_buf(),
            })
        }

        pub fn symbol(&self, name: &str) -> CoreResult<NonNull<c_void>> {
            let missing = |detail: String| {
                CoreError::new(
                    CoreErrorKind::Load(LoadFailure::MissingSymbol),
                    format!(
                        "symbol `{name}` not found in {}: {detail}",
                        self.path.display()
                    ),
                )
            };

            let c_name =
                CString::new(name).map_err(|_| missing("name contains NUL".to_string()))?;

            unsafe { libc::dlerror() };
            let address = unsafe { libc::dlsym(self.handle.as_ptr(), c_name.as_ptr()) };
            NonNull::new(address).ok_or_else(|| missing(last_error()))
        }
    }

    impl Drop for Library {
        fn drop(&mut self) {
            unsafe {
                libc::dlclose(self.handle.as_ptr());
            }
        }
    }

    fn last_error() -> String {
        let message = unsafe { libc::dlerror() };
        if message.is_null() {
            return "unknown dynamic linker error".to_string();
        }
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(not(unix))]
mod dl {
    use std::ffi::c_void;
    use std::path::Path;
    use std::ptr::NonNull;

    use crate::models::{CoreError, CoreErrorKind, CoreResult, LoadFailure};

    pub struct Library;

    impl Library {
        pub fn open(path: &Path) -> CoreResult<Self> {
            Err(CoreError::new(
                CoreErrorKind::Load(LoadFailure::Open),
                format!(
                    "cannot open {}: task modules are only supported on unix",
                    path.display()
                ),
            ))
        }

        pub fn symbol(&self, name: &str) -> CoreResult<NonNull<c_void>> {
            Err(CoreError::new(
                CoreErrorKind::Load(LoadFailure::MissingSymbol),
                format!("symbol `{name}` not found"),
            ))
        }
    }
}
