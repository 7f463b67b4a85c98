//! The process-wide runtime context.
//!
//! A single [`Il2Cpp`] lives for the whole process once attached. It owns the
//! export table, the derived-property caches and the memoized ABI facts the
//! probes compute. Descriptors reach it through [`runtime()`], which is why
//! they can stay plain copyable handles.

use crate::{api::Api, error::Result, hook::HookEntry, types::method::Parameter, types::AbiType};
use dashmap::DashMap;
use std::{
    ffi::{c_void, OsStr},
    sync::{Arc, OnceLock},
};
use tracing::debug;

static RUNTIME: OnceLock<Il2Cpp> = OnceLock::new();

pub struct Il2Cpp {
    api: Api,

    // Derived-property caches, keyed by record address. Sound because the
    // metadata is immutable once the runtime has initialized it.
    pub(crate) category_cache: DashMap<usize, i32>,
    pub(crate) alias_cache: DashMap<usize, AbiType>,
    pub(crate) params_cache: DashMap<usize, Arc<[Parameter]>>,

    // Memoized ABI facts, each computed once per process by a probe.
    pub(crate) header_size: OnceLock<usize>,
    pub(crate) va_offset: OnceLock<usize>,
    pub(crate) boxed_receivers: OnceLock<bool>,
    pub(crate) thread_static_offset: OnceLock<i32>,
    pub(crate) array_elements_offset: OnceLock<usize>,

    // Installed method body replacements, keyed by method record address.
    pub(crate) hooks: DashMap<usize, HookEntry>,
}

impl Il2Cpp {
    /// Attaches to the IL2CPP runtime module at the given path. The module
    /// must already be loaded and initialized by the instrumented process;
    /// attaching only resolves its export table. Attaching twice returns the
    /// existing context.
    pub fn attach(path: impl AsRef<OsStr>) -> Result<&'static Il2Cpp> {
        if let Some(existing) = RUNTIME.get() {
            return Ok(existing);
        }

        let api = Api::open(path.as_ref())?;
        debug!(module = ?path.as_ref(), "attached to the runtime module");
        Ok(RUNTIME.get_or_init(|| Il2Cpp::with_api(api)))
    }

    fn with_api(api: Api) -> Self {
        Self {
            api,
            category_cache: DashMap::new(),
            alias_cache: DashMap::new(),
            params_cache: DashMap::new(),
            header_size: OnceLock::new(),
            va_offset: OnceLock::new(),
            boxed_receivers: OnceLock::new(),
            thread_static_offset: OnceLock::new(),
            array_elements_offset: OnceLock::new(),
            hooks: DashMap::new(),
        }
    }

    pub(crate) fn api(&self) -> &Api {
        &self.api
    }

    /// The current application domain.
    pub fn domain(&self) -> crate::image::Domain {
        crate::image::domain()
    }

    /// The core library image.
    pub fn corlib(&self) -> crate::image::Image {
        crate::image::corlib()
    }

    /// Allocates zeroed scratch storage through the runtime's allocator. The
    /// storage backs materialized value types and by-reference slots whose
    /// lifetime this layer cannot bound, so it is never freed.
    pub(crate) fn alloc(&self, size: usize) -> *mut c_void {
        unsafe { self.api.alloc()(size.max(1)) }
    }

    #[cfg(test)]
    pub(crate) fn attach_with_api(api: Api) -> &'static Il2Cpp {
        RUNTIME.get_or_init(|| Il2Cpp::with_api(api))
    }
}

/// The attached runtime context.
///
/// Panics when no runtime has been attached; every descriptor operation goes
/// through here, so this is the single entry precondition of the library.
pub(crate) fn runtime() -> &'static Il2Cpp {
    RUNTIME
        .get()
        .expect("the IL2CPP runtime is not attached, call Il2Cpp::attach first")
}
