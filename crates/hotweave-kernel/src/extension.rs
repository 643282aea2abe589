//! Extension surface and native ABI
//!
//! Every artifact, whatever engine compiled it, is invoked through
//! [`Extension::invoke`]. Native artifacts export the entry points generated by
//! [`declare_extension!`](crate::declare_extension) so the loader can create
//! and destroy instances across the shared-library boundary.

use crate::error::LoadError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// ABI version expected from native artifacts
pub const API_VERSION: u32 = 1;

/// Symbol creating a boxed extension instance
pub const CREATE_SYMBOL: &[u8] = b"_hotweave_create";
/// Symbol destroying an instance created by [`CREATE_SYMBOL`]
pub const DESTROY_SYMBOL: &[u8] = b"_hotweave_destroy";
/// Symbol reporting the artifact's ABI version
pub const API_VERSION_SYMBOL: &[u8] = b"_hotweave_api_version";

#[allow(improper_ctypes_definitions)]
pub type CreateFn = unsafe extern "C" fn() -> *mut dyn Extension;
#[allow(improper_ctypes_definitions)]
pub type DestroyFn = unsafe extern "C" fn(*mut dyn Extension);
pub type ApiVersionFn = unsafe extern "C" fn() -> u32;

/// Errors raised by an extension while handling a call
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExtensionError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Extension call failed: {0}")]
    Failed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Behavior exposed by an artifact at a hosting extension point.
pub trait Extension: Send + Sync {
    /// Handle one operation. Argument and return shapes are opaque to the engine.
    fn invoke(&self, operation: &str, input: Value) -> Result<Value, ExtensionError>;
}

/// A loaded definition that can produce instances.
pub trait Definition: Send + Sync {
    fn instantiate(&self) -> Result<Box<dyn Extension>, LoadError>;
}

/// Extension backed by a closure
pub struct FnExtension<F> {
    handler: F,
}

impl<F> FnExtension<F>
where
    F: Fn(&str, Value) -> Result<Value, ExtensionError> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> Extension for FnExtension<F>
where
    F: Fn(&str, Value) -> Result<Value, ExtensionError> + Send + Sync,
{
    fn invoke(&self, operation: &str, input: Value) -> Result<Value, ExtensionError> {
        (self.handler)(operation, input)
    }
}

type Factory = dyn Fn() -> Box<dyn Extension> + Send + Sync;

/// Definition compiled into the host process itself.
///
/// Used for normal process resolution when an artifact has no dynamic
/// generation.
#[derive(Clone)]
pub struct StaticDefinition {
    factory: Arc<Factory>,
}

impl StaticDefinition {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn Extension> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
        }
    }
}

impl Definition for StaticDefinition {
    fn instantiate(&self) -> Result<Box<dyn Extension>, LoadError> {
        Ok((self.factory)())
    }
}

impl fmt::Debug for StaticDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticDefinition").finish_non_exhaustive()
    }
}

/// Export the native entry points for an extension type.
///
/// ```rust,ignore
/// struct Greeter;
///
/// impl hotweave_kernel::Extension for Greeter {
///     fn invoke(&self, op: &str, input: serde_json::Value)
///         -> Result<serde_json::Value, hotweave_kernel::ExtensionError> {
///         Ok(serde_json::json!({ "op": op, "echo": input }))
///     }
/// }
///
/// hotweave_kernel::declare_extension!(Greeter, Greeter);
/// ```
#[macro_export]
macro_rules! declare_extension {
    ($ext_type:ty, $constructor:expr) => {
        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn _hotweave_create() -> *mut dyn $crate::Extension {
            let ext: $ext_type = $constructor;
            let boxed: Box<dyn $crate::Extension> = Box::new(ext);
            Box::into_raw(boxed)
        }

        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn _hotweave_destroy(ext: *mut dyn $crate::Extension) {
            if !ext.is_null() {
                unsafe {
                    drop(Box::from_raw(ext));
                }
            }
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _hotweave_api_version() -> u32 {
            $crate::extension::API_VERSION
        }
    };
}
