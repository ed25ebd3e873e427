//! Platform-specific type aliases and trait bounds
//!
//! This module provides conditional compilation for single-threaded (Rc-based)
//! vs multi-threaded (Arc-based) implementations.
//!
//! - `send` feature (default): Uses Arc and requires Send+Sync bounds
//! - `local` feature: Uses Rc and removes Send+Sync requirements

#[cfg(all(feature = "send", feature = "local"))]
compile_error!("features `send` and `local` are mutually exclusive");

#[cfg(not(any(feature = "send", feature = "local")))]
compile_error!("one of the features `send` or `local` must be enabled");

// ============================================================================
// MULTI-THREADED (send feature - default)
// ============================================================================
#[cfg(feature = "send")]
pub use std::sync::Arc as SharedPtr;

#[cfg(feature = "send")]
pub trait MaybeSend: Send {}
#[cfg(feature = "send")]
impl<T: Send> MaybeSend for T {}

// Boxed futures carrying the Send bound
#[cfg(feature = "send")]
pub type PlatformBoxFuture<'a, T> = std::pin::Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[cfg(feature = "send")]
pub type PlatformBoxFutureStatic<T> = std::pin::Pin<Box<dyn Future<Output = T> + Send + 'static>>;

#[cfg(feature = "send")]
pub type BoxedStrategy<T> = Box<dyn crate::streams::QueuingStrategy<T> + Send + 'static>;

// ============================================================================
// SINGLE-THREADED (local feature)
// ============================================================================
#[cfg(feature = "local")]
pub use std::rc::Rc as SharedPtr;

#[cfg(feature = "local")]
pub trait MaybeSend {}
#[cfg(feature = "local")]
impl<T> MaybeSend for T {}

#[cfg(feature = "local")]
pub type PlatformBoxFuture<'a, T> = std::pin::Pin<Box<dyn Future<Output = T> + 'a>>;

#[cfg(feature = "local")]
pub type PlatformBoxFutureStatic<T> = std::pin::Pin<Box<dyn Future<Output = T> + 'static>>;

#[cfg(feature = "local")]
pub type BoxedStrategy<T> = Box<dyn crate::streams::QueuingStrategy<T> + 'static>;
