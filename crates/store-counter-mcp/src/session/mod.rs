//! Per-user session registries for the HTTP transport.

#[cfg(feature = "sse")]
pub mod tenant;

#[cfg(feature = "sse")]
pub use tenant::TenantRegistry;
