//! HTTP transport for the Cairn file registry.
//!
//! The router decodes requests, resolves the caller identity from a header
//! set by the upstream identity provider, and hands already-typed arguments
//! to [`cairn_files::FileRegistry`].

pub mod files;
pub mod identity;
pub mod server;

pub use identity::{CallerIdentity, DEFAULT_IDENTITY_HEADER};
pub use server::{
    build_router, git_commit_hash, start_server, ApiError, AppState, SharedState,
};
