pub const CAIRN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Same source as the `/version` endpoint, so the CLI and the API agree.
pub fn git_commit_hash() -> &'static str {
    cairn_rpc::git_commit_hash().unwrap_or("unknown")
}
