//! Caller identity extraction.
//!
//! The node sits behind a proxy that authenticates callers and forwards a
//! stable identity token in a header. Nothing here verifies that token.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use cairn_files::Identity;
use tracing::debug;

use crate::server::{ApiError, SharedState};

/// Header read when no other name is configured.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-cairn-identity";

/// Identity of the caller for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub Identity);

#[axum::async_trait]
impl FromRequestParts<SharedState> for CallerIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let header = state.identity_header.as_str();
        let raw = parts
            .headers
            .get(header)
            .ok_or_else(|| ApiError::unauthenticated(format!("missing {header} header")))?;

        let raw = raw
            .to_str()
            .map_err(|_| ApiError::unauthenticated(format!("{header} header is not valid text")))?;

        let identity = Identity::new(raw).map_err(|err| {
            debug!(error = %err, "Rejected caller identity");
            ApiError::unauthenticated(err.to_string())
        })?;
        Ok(CallerIdentity(identity))
    }
}
