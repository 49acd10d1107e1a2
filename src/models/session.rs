use serde::{Deserialize, Serialize};

/// JWT claims carried by a local session token
///
/// Stateless-verifiable: `sub` + `role` are enough to authorize a request,
/// but the bridge cross-references the user directory at verify time so a
/// deleted user cannot ride out an unexpired token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Local user id
    pub sub: String,
    /// Role at issuance time
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub iss: String,
}

/// Minted session token returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct SessionToken {
    pub token: String,
    pub expires_in: i64,
}
