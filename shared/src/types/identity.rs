use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of a user returned by login and `getUserInfo`.
///
/// Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub id: i64,
    pub uuid: Uuid,
    pub username: String,
    pub nick_name: String,
    pub authority_id: String,
    pub authority_ids: Vec<String>,
}

/// Body of `POST /user/setUserAuthority`.
#[derive(Debug, Deserialize)]
pub struct SetUserAuthority {
    #[serde(alias = "authorityId")]
    pub authority_id: String,
}
