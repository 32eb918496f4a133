// ─── Offline Account ───
// The identity handed to the game. No authentication is negotiated; the
// UUID is derived from the user name so it is stable across launches.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

const DEFAULT_USERNAME: &str = "Player";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchAccount {
    pub username: String,
    pub uuid: String,
    pub access_token: String,
    pub user_type: String,
}

impl LaunchAccount {
    pub fn offline(username: &str) -> Self {
        let username = match username.trim() {
            "" => DEFAULT_USERNAME,
            trimmed => trimmed,
        };
        let uuid = offline_uuid(username);
        Self {
            username: username.to_string(),
            access_token: uuid.clone(),
            uuid,
            user_type: "legacy".into(),
        }
    }
}

/// MD5 of the user name, hex encoded and grouped 8-4-4-4-12.
pub fn offline_uuid(username: &str) -> String {
    let digest = hex::encode(Md5::digest(username.as_bytes()));
    format!(
        "{}-{}-{}-{}-{}",
        &digest[0..8],
        &digest[8..12],
        &digest[12..16],
        &digest[16..20],
        &digest[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_uuid_is_grouped_md5() {
        let uuid = offline_uuid("Steve");
        let groups: Vec<usize> = uuid.split('-').map(str::len).collect();
        assert_eq!(groups, [8, 4, 4, 4, 12]);
        assert_eq!(uuid, offline_uuid("Steve"));
        assert_ne!(uuid, offline_uuid("Alex"));
    }

    #[test]
    fn known_digest_is_formatted() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(offline_uuid(""), "d41d8cd9-8f00-b204-e980-0998ecf8427e");
    }

    #[test]
    fn blank_names_fall_back_to_default() {
        let account = LaunchAccount::offline("   ");
        assert_eq!(account.username, "Player");
        assert_eq!(account.user_type, "legacy");
        assert_eq!(account.access_token, account.uuid);
    }
}
