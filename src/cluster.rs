use std::{collections::BTreeMap, str::FromStr};

/// Backend cluster member identifier.
pub type MemberId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidReplica { raw: String, reason: String },
    DuplicateReplica { member_id: MemberId },
    InvalidUser { raw: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidReplica { raw, reason } => {
                write!(f, "invalid replica {raw:?}: {reason} (expected ID=URL)")
            }
            Self::DuplicateReplica { member_id } => {
                write!(f, "replica {member_id} is configured more than once")
            }
            Self::InvalidUser { raw } => {
                write!(f, "invalid user {raw:?} (expected NAME:PASSWORD)")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// One `ID=URL` pair from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaAddr {
    pub member_id: MemberId,
    pub base_url: String,
}

impl FromStr for ReplicaAddr {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidReplica {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };
        let (id, url) = raw.trim().split_once('=').ok_or_else(|| invalid("missing '='"))?;
        let member_id = id
            .trim()
            .parse::<MemberId>()
            .map_err(|_| invalid("member id is not an integer"))?;
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("url must start with http:// or https://"));
        }
        Ok(Self {
            member_id,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }
}

/// Static `member id -> base URL` mapping, fixed at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressTable {
    by_id: BTreeMap<MemberId, String>,
}

impl AddressTable {
    pub fn try_from_replicas(replicas: &[ReplicaAddr]) -> Result<Self, ConfigError> {
        let mut by_id = BTreeMap::new();
        for replica in replicas {
            if by_id
                .insert(replica.member_id, replica.base_url.clone())
                .is_some()
            {
                return Err(ConfigError::DuplicateReplica {
                    member_id: replica.member_id,
                });
            }
        }
        Ok(Self { by_id })
    }

    pub fn base_url(&self, member_id: MemberId) -> Option<&str> {
        self.by_id.get(&member_id).map(String::as_str)
    }

    /// Joins the member's base URL with an API path.
    pub fn url(&self, member_id: MemberId, path: &str) -> Option<String> {
        self.base_url(member_id).map(|base| {
            format!(
                "{}/{}",
                base.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        })
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// The ordered member ids a proxy currently fans out to.
///
/// Advisory only: it is replaced optimistically when the backend acknowledges a
/// membership change and may run ahead of what the cluster has actually committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipView {
    voting_member_ids: Vec<MemberId>,
}

impl MembershipView {
    pub fn new(voting_member_ids: Vec<MemberId>) -> Self {
        Self { voting_member_ids }
    }

    pub fn member_ids(&self) -> &[MemberId] {
        &self.voting_member_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_replica_and_strips_trailing_slash() {
        let r: ReplicaAddr = "2=http://127.0.0.1:21002/".parse().unwrap();
        assert_eq!(r.member_id, 2);
        assert_eq!(r.base_url, "http://127.0.0.1:21002");
    }

    #[test]
    fn rejects_replica_without_scheme_or_id() {
        assert!("2=127.0.0.1:21002".parse::<ReplicaAddr>().is_err());
        assert!("x=http://127.0.0.1:21002".parse::<ReplicaAddr>().is_err());
        assert!("http://127.0.0.1:21002".parse::<ReplicaAddr>().is_err());
    }

    #[test]
    fn address_table_builds_urls_and_rejects_duplicates() {
        let replicas = vec![
            "1=http://a:1".parse::<ReplicaAddr>().unwrap(),
            "2=http://b:2/".parse::<ReplicaAddr>().unwrap(),
        ];
        let table = AddressTable::try_from_replicas(&replicas).unwrap();
        assert_eq!(table.url(1, "/write").as_deref(), Some("http://a:1/write"));
        assert_eq!(table.url(2, "read").as_deref(), Some("http://b:2/read"));
        assert_eq!(table.url(3, "/write"), None);

        let dup = vec![replicas[0].clone(), replicas[0].clone()];
        assert_eq!(
            AddressTable::try_from_replicas(&dup).unwrap_err(),
            ConfigError::DuplicateReplica { member_id: 1 }
        );
    }
}
