use std::{collections::BTreeMap, str::FromStr};

use tracing::warn;

use crate::cluster::ConfigError;

/// One `NAME:PASSWORD` entry from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredential {
    pub username: String,
    pub password: String,
}

impl FromStr for UserCredential {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidUser {
            raw: raw.to_string(),
        };
        let (username, password) = raw.split_once(':').ok_or_else(invalid)?;
        let username = username.trim();
        if username.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Static username/password table used as a pass/fail login check.
#[derive(Debug, Clone, Default)]
pub struct UserTable {
    users: BTreeMap<String, String>,
}

impl UserTable {
    pub fn new(credentials: &[UserCredential]) -> Self {
        let users = credentials
            .iter()
            .map(|c| (c.username.clone(), c.password.clone()))
            .collect();
        Self { users }
    }

    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        match self.users.get(username) {
            None => {
                warn!(username, "login rejected: unknown user");
                false
            }
            Some(expected) if expected != password => {
                warn!(username, "login rejected: wrong password");
                false
            }
            Some(_) => true,
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
