//! Access control for the HTTP ingress: which destination chats a bot may send to.

use std::collections::HashSet;

use crate::config::BotConfig;

/// Decides whether a destination id may receive messages.
pub trait AccessPolicy: Send + Sync + std::fmt::Debug {
    fn is_allowed(&self, id: i64) -> bool;

    /// Short human-readable form for startup logs.
    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

/// Static allow list. Empty list without `allow_all` denies everyone.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    allow_all: bool,
    users: HashSet<i64>,
}

impl AllowList {
    pub fn new(users: impl IntoIterator<Item = i64>) -> Self {
        Self {
            allow_all: false,
            users: users.into_iter().collect(),
        }
    }

    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            users: HashSet::new(),
        }
    }

    pub fn from_config(bot: &BotConfig) -> Self {
        if bot.allow_all {
            Self::allow_all()
        } else {
            Self::new(bot.allowed_users.iter().copied())
        }
    }
}

impl AccessPolicy for AllowList {
    fn is_allowed(&self, id: i64) -> bool {
        self.allow_all || self.users.contains(&id)
    }

    fn describe(&self) -> String {
        if self.allow_all {
            return "all".to_string();
        }
        let mut ids: Vec<_> = self.users.iter().copied().collect();
        ids.sort_unstable();
        format!("{:?}", ids)
    }
}
