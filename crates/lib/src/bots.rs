//! Bot catalog: validated, immutable bot identities built from config.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::access::{AccessPolicy, AllowList};
use crate::config::{self, Config};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("bot {0:?}: token not configured (set token or {1})")]
    MissingToken(String, String),
    #[error("server.bot {0:?} is not a configured bot")]
    UnknownServerBot(String),
    #[error("server is configured but no bots are")]
    NoBotForServer,
    #[error("server.bot must be set when several bots are configured")]
    AmbiguousServerBot,
}

/// One bot account. Shared read-only between its poller and the HTTP ingress.
#[derive(Debug)]
pub struct BotIdentity {
    pub name: String,
    pub token: String,
    pub access: Arc<dyn AccessPolicy>,
}

impl BotIdentity {
    pub fn new(name: impl Into<String>, token: impl Into<String>, access: Arc<dyn AccessPolicy>) -> Self {
        Self {
            name: name.into(),
            token: token.into(),
            access,
        }
    }
}

/// Token with everything but the bot id part hidden (e.g. "123456:***").
pub fn mask_token(token: &str) -> String {
    match token.split_once(':') {
        Some((id, _)) => format!("{}:***", id),
        None => "***".to_string(),
    }
}

/// All configured bots, keyed by name. Never mutated after construction.
#[derive(Debug, Default)]
pub struct BotCatalog {
    bots: BTreeMap<String, Arc<BotIdentity>>,
    server_bot: Option<String>,
}

impl BotCatalog {
    pub fn from_config(config: &Config) -> Result<Self, CatalogError> {
        let mut bots = BTreeMap::new();
        for (name, bot) in &config.bots {
            let token = config::resolve_bot_token(name, bot)
                .ok_or_else(|| CatalogError::MissingToken(name.clone(), config::token_env_key(name)))?;
            let access: Arc<dyn AccessPolicy> = Arc::new(AllowList::from_config(bot));
            bots.insert(name.clone(), Arc::new(BotIdentity::new(name.clone(), token, access)));
        }

        let server_bot = match &config.server {
            None => None,
            Some(server) => Some(match &server.bot {
                Some(name) if bots.contains_key(name) => name.clone(),
                Some(name) => return Err(CatalogError::UnknownServerBot(name.clone())),
                None => match bots.len() {
                    0 => return Err(CatalogError::NoBotForServer),
                    1 => bots.keys().next().cloned().unwrap_or_default(),
                    _ => return Err(CatalogError::AmbiguousServerBot),
                },
            }),
        };

        Ok(Self { bots, server_bot })
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<BotIdentity>> {
        self.bots.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BotIdentity>> {
        self.bots.values()
    }

    /// The bot fronted by the HTTP ingress, if a server is configured.
    pub fn server_bot(&self) -> Option<Arc<BotIdentity>> {
        self.server_bot.as_deref().and_then(|name| self.get(name))
    }

    /// Log every bot with its masked token and access policy.
    pub fn log_summary(&self) {
        for bot in self.bots.values() {
            log::info!(
                "bot {}: token {}, allowed destinations {}",
                bot.name,
                mask_token(&bot.token),
                bot.access.describe()
            );
        }
        match &self.server_bot {
            Some(name) => log::info!("http ingress sends through bot {}", name),
            None => log::info!("http ingress not configured"),
        }
    }
}
