//! Shared-secret checks for slash commands, interactive actions and the
//! admin endpoints.

use crate::{ChannelKey, Error, Result};
use core::fmt;
use core::str::FromStr;
use subtle::ConstantTimeEq;

fn secret_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Tokens the chat platform signs slash commands and actions with.
#[derive(Clone, Default)]
pub struct IntegrationTokens(Vec<String>);

impl IntegrationTokens {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            tokens
                .into_iter()
                .map(Into::into)
                .filter(|token: &String| !token.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether `token` is present, non-empty and one of the configured ones.
    pub fn accepts(&self, token: Option<&str>) -> bool {
        match token {
            Some(token) if !token.is_empty() => self.0.iter().any(|known| secret_eq(known, token)),
            _ => false,
        }
    }
}

/// Parses a comma-separated list; blanks are dropped.
impl FromStr for IntegrationTokens {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        Ok(Self::new(s.split(',').map(str::trim)))
    }
}

impl fmt::Debug for IntegrationTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntegrationTokens([{} redacted])", self.0.len())
    }
}

/// The part of the store an admin request may touch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminScope {
    System,
    Team { team_id: String },
    Channel(ChannelKey),
}

impl AdminScope {
    /// Scope requested through optional `team_id` / `channel_id` parameters.
    ///
    /// A channel without a team is ambiguous and rejected.
    pub fn requested(team_id: Option<&str>, channel_id: Option<&str>) -> Result<Self> {
        let team_id = team_id.filter(|team| !team.is_empty());
        let channel_id = channel_id.filter(|channel| !channel.is_empty());
        match (team_id, channel_id) {
            (None, None) => Ok(Self::System),
            (Some(team_id), None) => Ok(Self::Team {
                team_id: team_id.to_owned(),
            }),
            (Some(team_id), Some(channel_id)) => Ok(Self::Channel(ChannelKey::new(team_id, channel_id))),
            (None, Some(_)) => Err(Error::InvalidScope {
                reason: "channel scope requires a team".to_owned(),
            }),
        }
    }

    /// Whether the channel lies inside this scope.
    pub fn contains(&self, key: &ChannelKey) -> bool {
        match self {
            Self::System => true,
            Self::Team { team_id } => key.team_id == *team_id,
            Self::Channel(channel) => channel == key,
        }
    }

    /// Whether everything in `other` is also inside this scope.
    pub fn covers(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::System, _) => true,
            (Self::Team { team_id }, Self::Team { team_id: other }) => team_id == other,
            (Self::Team { .. }, Self::Channel(channel)) => self.contains(channel),
            (Self::Channel(channel), Self::Channel(other)) => channel == other,
            _ => false,
        }
    }
}

/// A static secret authorising destructive operations within a scope.
///
/// Written as `system:SECRET`, `team:TEAM:SECRET` or
/// `channel:TEAM:CHANNEL:SECRET`. The secret is everything after the scope,
/// so it may itself contain colons.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminToken {
    pub scope: AdminScope,
    secret: String,
}

impl AdminToken {
    pub fn new(scope: AdminScope, secret: impl Into<String>) -> Self {
        Self {
            scope,
            secret: secret.into(),
        }
    }

    pub fn matches(&self, secret: &str) -> bool {
        secret_eq(&self.secret, secret)
    }
}

impl FromStr for AdminToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidAdminToken {
            reason: reason.to_owned(),
        };
        let (kind, rest) = s.trim().split_once(':').ok_or_else(|| invalid("missing scope"))?;

        let (scope, secret) = match kind {
            "system" => (AdminScope::System, rest),
            "team" => {
                let (team_id, secret) = rest.split_once(':').ok_or_else(|| invalid("missing team"))?;
                (
                    AdminScope::Team {
                        team_id: team_id.to_owned(),
                    },
                    secret,
                )
            }
            "channel" => {
                let mut parts = rest.splitn(3, ':');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(team_id), Some(channel_id), Some(secret)) => {
                        (AdminScope::Channel(ChannelKey::new(team_id, channel_id)), secret)
                    }
                    _ => return Err(invalid("missing team or channel")),
                }
            }
            other => return Err(invalid(&format!("unknown scope `{other}`"))),
        };

        if secret.is_empty() {
            return Err(invalid("empty secret"));
        }
        Ok(Self::new(scope, secret))
    }
}

impl fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminToken")
            .field("scope", &self.scope)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// All configured admin tokens.
#[derive(Clone, Debug, Default)]
pub struct AdminTokens(Vec<AdminToken>);

impl AdminTokens {
    pub fn new(tokens: Vec<AdminToken>) -> Self {
        Self(tokens)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether some token with this secret covers the requested scope.
    pub fn authorize(&self, secret: &str, requested: &AdminScope) -> bool {
        !secret.is_empty()
            && self
                .0
                .iter()
                .any(|token| token.matches(secret) && token.scope.covers(requested))
    }
}

/// Parses a comma-separated list of scoped tokens.
impl FromStr for AdminTokens {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::parse::<AdminToken>)
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }
}
