use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The authenticated identity making a request, e.g. `uaa-user:7c1d...` or
/// `mtls-app:2a9f...`. Used as the principal in permission checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Actor(String);

impl Actor {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidActor(id));
        }
        Ok(Actor(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the first `:`, if any (`uaa-user`, `mtls-app`, ...).
    pub fn kind(&self) -> Option<&str> {
        self.0.split_once(':').map(|(kind, _)| kind)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Actor {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Actor::new(value)
    }
}

impl From<Actor> for String {
    fn from(actor: Actor) -> Self {
        actor.0
    }
}
