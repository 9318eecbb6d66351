//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One of the three levels of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Country,
    State,
    City,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Country, Level::State, Level::City];

    /// The level whose selection governs this level's option list.
    pub fn parent(self) -> Option<Level> {
        match self {
            Self::Country => None,
            Self::State => Some(Self::Country),
            Self::City => Some(Self::State),
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Country => 0,
            Self::State => 1,
            Self::City => 2,
        }
    }

    /// Plural noun used in user-facing messages ("countries", "states", "cities").
    pub fn plural(self) -> &'static str {
        match self {
            Self::Country => "countries",
            Self::State => "states",
            Self::City => "cities",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Country => write!(f, "country"),
            Self::State => write!(f, "state"),
            Self::City => write!(f, "city"),
        }
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "country" | "countries" => Ok(Self::Country),
            "state" | "states" => Ok(Self::State),
            "city" | "cities" => Ok(Self::City),
            _ => Err(format!("Unknown level '{}'. Use country, state or city.", s)),
        }
    }
}

/// The selection-chain prefix a lookup is conditioned on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Countries,
    States { country: String },
    Cities { country: String, state: String },
}

impl Scope {
    /// The level whose option list this scope populates.
    pub fn level(&self) -> Level {
        match self {
            Self::Countries => Level::Country,
            Self::States { .. } => Level::State,
            Self::Cities { .. } => Level::City,
        }
    }

    /// User-facing message shown when a lookup for this scope fails.
    pub fn failure_message(&self) -> String {
        match self {
            Self::Countries => "Failed to load countries. Please try again later.".to_string(),
            Self::States { country } => {
                format!("Failed to load states for {}. Please try again later.", country)
            }
            Self::Cities { state, .. } => {
                format!("Failed to load cities for {}. Please try again later.", state)
            }
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Countries => write!(f, "countries"),
            Self::States { country } => write!(f, "states of {}", country),
            Self::Cities { country, state } => write!(f, "cities of {}, {}", state, country),
        }
    }
}

/// Remote lookup errors.
///
/// The cascade collapses every variant into the same per-level message; the
/// detail only reaches the logs.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Location service answered HTTP {0}")]
    Status(u16),
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}
