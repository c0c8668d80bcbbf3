//! Registration model
//!
//! A registration is either an individual sign-up or a team roster. Both are
//! keyed by `(eventId, email)` where the email is the individual's address or
//! the team captain's.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::Contribution;
use crate::utils::errors::RegistrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationType {
    Individual,
    Team,
}

impl RegistrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationType::Individual => "individual",
            RegistrationType::Team => "team",
        }
    }
}

impl fmt::Display for RegistrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationType {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" => Ok(RegistrationType::Individual),
            "team" => Ok(RegistrationType::Team),
            _ => Err(RegistrationError::UnknownRegistrationType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronouns: Option<String>,
}

impl PlayerInfo {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualRegistration {
    pub id: Uuid,
    pub version: i64,
    pub event_id: Uuid,
    pub registered_at: DateTime<Utc>,
    pub home_city: String,
    pub paid: bool,
    pub email: String,
    pub player_info: PlayerInfo,
    pub experience_level: ExperienceLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRegistration {
    pub id: Uuid,
    pub version: i64,
    pub event_id: Uuid,
    pub registered_at: DateTime<Utc>,
    pub home_city: String,
    pub paid: bool,
    pub team_name: String,
    pub captain_email: String,
    pub players: Vec<PlayerInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Registration {
    Individual(IndividualRegistration),
    Team(TeamRegistration),
}

impl Registration {
    pub fn registration_type(&self) -> RegistrationType {
        match self {
            Registration::Individual(_) => RegistrationType::Individual,
            Registration::Team(_) => RegistrationType::Team,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Registration::Individual(r) => r.id,
            Registration::Team(r) => r.id,
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            Registration::Individual(r) => r.version,
            Registration::Team(r) => r.version,
        }
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            Registration::Individual(r) => r.event_id,
            Registration::Team(r) => r.event_id,
        }
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        match self {
            Registration::Individual(r) => r.registered_at,
            Registration::Team(r) => r.registered_at,
        }
    }

    pub fn is_paid(&self) -> bool {
        match self {
            Registration::Individual(r) => r.paid,
            Registration::Team(r) => r.paid,
        }
    }

    /// The address the registration is keyed by
    pub fn email(&self) -> &str {
        match self {
            Registration::Individual(r) => &r.email,
            Registration::Team(r) => &r.captain_email,
        }
    }

    /// Name used to greet the registrant
    pub fn display_name(&self) -> String {
        match self {
            Registration::Individual(r) => r.player_info.full_name(),
            Registration::Team(r) => r.team_name.clone(),
        }
    }

    pub fn player_count(&self) -> u32 {
        match self {
            Registration::Individual(_) => 1,
            Registration::Team(r) => u32::try_from(r.players.len()).unwrap_or(u32::MAX),
        }
    }

    /// What this registration adds to its event's counters
    pub fn contribution(&self) -> Contribution {
        match self {
            Registration::Individual(_) => Contribution { teams: 0, rostered_players: 0, total_players: 1 },
            Registration::Team(_) => {
                let players = self.player_count();
                Contribution { teams: 1, rostered_players: players, total_players: players }
            }
        }
    }

    /// Next snapshot, marked paid
    pub fn with_paid(&self) -> Registration {
        match self {
            Registration::Individual(r) => Registration::Individual(IndividualRegistration {
                paid: true,
                version: r.version + 1,
                ..r.clone()
            }),
            Registration::Team(r) => Registration::Team(TeamRegistration {
                paid: true,
                version: r.version + 1,
                ..r.clone()
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualRequest {
    pub event_id: Uuid,
    pub home_city: String,
    pub email: String,
    pub player_info: PlayerInfo,
    pub experience_level: ExperienceLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRequest {
    pub event_id: Uuid,
    pub home_city: String,
    pub team_name: String,
    pub captain_email: String,
    pub players: Vec<PlayerInfo>,
}

/// A validated sign-up request, before it becomes a registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegistrationRequest {
    Individual(IndividualRequest),
    Team(TeamRequest),
}

impl RegistrationRequest {
    pub fn event_id(&self) -> Uuid {
        match self {
            RegistrationRequest::Individual(r) => r.event_id,
            RegistrationRequest::Team(r) => r.event_id,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            RegistrationRequest::Individual(r) => &r.email,
            RegistrationRequest::Team(r) => &r.captain_email,
        }
    }

    pub fn registration_type(&self) -> RegistrationType {
        match self {
            RegistrationRequest::Individual(_) => RegistrationType::Individual,
            RegistrationRequest::Team(_) => RegistrationType::Team,
        }
    }

    /// First, unpaid snapshot of the registration
    pub fn into_registration(self, id: Uuid, registered_at: DateTime<Utc>) -> Registration {
        match self {
            RegistrationRequest::Individual(r) => Registration::Individual(IndividualRegistration {
                id,
                version: 1,
                event_id: r.event_id,
                registered_at,
                home_city: r.home_city,
                paid: false,
                email: r.email,
                player_info: r.player_info,
                experience_level: r.experience_level,
            }),
            RegistrationRequest::Team(r) => Registration::Team(TeamRegistration {
                id,
                version: 1,
                event_id: r.event_id,
                registered_at,
                home_city: r.home_city,
                paid: false,
                team_name: r.team_name,
                captain_email: r.captain_email,
                players: r.players,
            }),
        }
    }
}
