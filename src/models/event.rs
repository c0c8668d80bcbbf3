//! Event model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::registration::RegistrationType;
use crate::utils::errors::EventError;

/// A way participants may sign up, with its fee in minor currency units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOption {
    #[serde(rename = "type")]
    pub registration_type: RegistrationType,
    pub price: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSizeRange {
    pub min: u32,
    pub max: u32,
}

impl TeamSizeRange {
    pub fn contains(&self, size: u32) -> bool {
        self.min <= size && size <= self.max
    }
}

/// What one registration adds to an event's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Contribution {
    pub teams: u32,
    pub rostered_players: u32,
    pub total_players: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub version: i64,
    pub name: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub registration_close_time: DateTime<Utc>,
    pub registration_options: Vec<RegistrationOption>,
    pub allowed_team_size_range: TeamSizeRange,
    pub num_teams: u32,
    pub num_rostered_players: u32,
    pub num_total_players: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
}

impl Event {
    /// The sign-up option offered for `registration_type`, if any
    pub fn option_for(&self, registration_type: RegistrationType) -> Option<&RegistrationOption> {
        self.registration_options
            .iter()
            .find(|option| option.registration_type == registration_type)
    }

    pub fn allows(&self, registration_type: RegistrationType) -> bool {
        self.option_for(registration_type).is_some()
    }

    /// Registration stays open up to and including the close time
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        at <= self.registration_close_time
    }

    pub fn counters(&self) -> Contribution {
        Contribution {
            teams: self.num_teams,
            rostered_players: self.num_rostered_players,
            total_players: self.num_total_players,
        }
    }

    /// Next snapshot of this event
    pub fn bumped(&self) -> Event {
        Event { version: self.version + 1, ..self.clone() }
    }

    /// Snapshot with a registration's contribution added, `None` on overflow
    pub fn with_contribution_added(&self, contribution: Contribution) -> Option<Event> {
        Some(Event {
            num_teams: self.num_teams.checked_add(contribution.teams)?,
            num_rostered_players: self.num_rostered_players.checked_add(contribution.rostered_players)?,
            num_total_players: self.num_total_players.checked_add(contribution.total_players)?,
            ..self.clone()
        })
    }

    /// Snapshot with a registration's contribution removed, `None` if a counter would go negative
    pub fn with_contribution_removed(&self, contribution: Contribution) -> Option<Event> {
        Some(Event {
            num_teams: self.num_teams.checked_sub(contribution.teams)?,
            num_rostered_players: self.num_rostered_players.checked_sub(contribution.rostered_players)?,
            num_total_players: self.num_total_players.checked_sub(contribution.total_players)?,
            ..self.clone()
        })
    }

    /// Check the registration policy is coherent
    pub fn validate(&self) -> Result<(), EventError> {
        if self.name.trim().is_empty() {
            return Err(EventError::InvalidEvent("name is required".to_string()));
        }
        if self.end_time < self.start_time {
            return Err(EventError::InvalidEvent("event ends before it starts".to_string()));
        }
        if self.registration_options.is_empty() {
            return Err(EventError::InvalidEvent("at least one registration option is required".to_string()));
        }
        for (i, option) in self.registration_options.iter().enumerate() {
            if option.price < 0 {
                return Err(EventError::InvalidEvent(format!(
                    "price of {} registration is negative",
                    option.registration_type
                )));
            }
            if self.registration_options[..i]
                .iter()
                .any(|earlier| earlier.registration_type == option.registration_type)
            {
                return Err(EventError::InvalidEvent(format!(
                    "{} registration is offered twice",
                    option.registration_type
                )));
            }
        }
        let range = self.allowed_team_size_range;
        if range.min == 0 || range.min > range.max {
            return Err(EventError::InvalidEvent(format!(
                "team size range {}..={} is invalid",
                range.min, range.max
            )));
        }
        Ok(())
    }
}

/// Request to publish an event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub name: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub registration_close_time: DateTime<Utc>,
    pub registration_options: Vec<RegistrationOption>,
    pub allowed_team_size_range: TeamSizeRange,
    #[serde(default)]
    pub rules_link: Option<String>,
    #[serde(default)]
    pub image_name: Option<String>,
}

impl NewEvent {
    /// First snapshot of the event, with empty counters
    pub fn into_event(self, id: Uuid) -> Event {
        Event {
            id,
            version: 1,
            name: self.name,
            location: self.location,
            start_time: self.start_time,
            end_time: self.end_time,
            registration_close_time: self.registration_close_time,
            registration_options: self.registration_options,
            allowed_team_size_range: self.allowed_team_size_range,
            num_teams: 0,
            num_rostered_players: 0,
            num_total_players: 0,
            rules_link: self.rules_link,
            image_name: self.image_name,
        }
    }
}

/// Explicit edit of an event's descriptive and policy fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub registration_close_time: Option<DateTime<Utc>>,
    pub registration_options: Option<Vec<RegistrationOption>>,
    pub allowed_team_size_range: Option<TeamSizeRange>,
    pub rules_link: Option<String>,
    pub image_name: Option<String>,
}

impl EventUpdate {
    /// Apply the edit to `event`; counters are never touched
    pub fn apply(self, event: &Event) -> Event {
        let mut updated = event.bumped();
        if let Some(name) = self.name {
            updated.name = name;
        }
        if let Some(location) = self.location {
            updated.location = location;
        }
        if let Some(start_time) = self.start_time {
            updated.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            updated.end_time = end_time;
        }
        if let Some(close) = self.registration_close_time {
            updated.registration_close_time = close;
        }
        if let Some(options) = self.registration_options {
            updated.registration_options = options;
        }
        if let Some(range) = self.allowed_team_size_range {
            updated.allowed_team_size_range = range;
        }
        if self.rules_link.is_some() {
            updated.rules_link = self.rules_link;
        }
        if self.image_name.is_some() {
            updated.image_name = self.image_name;
        }
        updated
    }
}
