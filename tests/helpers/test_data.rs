//! Test data helpers for creating test objects
//!
//! This module provides helper functions for creating events, registration
//! requests and webhook payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use fake::faker::address::en::CityName;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use uuid::Uuid;

use RosterDesk::models::{
    ExperienceLevel, IndividualRequest, NewEvent, PlayerInfo, RegistrationOption, RegistrationRequest,
    RegistrationType, TeamRequest, TeamSizeRange,
};
use RosterDesk::services::payment::{METADATA_EMAIL, METADATA_EVENT_ID};

/// Instant every test context starts at
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap()
}

/// Start of the default test event, a month after `test_now`
pub fn test_event_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 1, 9, 0, 0).unwrap()
}

pub fn free_options() -> Vec<RegistrationOption> {
    vec![
        RegistrationOption { registration_type: RegistrationType::Individual, price: 0 },
        RegistrationOption { registration_type: RegistrationType::Team, price: 0 },
    ]
}

pub fn paid_options(individual_price: i64, team_price: i64) -> Vec<RegistrationOption> {
    vec![
        RegistrationOption { registration_type: RegistrationType::Individual, price: individual_price },
        RegistrationOption { registration_type: RegistrationType::Team, price: team_price },
    ]
}

/// Event starting at `start`, closing registration a day before
pub fn new_event_at(start: DateTime<Utc>, options: Vec<RegistrationOption>) -> NewEvent {
    NewEvent {
        name: format!("{} Open", CityName().fake::<String>()),
        location: format!("{} Sports Hall", CityName().fake::<String>()),
        start_time: start,
        end_time: start + Duration::hours(8),
        registration_close_time: start - Duration::days(1),
        registration_options: options,
        allowed_team_size_range: TeamSizeRange { min: 2, max: 4 },
        rules_link: Some("https://example.com/rules".to_string()),
        image_name: None,
    }
}

pub fn new_event(options: Vec<RegistrationOption>) -> NewEvent {
    new_event_at(test_event_start(), options)
}

pub fn random_player() -> PlayerInfo {
    PlayerInfo {
        first_name: FirstName().fake(),
        last_name: LastName().fake(),
        pronouns: None,
    }
}

/// Unique address for tests that need many registrants
pub fn unique_email() -> String {
    format!("player-{}@example.com", Uuid::new_v4().simple())
}

pub fn individual_request(event_id: Uuid, email: &str) -> RegistrationRequest {
    RegistrationRequest::Individual(IndividualRequest {
        event_id,
        home_city: CityName().fake(),
        email: email.to_string(),
        player_info: random_player(),
        experience_level: ExperienceLevel::Intermediate,
    })
}

pub fn team_request(event_id: Uuid, captain_email: &str, size: usize) -> RegistrationRequest {
    RegistrationRequest::Team(TeamRequest {
        event_id,
        home_city: CityName().fake(),
        team_name: format!("The {}s", LastName().fake::<String>()),
        captain_email: captain_email.to_string(),
        players: (0..size).map(|_| random_player()).collect(),
    })
}

pub fn payment_metadata(event_id: Uuid, email: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (METADATA_EMAIL.to_string(), email.to_string()),
        (METADATA_EVENT_ID.to_string(), event_id.to_string()),
    ])
}
