//! Data models module
//!
//! This module contains all data structures used throughout the application

pub mod event;
pub mod intent;
pub mod registration;

// Re-export commonly used models
pub use event::{Contribution, Event, EventUpdate, NewEvent, RegistrationOption, TeamSizeRange};
pub use intent::RegistrationIntent;
pub use registration::{
    ExperienceLevel, IndividualRegistration, IndividualRequest, PlayerInfo, Registration, RegistrationRequest,
    RegistrationType, TeamRegistration, TeamRequest,
};
