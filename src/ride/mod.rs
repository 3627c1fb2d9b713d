pub mod ride_models;
pub mod ride_repository;

pub use ride_models::{RideParticipant, RideRole};
pub use ride_repository::{RideDirectory, RideRepository};
