//! Domain types shared by the login pipeline, the stores and the authorize flow.
//!
//! - [`UserProfile`] - identity and lockout state
//! - [`PinRecord`] - the stored PIN for a (user, flavour) pair
//! - [`LoginCredentials`] - transient login input
//! - [`Program`], [`Facility`], [`StaffProfile`] - directory data for the flow

pub mod pin;
pub mod program;
pub mod user;

pub use pin::PinRecord;
pub use program::{Facility, Program, StaffProfile};
pub use user::{
    Flavour, LoginCredentials, UserProfile, UserProfileBuilder, UserType, UserUpdate,
};
