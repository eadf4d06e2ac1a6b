//! Session-driven authorize flow: login → chooseProgram → chooseFacility.

pub mod controller;
pub mod session;

pub use controller::{FlowController, FlowForm, FlowOutcome, FlowRequest, FlowResponse, PageView};
pub use session::{AuthorizationSession, Page, SESSION_KEY, SESSION_VERSION};
