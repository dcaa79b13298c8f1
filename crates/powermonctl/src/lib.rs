//! Operator tooling for the power monitor: the first-contact setup
//! orchestrator, the status report, and the imaging-prep reset.

pub mod orchestrator;
pub mod reset;
pub mod session;
pub mod status;
pub mod wizard;

pub use orchestrator::{MenuChoice, Orchestrator, Outcome, SessionUi, Wizard, WizardDefaults};
pub use session::ConsoleSession;
pub use wizard::ConsoleWizard;
