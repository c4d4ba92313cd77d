pub mod session;
pub mod events;

pub use session::{Wizard, WizardBuilder, WizardConfig, ParameterSource, AnswerBook};
pub use events::{Discovery, WizardEvent, SkipReason, EventHandler, EventCollector};
