mod run;
mod workflow;

pub use run::{init, provision, render_admin};
pub use workflow::{DeveloperSettings, WorkflowSettings};
