pub mod ledger;
pub mod templates;

pub use ledger::{ResultsLedger, RESULTS_KEY};
pub use templates::{TemplateStore, TEMPLATES_KEY};
