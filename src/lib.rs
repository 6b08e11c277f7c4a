pub mod config;
pub mod dates;
pub mod dispatch;
pub mod email;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod rules;
pub mod store;
pub mod template;

pub use config::{Config, RuleConfig};
pub use email::{EmailRecord, Field};
pub use engine::{process_emails, PassReport, RuleEngine};
pub use error::RuleError;
pub use evaluator::{ErrorMode, Evaluator};
pub use rules::{Aggregation, RuleSet};
pub use store::EmailStore;
