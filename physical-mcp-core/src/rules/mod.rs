pub mod engine;
pub mod models;
pub mod store;
pub mod templates;

pub use engine::RulesEngine;
pub use models::{
    ActiveRuleSummary, AlertEvent, NotificationTarget, NotificationType, PendingAlert,
    RuleEvaluation, RulePriority, WatchRule,
};
pub use store::RulesStore;
pub use templates::{get_template, list_templates, RuleTemplate};
