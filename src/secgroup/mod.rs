//! Security groups: provider interface, rule expansion and reconciliation

pub mod provider;
pub mod reconciler;
pub mod rules;

pub use provider::{ConcreteRule, NetworkProvider, SecurityGroup};
pub use reconciler::{truncate_description, SecurityGroupReconciler};
pub use rules::{expand_rules, Expansion};
