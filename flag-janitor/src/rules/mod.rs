pub mod expiration_rule;
pub mod rule_engine;
