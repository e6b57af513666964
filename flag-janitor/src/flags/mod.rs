pub mod flag_models;
pub mod flag_store;
pub mod memory_store;
pub mod pg_store;
