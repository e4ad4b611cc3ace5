pub mod alert_store;
pub mod store;
