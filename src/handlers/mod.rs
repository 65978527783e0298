pub mod health_handlers;
pub mod run_handlers;
