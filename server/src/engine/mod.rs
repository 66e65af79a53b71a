pub mod reconciler;
pub mod roster;
pub mod routing;
pub mod server;
pub mod server_cache;
pub mod server_registry;
pub mod task_registry;
pub mod validation;
