pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
