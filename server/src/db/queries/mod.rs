pub mod servers;
pub mod stats;
pub mod tasks;
