pub mod health;
pub mod system;
pub mod tasks;
pub mod workers;
