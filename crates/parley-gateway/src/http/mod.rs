pub mod health;
pub mod listener;
