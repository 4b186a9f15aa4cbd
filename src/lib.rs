pub mod bot;
pub mod config;
pub mod database;
pub mod logger;
pub mod notify;
pub mod store;
pub mod system;
pub mod system_tasks;
pub mod web;
