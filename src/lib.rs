pub mod auth;
pub mod chat;
pub mod config;
pub mod directory;
pub mod events;
pub mod finance;
pub mod main_module;
pub mod meetings;
pub mod permissions;
pub mod shared;
