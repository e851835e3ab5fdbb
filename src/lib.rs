pub mod api;
pub mod app;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod scheduler;
pub mod seed;
pub mod services;
pub mod validation;
