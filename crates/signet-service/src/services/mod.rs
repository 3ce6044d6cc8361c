//! Business logic layer.

pub mod config_service;
pub mod role_service;
pub mod rotation_service;
pub mod token_service;
