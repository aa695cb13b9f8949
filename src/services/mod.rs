pub mod conversation;
pub mod health_service;
pub mod message_service;
pub mod provider;
pub mod webhook_service;
