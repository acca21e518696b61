pub mod cache;
pub mod domain;
pub mod dto;
pub mod handlers;
pub mod outbox;
pub mod query;
pub mod repo_error;
pub mod repository;
pub mod resilience;
