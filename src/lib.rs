// PawFeed - social interaction aggregation and synchronization engine

// Core types and primitives
pub mod core;

// Content documents, relation edges and derived views
pub mod models;

// Stores, subscriptions and store decorators
pub mod infrastructure;

// Feed and thread aggregation, optimistic toggles
pub mod engine;

// Service layer and HTTP surface
pub mod services;
pub mod social_interface;

// Application wiring
pub mod app_state;
pub mod config;
pub mod data_seeder;

// Common utilities
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
