//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate catalog and store calls into use-case level APIs.
//! - Keep CLI and other transports decoupled from storage details.

pub mod association_service;
