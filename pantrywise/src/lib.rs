//! Pantrywise library
//!
//! This library exposes the core of Pantrywise: item lifecycle, derived
//! views, settings, persistence, backups and family sync.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod expiry;
pub mod services;
pub mod storage;
