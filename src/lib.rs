//! Web Page Snapshot Archive
//!
//! This library provides the core functionality for archive-hub, which
//! captures point-in-time snapshots of web pages (HTML, screenshot and
//! extracted text) through a queued capture pipeline, and later serves,
//! exports and expires them.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
