//! Core building blocks for the physical-mcp ambient visual perception daemon.
//!
//! This crate owns the per-camera perception pipeline (capture → change
//! detection → sampling → analysis → rules → alerts) and the shared
//! coordination fabric (event bus, alert queue, stats, memory, config).
//! Networking (HTTP API, MCP transport) lives in `physical-mcp-server`.

pub mod alert_queue;
pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod friendly_errors;
pub mod mdns;
pub mod mcp_logging;
pub mod memory;
pub mod notifications;
pub mod perception;
pub mod reasoning;
pub mod replay;
pub mod rules;
pub mod stats;
