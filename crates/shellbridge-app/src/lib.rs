//! shellbridge application crate
//!
//! Wires the terminal bridge, command tracker, viewer registry and LLM
//! client into one service and serves it over HTTP/WebSocket.

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod history;
pub mod orchestrator;
pub mod service;
pub mod web;
