//! GossipChain - a minimal peer-to-peer replicated ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Blockchain
//! - [`blockchain`] - Block model, hash engine, chain store and validation
//!
//! ## Networking
//! - [`network`] - Gossip protocol, peer registry and connection manager
//! - [`sync`] - Chain reconciliation (longest valid chain)
//!
//! ## Integration
//! - [`api`] - Administrative HTTP surface
//! - [`node`] - Node orchestrator
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;

// ============================================================================
// Networking
// ============================================================================
pub mod network;
pub mod sync;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
