//! Sebar Core - Node lifecycle and event dispatch
//!
//! This crate provides:
//! - Node configuration and join address parsing
//! - The network endpoint contract, with an in-process implementation
//! - The named event registry
//! - Seed/join membership resolution
//! - The node lifecycle and run loop

pub mod config;
pub mod event;
pub mod membership;
pub mod network;
pub mod node;

// Re-export commonly used types
pub use config::{ConfigOverrides, JoinAddress, NodeConfig, parse_join_address};
pub use event::{EventContext, EventHandler, EventName, EventRegistry, EventResult, EventStatus};
pub use membership::{Membership, MembershipPlan};
pub use network::{ClusterClient, Listener, MemoryNetwork, NetworkEndpoint, NetworkError};
pub use node::{Node, NodeState};

pub use sebar_common::{Result, SebarError};
