//! Core types for the agent runtime
//!
//! Import directly from submodules:
//! - agent for Character
//! - components for Action, Provider, Evaluator types
//! - database for the persistence adapter contract
//! - environment for Entity, Room, World types
//! - events for event bus types
//! - memory for Memory types
//! - model for model types
//! - plugin for Plugin types
//! - primitives for UUID, Content, Media types
//! - service for Service types
//! - state for State
//! - task for Task types

pub mod agent;
pub mod components;
pub mod database;
pub mod environment;
pub mod events;
pub mod memory;
pub mod model;
pub mod plugin;
pub mod primitives;
pub mod service;
pub mod state;
pub mod task;
