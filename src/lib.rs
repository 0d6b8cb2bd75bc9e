//! Tollgate - Feature Flag and Rate Limiting Policy Engine
//!
//! This crate implements two small decision engines over shared stores:
//! a feature flag resolver with per-user overrides and cache-through reads,
//! and a fixed-window rate limiter with per-identity-class ceilings. Store
//! access goes through traits so the engines can run against in-memory
//! stores or external services.

pub mod config;
pub mod error;
pub mod features;
pub mod ratelimit;
pub mod store;
