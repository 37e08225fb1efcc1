//! Completion endpoint client and wire types

pub mod client;
pub mod models;

pub use client::{CompletionClient, UpstreamConfig, UpstreamError};
pub use models::{
    CacheControl, CompletionRequest, CompletionResponse, SystemBlock, UsageCounters, WireMessage,
};
