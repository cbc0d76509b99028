//! Request and Response models for the admin API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies. Read-side
//! endpoints serialize the domain report types directly.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{
    ClearRequest, ListEntryRequest, PatternInvalidationRequest, TagInvalidationRequest,
    WarmupRequest,
};
pub use responses::{
    ClearResponse, ErrorResponse, HealthResponse, InvalidationResponse, MessageResponse,
    WarmupResponse,
};
