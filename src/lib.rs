//! SkyShow Assistant Proxy
//!
//! Backend service for the SkyShow drone light show website. Proxies one
//! conversation turn per HTTP request to the hosted Assistants API, either
//! polling a run to completion (JSON reply) or relaying token deltas as they
//! arrive (streamed plain-text reply).

pub mod adapters;
pub mod application;
pub mod config;
pub mod ports;
