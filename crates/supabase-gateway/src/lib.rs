//! Supabase implementation of the Backend Service boundary.
//!
//! This crate provides:
//! - [`SupabaseClient`]: owner-scoped row CRUD over PostgREST and password
//!   sign-in against GoTrue
//! - [`RealtimeClient`]: Realtime change-feed channels over one Phoenix
//!   websocket, connected lazily
//! - Heartbeat for connection keepalive
//!
//! Both clients implement the traits from `saathi-backend`, so everything
//! above this crate only sees [`saathi_backend::RowStore`] and
//! [`saathi_backend::ChangeFeed`].

mod error;
mod messages;
mod realtime;
mod rest;

pub use error::{GatewayError, GatewayResult};
pub use messages::{JoinReply, PhoenixMessage};
pub use realtime::{ConnectionState, RealtimeClient, RealtimeConfig};
pub use rest::{AuthSession, AuthUser, SupabaseClient};
