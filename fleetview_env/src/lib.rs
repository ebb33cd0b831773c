//! FleetView Environment Abstraction Layer
//!
//! This crate provides the abstractions that let the FleetView protocol
//! logic run against any transport and any clock:
//! - Channel (`emit()`, `next_event()`, `close()`)
//! - Time (`now()`, `sleep()`)
//! - Identity (`DriverId`)
//!
//! The protocol crate never touches a socket or the system clock
//! directly. Production plugs a real transport and `TokioContext` in;
//! tests plug in a `LoopbackChannel` and a manual clock.
//!
//! # Example
//!
//! ```ignore
//! use fleetview_env::{EventChannel, SessionContext};
//!
//! async fn viewer_loop<Ctx: SessionContext, Ch: EventChannel>(
//!     ctx: &Ctx,
//!     channel: &Ch,
//! ) {
//!     while let Some(event) = channel.next_event().await {
//!         handle(event, ctx.now());
//!     }
//! }
//! ```

mod channel;
mod context;
mod error;
mod lifecycle;
mod tokio_impl;
mod types;

pub use channel::{loopback_pair, ChannelConfig, ChannelEvent, EventChannel, LoopbackChannel};
pub use context::SessionContext;
pub use error::ChannelError;
pub use lifecycle::ChannelGuard;
pub use tokio_impl::TokioContext;
pub use types::DriverId;
