//! # rendezvous-server
//!
//! REST API and WebSocket server for collaborative meeting-point rooms.
//!
//! Users signed in with Firebase join a room, chat, share where they start
//! from and how long they are willing to travel, and the room computes the
//! area everyone can reach. Places inside that area are searched through
//! Google Maps, saved to the room and voted on.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── Auth (auth/)            Firebase ID tokens
//!     ├── RoomService (service/)
//!     ├── ChannelLayer (domain/)  per-room group events
//!     │
//!     ├── Geo providers (geo/)    Targomo, Google Maps
//!     │
//!     └── Store (persistence/)    PostgreSQL or in-memory
//! ```

pub mod api;
pub mod app;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod geo;
pub mod persistence;
pub mod service;
pub mod ws;
