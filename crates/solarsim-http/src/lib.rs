//! solarsim-http: the reqwest-backed gateway to a BRP server.

pub mod client;

pub use client::HttpGateway;
