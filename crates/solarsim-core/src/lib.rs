//! solarsim-core: wire types, transport trait and poll coordinator.
//!
//! # Overview
//!
//! The simulation server speaks the Bevy Remote Protocol (BRP), JSON-RPC 2.0
//! over HTTP POST. This crate defines:
//!
//! - [`BrpRequest`] / [`BrpResponse`]: wire envelopes, typed per method
//! - [`Transport`]: the async seam every gateway implements
//! - [`FetchResult`] / [`FetchError`]: the closed outcome of one call
//! - [`EndpointConfig`]: where the server lives and how long to wait
//! - [`poll`] module: periodic refresh with pause/resume and teardown
//! - [`simulation`] module: field model and the edit guard

pub mod config;
pub mod error;
pub mod poll;
pub mod request;
pub mod simulation;
pub mod transport;

pub use config::EndpointConfig;
pub use error::{
    ConfigError, FetchError, FetchErrorDetails, FetchErrorKind, FetchResult, FetchSuccess,
};
pub use poll::{PollConfig, PollState, PollStatus, Poller};
pub use request::{
    BrpError, BrpMethod, BrpParams, BrpRequest, BrpResponse, GetComponents, GetComponentsResult,
    GetResources, GetResourcesResult, MutateResources,
};
pub use simulation::{
    load_fields, ControlPanel, LoadError, PanelError, SimulationField, SimulationFieldKind,
    SimulationFields,
};
pub use transport::Transport;
