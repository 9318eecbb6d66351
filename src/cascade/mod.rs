//! Country → state → city cascade.
//!
//! [`CascadeState`] holds the rules; [`CascadeController`] runs them as an
//! actor over a [`LocationService`](crate::location::LocationService).

pub mod controller;
pub mod state;

pub use controller::{CascadeController, CascadeHandle};
pub use state::{
    CascadeState, FetchCompletion, FetchRequest, LevelView, LoadStatus, Outcome, Selection,
    SelectionError, Snapshot, Ticket,
};
