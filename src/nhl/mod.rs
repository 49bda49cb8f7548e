//! Data sources for league, team and game data.
//!
//! [`NhlApi`] talks to the public NHL web API; anything implementing
//! [`DataSource`] can stand in for it.

pub mod api;
pub mod error;
pub mod provider;

pub use api::NhlApi;
pub use error::FetchError;
pub use provider::DataSource;
