//! Shared types for the fast-transfer liquidity layer.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! chain-agnostic addresses, auction records, settlement-chain transactions,
//! relayer events and the configuration schema used to validate pluggable
//! implementations.

pub mod account;
pub mod auction;
pub mod delivery;
pub mod discovery;
pub mod events;
pub mod primitives;
pub mod utils;
pub mod validation;

pub use account::*;
pub use auction::*;
pub use delivery::*;
pub use discovery::*;
pub use events::*;
pub use primitives::*;
pub use utils::*;
pub use validation::*;
