//! Round-based game simulation modules

pub mod ai;
pub mod area;
pub mod barrier;
pub mod combat;
pub mod declaration;
pub mod error;
pub mod model;
pub mod round;
pub mod service;
pub mod session;
pub mod snapshot;

pub use ai::{DecisionPolicy, FarmingPolicy};
pub use error::GameError;
pub use service::GameService;
pub use session::{GameRegistry, JoinTicket, SessionSettings};
