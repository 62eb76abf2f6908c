pub mod capabilities;
pub mod config;
pub mod config_loader;
pub mod content;
pub mod error;
pub mod retry;
pub mod state_machine;
pub mod traits;

pub use capabilities::*;
pub use content::*;
pub use error::*;
pub use retry::*;
pub use state_machine::{ConnectionState, ConnectionStateMachine, StateTransition};
pub use traits::*;
