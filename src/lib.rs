pub mod config;
pub mod error;
pub mod hash;
pub mod network;
pub mod types;

pub use config::NetworkConfig;
pub use error::{ChannelClosed, DecodeError, InitError, NetworkError, PublishError};
pub use network::{EventReceiver, NetworkActor, NetworkCommand, NetworkEvent, NetworkHandle};
