// crealink: device-side shadow agent keeping a cloud mirror of a networked
// 3D printer in sync with its live status.

pub mod agent;
pub mod cloud;
pub mod config;
pub mod driver;
pub mod lifecycle;
pub mod poller;
pub mod sim;
pub mod state;
pub mod tunnel;

pub use agent::{Agent, AgentError};
pub use cloud::codec::{Command, CommandKind, DecodeError, decode, encode};
pub use cloud::gateway::ShadowGateway;
pub use cloud::transport::{PropertyMap, ShadowTransport, TransportError, TransportEvent};
pub use config::{Config, ConfigError, load_config};
pub use driver::{DriverError, PrinterDriver, TemperaturePair, TemperatureSample};
pub use lifecycle::{LifecycleMachine, PrinterEvent};
pub use state::{
    ConnectionState, ErrorCode, PrintState, PrinterState, StateModel, ValidationError,
};
pub use tunnel::{TunnelError, TunnelStatus, TunnelSupervisor};
