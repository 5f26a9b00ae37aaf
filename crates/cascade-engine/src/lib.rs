pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod engine;
pub mod registry;
pub mod service;
pub mod state;
pub mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CascadeConfig;
pub use engine::{PropagationEngine, StepOutcome};
pub use registry::{Lookup, SessionEntry, SessionRegistry, DEFAULT_SESSION_TTL};
pub use service::{
    CancelResponse, ReprioritizeService, RespondRequest, RespondResponse, StartRequest,
    StartResponse, StatusResponse,
};
pub use state::machine::SessionState;
