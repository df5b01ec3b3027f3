//! Event capture
//!
//! Everything that runs on the visitor's side of the pipeline:
//! - [`session_id`]: per-tab session identity
//! - [`user_agent`]: device, browser and OS classification
//! - [`recorder`]: event and session writes
//! - [`page_views`]: automatic page view triggering

pub mod page_views;
pub mod recorder;
pub mod session_id;
pub mod user_agent;

pub use page_views::{PageViewTracker, Visibility};
pub use recorder::{ClientContext, EventRecorder};
pub use session_id::{
    generate_session_id, FixedSessionId, MemoryStorage, SessionIdProvider, SessionStorage,
    TabSessionId,
};
pub use user_agent::{classify_user_agent, ClientInfo};
