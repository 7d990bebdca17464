//! Session engine: authentication, request execution with job polling,
//! the email API session and the per-thread session registry.

pub mod clock;
pub mod engine;
pub mod mm;
pub mod registry;

pub use clock::{Clock, SystemClock};
pub use engine::{AuthInfo, Session};
pub use mm::MmSession;
pub use registry::{ClassId, ManagedSession, SessionHandle, SessionRegistry, ThreadScope};
