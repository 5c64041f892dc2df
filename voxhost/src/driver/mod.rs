//! Exchange strategies for talking to the agent.
//!
//! The pipe strategy is tried first; the pseudo-terminal automator takes over
//! when it fails. Both spawn a fresh agent per prompt and tear it down before
//! returning, so no agent outlives its exchange.

mod automator;
mod fallback;
mod process;
pub(crate) mod response;

pub use automator::{AutomatorState, PtyAutomator, ReadyCue, ReplyCue};
pub use fallback::FallbackDispatcher;
pub use process::ProcessSession;
pub(crate) use process::request_termination;
pub use response::{Exchange, RawResponse, Strategy};

use std::future::Future;

use crate::error::Result;

/// Something that turns one prompt into one raw reply.
pub trait Dispatcher: Send {
    /// Send `prompt` to a fresh agent and collect its reply.
    fn dispatch(&mut self, prompt: &str) -> impl Future<Output = Result<Exchange>> + Send;
}
