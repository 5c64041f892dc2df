//! Primary/secondary strategy composition.

use log::{info, warn};

use super::Dispatcher;
use super::response::Exchange;
use crate::error::{DispatchError, Result};

/// Tries `primary` first and only consults `fallback` when it fails.
///
/// A sparse or empty reply from the primary is still a success; only an
/// error hands the prompt over.
pub struct FallbackDispatcher<P, F> {
    primary: P,
    fallback: F,
}

impl<P: Dispatcher, F: Dispatcher> FallbackDispatcher<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }
}

impl<P: Dispatcher, F: Dispatcher> Dispatcher for FallbackDispatcher<P, F> {
    async fn dispatch(&mut self, prompt: &str) -> Result<Exchange> {
        let primary = match self.primary.dispatch(prompt).await {
            Ok(exchange) => return Ok(exchange),
            Err(e) => e,
        };

        warn!("Basic approach failed: {}, trying pty", primary);
        match self.fallback.dispatch(prompt).await {
            Ok(exchange) => {
                info!("pty fallback answered in {:?}", exchange.elapsed);
                Ok(exchange)
            }
            Err(fallback) => Err(DispatchError::BothStrategiesFailed {
                primary: Box::new(primary),
                fallback: Box::new(fallback),
            }
            .into()),
        }
    }
}
