mod http;
mod simulated;

use std::sync::Arc;

use crate::core::remote::{BackboxApi, TransportError};

pub use http::{HttpBackbox, HttpSettings};
pub use simulated::{Call, SimulatedBackbox};

/// Pick the BackBox implementation for this run.
pub fn get_backbox(
    settings: HttpSettings,
    simulation: Option<SimulatedBackbox>,
) -> Result<Arc<dyn BackboxApi>, TransportError> {
    if let Some(sim) = simulation {
        return Ok(Arc::new(sim));
    }

    Ok(Arc::new(HttpBackbox::new(settings)?))
}
