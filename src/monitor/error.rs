use thiserror::Error;

use super::lifecycle::MonitorState;
use crate::catalog::CatalogError;

#[derive(Debug, Error)]
pub enum ReaperError {
    /// `start` called on a monitor that has already left `Idle`
    #[error("TTL monitor already started (state: {state})")]
    AlreadyStarted { state: MonitorState },

    #[error("failed to spawn TTL monitor thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The catalog snapshot could not be taken; the whole pass is abandoned
    #[error("TTL pass aborted: {0}")]
    Catalog(#[from] CatalogError),
}
