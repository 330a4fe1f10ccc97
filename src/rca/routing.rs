use serde::{Deserialize, Serialize};

use super::SessionState;

/// Next node to run after a question or validation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Ask another why question.
    Continue,
    /// An answer (or re-answer) is required before anything else.
    Validate,
    /// Depth reached or a systematic cause found; extract the root cause.
    Extract,
}

/// Decide the next node. Pure: depends only on `state` and `max_depth`.
pub fn route(state: &SessionState, max_depth: u32) -> Route {
    if state.pending_retry() || state.current_question().is_some() {
        Route::Validate
    } else if state.early_stop_signal() || state.iteration() >= max_depth {
        Route::Extract
    } else {
        Route::Continue
    }
}
