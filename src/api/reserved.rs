use crate::error::AppError;
use crate::server::AppState;

/// Reject any sub-queue name the restriction backend reserves for its own
/// storage.
pub async fn check_not_reserved(state: &AppState, sub_queue: &str) -> Result<(), AppError> {
    if state.restriction.reserved_sub_queues().contains(&sub_queue.to_string()) {
        return Err(AppError::Reserved(sub_queue.to_string()));
    }
    Ok(())
}
