mod access_control;
mod app;
mod state;

pub use access_control::{AccessControl, RequestContext};
pub use app::create_app;
pub use state::AppState;
