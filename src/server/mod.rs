mod handlers;
mod models;
mod state;

pub use handlers::{router, run_server};
pub use models::{TranslateImageRequest, TranslateImageResponse};
pub use state::ServerState;
