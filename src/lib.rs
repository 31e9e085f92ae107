pub mod audio;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod playback;
pub mod queue;
pub mod relay;
pub mod routes;
pub mod state;
pub mod tts;
pub mod voice;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use errors::api_error::{ApiError, ApiResult};
pub use errors::auth_error::AuthError;
pub use queue::{SpeakJob, SpeakQueue};
pub use state::AppState;
