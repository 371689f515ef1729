pub mod config;
pub mod registry;
pub mod routes;
pub mod state;

pub use config::DirectorConfig;
pub use routes::routes;
pub use state::AppState;
