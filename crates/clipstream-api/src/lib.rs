pub mod account;
pub mod auth;
pub mod cookies;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod tokens;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
pub use tokens::TokenConfig;
