//! REST layer on `may_minihttp`.

pub mod request;
pub mod response;
pub mod router;
mod service;
pub mod state;

pub use request::ApiRequest;
pub use response::ApiResponse;
pub use router::{handle, Route, RouteError};
pub use service::ApiService;
pub use state::{AppState, StartupError};
