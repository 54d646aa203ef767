//! HTTP API handlers for opencon

pub mod authorize;
pub mod conference;
pub mod health;
pub mod import;
pub mod sessions;

pub use authorize::authorize_routes;
pub use conference::conference_routes;
pub use health::health_routes;
pub use import::import_routes;
pub use sessions::session_routes;
