pub mod handlers;
pub mod handlers_session;
pub mod routes;
pub mod upload;
