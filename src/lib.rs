pub mod authenticator;
pub mod commands;
pub mod credentials;
pub mod http;
pub mod http_client;
pub mod parameters;
pub mod session;
pub mod token;
