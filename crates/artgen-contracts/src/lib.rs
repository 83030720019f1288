pub mod catalog;
pub mod chat;
pub mod dimensions;
pub mod events;
pub mod models;
pub mod pricing;
pub mod prompt;
pub mod request;
pub mod session;
