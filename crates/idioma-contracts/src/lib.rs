pub mod chat;
pub mod events;
pub mod models;
pub mod options;
pub mod request;
pub mod result;
