pub mod chat;
pub mod quiz;
pub mod user;
