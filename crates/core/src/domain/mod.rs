pub mod chat;
pub mod recipe;
pub mod reference;
pub mod session;
pub mod usage;
pub mod user;
