pub mod auth;
pub mod booking;
pub mod policy;
pub mod slot;
