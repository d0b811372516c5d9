pub mod availability;
pub mod booking_service;
pub mod conflict;
pub mod slot_admin;
pub mod tier_policy;
