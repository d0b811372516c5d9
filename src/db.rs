pub mod store;
pub use store::{
    ActivationWrite, AdmissionGuard, AdmissionWrite, BookingStore, SlotUpdate, TransitionWrite,
};
pub mod booking_repo;
pub use booking_repo::PgBookingStore;
pub mod memory_store;
pub use memory_store::MemoryStore;
