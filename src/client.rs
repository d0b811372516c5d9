// src/client.rs
//
// Lado do aparelho do entregador: fila offline, replay e cache de leitura.

pub mod booking_client;
pub mod cache_gateway;
pub mod connectivity;
pub mod local_store;
pub mod queue;
pub mod remote;
pub mod replayer;

pub use booking_client::{ClientError, OfflineBookingClient, Submission};
pub use cache_gateway::{CacheGateway, Fetcher, GatewayRequest, GatewayResponse, HttpFetcher, RequestMode, ResponseSource};
pub use connectivity::Connectivity;
pub use local_store::{LocalStore, LocalStoreError};
pub use queue::{BookingAction, EntryState, OfflineQueue, QueueEntry};
pub use remote::{BookingApi, HttpBookingApi, RemoteError};
pub use replayer::{SyncEvent, SyncReplayer, SyncReport};
