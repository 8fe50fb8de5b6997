// Firestore-backed implementations of the core document-store traits.

pub mod document;
pub mod firestore_client;
pub mod stores;

pub use firestore_client::{FirestoreClient, FirestoreError};
pub use stores::{
    FirestoreIpBanStore, FirestoreNoticeStore, FirestoreReviewStore, FirestoreUserStore,
};
