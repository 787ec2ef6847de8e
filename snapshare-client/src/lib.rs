pub mod format;

mod fuzz;

mod identity;
pub use identity::{
    token_claims, Anonymous, Claims, Identity, MemoryTokenStore, TokenIdentity, TokenStore,
};

mod store;
pub use store::{CommentsState, Store, StoreConfig, Subscription, SELF_USERNAME, UNKNOWN_USERNAME};

mod transport;
pub use transport::{HttpTransport, Transport};

pub mod api {
    pub use snapshare_api::*;
}
