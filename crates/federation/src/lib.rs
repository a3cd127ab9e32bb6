//! Federation layer: URL classification, per-server HTTP clients, backend
//! adapters, and the interface/manager pair that fronts them.

pub mod client;
pub mod firefish;
pub mod interface;
pub mod lemmy;
pub mod manager;
pub mod mastodon;
pub mod nodeinfo;
pub mod traits;
pub mod url_parse;

pub use client::{ApiResponse, ServerClient, USER_AGENT};
pub use interface::{FederationInterface, BULK_CONCURRENCY};
pub use manager::FederationManager;
pub use nodeinfo::BackendKind;
pub use traits::FederationApi;
pub use url_parse::{parse_profile_url, PostUrlCache};
