//! kadnode - a Kademlia-style DHT overlay node
//!
//! Each node self-assigns a 160-bit content identifier, keeps a routing
//! table bucketed by XOR-distance prefix, joins the overlay through
//! bootstrap peers, and answers routing queries from other nodes. Lookups
//! converge on the closest live peers to any target through iterative,
//! distance-shrinking queries.

pub mod config;
pub mod discovery;
pub mod error;
pub mod lookup;
pub mod node;
pub mod protocol;
pub mod routing;
pub mod transport;

// Re-export commonly used types
pub use config::NodeConfig;
pub use error::{Error, Result};
pub use node::Node;
pub use protocol::{bucket_index, Cid, Contact, Distance};
