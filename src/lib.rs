// feedsync - authenticated peer sessions with feed metadata gossip
//
// A node listens for, or connects to, one peer at a time over a stream
// transport. Each session authenticates both ends with signatures over a
// pre-shared key, signals a secondary transport, and then exchanges the
// feeds each side knows so both converge on the same metadata.

pub mod config;
pub mod events;
pub mod handshake;
pub mod identity;
pub mod session;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod wire;

pub use config::{ConfigError, FeedsyncConfig};
pub use events::{EventSink, Handoff, HandoffSink, LinkEvent, LogHandoff, SecondaryRole};
pub use handshake::{Handshake, HandshakeConfig, HandshakeFraming, RejectReason, Verdict};
pub use identity::{KeyBundle, KeyMaterialSource, Keypair, PendingBundle, PublicKey, SharedKey};
pub use session::{run_session, RolePhase, SessionContext, SessionEnd, SessionManager, SessionRole};
pub use storage::{Feed, FeedType, MemoryStore, Peer, SledStore, Store, StoreError};
pub use sync::{FeedSyncEngine, PeerSyncPhase, SyncConfig, SyncError};
pub use transport::{
    MemoryNetwork, StreamTransport, TcpTransport, TcpTransportConfig, TransportError,
    TransportSession,
};
pub use wire::{CodecError, Envelope};
