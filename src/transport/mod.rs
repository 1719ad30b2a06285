// Transport module - THE WIRE (abstract)
// Connected byte-stream sessions plus the TCP and in-memory links that produce them

mod memory;
mod session;
mod tcp;
mod traits;

pub use traits::{
    // Core traits
    Listener, StreamTransport,
    // Configuration
    TransportConfig,
    // Identifiers and errors
    ConnectionId, TransportError,
};

pub use session::TransportSession;

pub use tcp::{TcpTransport, TcpTransportConfig};

pub use memory::{MemoryNetwork, MemoryTransport};
