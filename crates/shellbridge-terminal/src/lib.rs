// Terminal connection bridge
//
// Owns the set of live remote-shell connections and, per connection, a
// dedicated reader that fans remote output out to attached viewers and to
// the command tracker. Transports are pluggable; the default hosts an ssh
// client process inside a PTY.

mod connection;
mod pty_transport;
mod registry;
mod transport;

pub use connection::{ConnectionInfo, TerminalConnection};
pub use pty_transport::PtyTransport;
pub use registry::{ConnectionRegistry, OutputSink};
pub use transport::{Credentials, HostTarget, ShellChannel, ShellProcess, ShellTransport};

// Constants
pub const MAX_CONCURRENT_CONNECTIONS: usize = 15;
pub const READ_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_TERMINAL_ROWS: u16 = 24;
pub const DEFAULT_TERMINAL_COLS: u16 = 80;
