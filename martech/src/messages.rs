/// Sentences exchanged with the Thetis profiler controller and
/// winch controller. Commands go out as `$PWETC`, replies come
/// back as `$PWETA` and file contents arrive as `$PWETB` blocks.
pub mod thetis {
    /// Command encoding, reply parsing and checksums.
    pub mod sentence;
    /// Bulk data blocks sent during a file offload.
    pub mod bulk;
    /// Directory listings returned by `DIR`.
    pub mod listing;
}

/// Replies from the Bluefin SmallBattMod battery board.
pub mod bluefin {
    /// Summary and version lines, also relayed through the
    /// Thetis `BFS` command.
    pub mod summary;
}

/// Helpful prelude when working with messages.
pub mod prelude {
    pub use crate::messages::bluefin::summary::*;
    pub use crate::messages::thetis::bulk::*;
    pub use crate::messages::thetis::listing::*;
    pub use crate::messages::thetis::sentence::*;
}
