/// Components combine devices into the procedures run against a profiler
/// or a battery on the bench.
pub mod thetis {
    /// Class ordered offload of the profiler data files.
    pub mod offload;
    /// Settings and logging check of a profiler.
    pub mod qct;
    /// Instrument sessions through the profiler passthrough.
    pub mod passthru;
}

/// Building blocks shared by every quality conformance test.
pub mod qct {
    /// Timestamped QCT log file.
    pub mod log;
    /// Pass or fail checks.
    pub mod conformance;
    /// Prompts answered by the person running the test.
    pub mod operator;
    /// Inspection and sensor check of a profiler.
    pub mod inspection;
}

/// Bench procedures for Bluefin batteries.
pub mod bluefin {
    /// Cell balancing until the cells agree.
    pub mod balance;
    /// Discharge to storage voltage.
    pub mod storage;
    /// Battery report file.
    pub mod report;
}

/// Helpful prelude when working with components.
pub mod prelude {
    pub use crate::components::bluefin::balance::*;
    pub use crate::components::bluefin::report::*;
    pub use crate::components::bluefin::storage::*;
    pub use crate::components::qct::conformance::*;
    pub use crate::components::qct::inspection::*;
    pub use crate::components::qct::log::*;
    pub use crate::components::qct::operator::*;
    pub use crate::components::thetis::offload::*;
    pub use crate::components::thetis::passthru::*;
    pub use crate::components::thetis::qct::*;
}
