/**
The martech crate drives the oceanographic sensors, the Thetis profiler
controller and the Bluefin battery modules that make up a profiler mooring.
Every device is a thin wrapper around a shared serial connection, and devices
are grouped into components that run the operator procedures (file offloads,
quality conformance tests, battery balancing) from the `systems` binaries.
*/

/// Components in the system are created by grouping together
/// devices into a procedure an operator runs against the
/// profiler or a battery.
pub mod components;
/// Devices that are an atomic unit, one serial endpoint each,
/// and can be composed with other devices into components.
pub mod devices;
/// Error type shared by the devices and components.
pub mod error;
/// Wire formats exchanged with the devices, such as the
/// Thetis sentences and the Bluefin summary lines.
pub mod messages;
/// Development utilities for timestamps, stop signals and
/// scripted serial links used in tests.
pub mod utils;

pub use error::{MartechError, Result};

/// Macro that helps to check test file exist at compile time.
/// [link](https://stackoverflow.com/questions/30003921/how-can-i-locate-resources-for-testing-with-cargo)
/// [link](https://stackoverflow.com/questions/73187970/compile-time-check-if-file-at-path-exists-like-include-str)
#[macro_export]
macro_rules! test_file_path {
    ($arg1:expr) => {{
        let _ = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), $arg1));
        let r = concat!(env!("CARGO_MANIFEST_DIR"), $arg1);
        r
    }};
}
