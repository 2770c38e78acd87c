/// Devices are the atomic units that can be combined together
/// into components. Their core responsibilities do not change
/// based on which port or passthrough they are reached over.
pub mod hardware {
    /// Serial connection shared by every device.
    pub mod sercom;
    /// Device interface for the Thetis profiler controller and winch.
    pub mod thetis;
    /// Device interface for the Sea-Bird SBE 49 FastCAT CTD.
    pub mod sbe49;
    /// Device interface for the Sea-Bird OCR-507 radiometer.
    pub mod ocr;
    /// Device interface for the Aanderaa/Xylem 4831 oxygen optode.
    pub mod optode4831;
    /// Device interface for the Sea-Bird SUNA v2 nitrate sensor.
    pub mod suna;
    /// Shared menu driver for the Sea-Bird ECO sensor family.
    pub mod eco;
    /// Device interface for the ECO PAR.
    pub mod par;
    /// Device interface for the ECO Triplet-w.
    pub mod tripletw;
    /// Device interface for the Bluefin 1.5 kWh SmallBattMod.
    pub mod bluefin;
}

/// Helpful prelude when working with devices.
pub mod prelude {
    pub use crate::devices::hardware::bluefin::*;
    pub use crate::devices::hardware::eco::*;
    pub use crate::devices::hardware::ocr::*;
    pub use crate::devices::hardware::optode4831::*;
    pub use crate::devices::hardware::par::*;
    pub use crate::devices::hardware::sbe49::*;
    pub use crate::devices::hardware::sercom::*;
    pub use crate::devices::hardware::suna::*;
    pub use crate::devices::hardware::thetis::*;
    pub use crate::devices::hardware::tripletw::*;
}
