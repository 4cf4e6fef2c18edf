//! Package vocabulary
//!
//! Versions, wheel file names and the plain-text requirement formats
//! shared by the release log, the planner and wheel intake.

mod requirements;
mod version;
mod wheel;

pub use requirements::{Requirement, parse_freeze, parse_requirements};
pub use version::{PackageVersion, Version};
pub use wheel::{PythonTag, WHEEL_SUFFIX, WheelName, WheelTags, normalize_name};
