pub mod caps;
pub mod device;
pub mod version;
