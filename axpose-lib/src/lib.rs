pub mod constants;
pub mod device;
pub mod error;
pub mod packet;
pub mod pose;
pub mod transport;


// Re-export the driver for easy access
pub use device::Driver;
pub use error::AxError;
