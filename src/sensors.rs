mod array;
mod device;
mod gas;
mod sysfs;

pub use array::*;
pub use device::*;
pub use gas::*;
pub use sysfs::*;
