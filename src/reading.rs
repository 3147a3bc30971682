mod message;
mod sensor_reading;
mod timestamp;

pub use message::*;
pub use sensor_reading::*;
