use anyhow::Result;

/// Raw sample from a combined temperature/humidity sensor such as the DHT22.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HygrometerSample {
    pub temperature_celsius: f64,
    pub humidity_percent: f64,
}

pub trait Hygrometer: Send {
    fn read(&mut self) -> Result<HygrometerSample>;
}

pub trait Adc: Send {
    fn read_raw(&mut self) -> Result<u16>;

    /// Full-scale value, e.g. 1023 for a 10-bit converter.
    fn max_value(&self) -> u16;
}

pub trait DigitalInput: Send {
    fn is_high(&mut self) -> Result<bool>;
}

pub trait DigitalOutput: Send {
    fn set(&mut self, high: bool) -> Result<()>;
}

/// Everything the sensor array needs from the hardware.
pub struct Devices {
    pub hygrometer: Box<dyn Hygrometer>,
    pub gas_adc: Box<dyn Adc>,
    pub light: Box<dyn DigitalInput>,
    pub motion: Box<dyn DigitalInput>,
    pub indicator: Box<dyn DigitalOutput>,
}
