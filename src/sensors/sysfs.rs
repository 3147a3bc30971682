use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result, bail, ensure};

use crate::{
    config::SensorConfig,
    sensors::{Adc, DigitalInput, DigitalOutput, Devices, Hygrometer, HygrometerSample},
};

/// DHT22 exposed by the kernel `dht11` IIO driver.
#[derive(Debug)]
pub struct IioHygrometer {
    temperature_path: PathBuf,
    humidity_path: PathBuf,
}

impl IioHygrometer {
    pub fn open(device_dir: &Path) -> Result<Self> {
        let temperature_path = existing(device_dir.join("in_temp_input"))?;
        let humidity_path = existing(device_dir.join("in_humidityrelative_input"))?;

        Ok(Self {
            temperature_path,
            humidity_path,
        })
    }
}

impl Hygrometer for IioHygrometer {
    fn read(&mut self) -> Result<HygrometerSample> {
        // Both attributes are reported in thousandths.
        let temperature = read_value::<i64>(&self.temperature_path)?;
        let humidity = read_value::<i64>(&self.humidity_path)?;

        Ok(HygrometerSample {
            temperature_celsius: temperature as f64 / 1000.0,
            humidity_percent: humidity as f64 / 1000.0,
        })
    }
}

/// One channel of an IIO ADC, e.g. an MCP3008 under the `mcp320x` driver.
#[derive(Debug)]
pub struct IioAdc {
    raw_path: PathBuf,
    max: u16,
}

impl IioAdc {
    pub fn open(device_dir: &Path, channel: u8, resolution_bits: u8) -> Result<Self> {
        ensure!(
            (1..=16).contains(&resolution_bits),
            "unsupported ADC resolution: {resolution_bits} bits"
        );
        let raw_path = existing(device_dir.join(format!("in_voltage{channel}_raw")))?;
        let max = (u32::pow(2, resolution_bits.into()) - 1) as u16;

        Ok(Self { raw_path, max })
    }
}

impl Adc for IioAdc {
    fn read_raw(&mut self) -> Result<u16> {
        read_value(&self.raw_path)
    }

    fn max_value(&self) -> u16 {
        self.max
    }
}

/// An exported sysfs GPIO line.
#[derive(Debug)]
pub struct SysfsGpio {
    value_path: PathBuf,
}

impl SysfsGpio {
    pub fn open(sysfs_root: &Path, pin: u32) -> Result<Self> {
        let value_path = existing(
            sysfs_root
                .join("class/gpio")
                .join(format!("gpio{pin}"))
                .join("value"),
        )
        .with_context(|| format!("GPIO {pin} is not exported"))?;

        Ok(Self { value_path })
    }
}

impl DigitalInput for SysfsGpio {
    fn is_high(&mut self) -> Result<bool> {
        match read_value::<u8>(&self.value_path)? {
            0 => Ok(false),
            1 => Ok(true),
            v => bail!("unexpected GPIO value: {v}"),
        }
    }
}

impl DigitalOutput for SysfsGpio {
    fn set(&mut self, high: bool) -> Result<()> {
        fs::write(&self.value_path, if high { "1" } else { "0" })
            .with_context(|| format!("failed to write {}", self.value_path.display()))
    }
}

pub fn open_devices(config: &SensorConfig) -> Result<Devices> {
    let iio = config.sysfs_root.join("bus/iio/devices");

    let hygrometer = IioHygrometer::open(&iio.join(&config.dht_device))
        .context("failed to open DHT22 sensor")?;
    let gas_adc = IioAdc::open(
        &iio.join(&config.adc_device),
        config.gas_adc_channel,
        config.adc_resolution_bits,
    )
    .context("failed to open gas sensor ADC")?;
    let light = SysfsGpio::open(&config.sysfs_root, config.light_gpio)
        .context("failed to open light sensor")?;
    let motion = SysfsGpio::open(&config.sysfs_root, config.pir_gpio)
        .context("failed to open motion sensor")?;
    let indicator = SysfsGpio::open(&config.sysfs_root, config.led_gpio)
        .context("failed to open indicator LED")?;

    Ok(Devices {
        hygrometer: Box::new(hygrometer),
        gas_adc: Box::new(gas_adc),
        light: Box::new(light),
        motion: Box::new(motion),
        indicator: Box::new(indicator),
    })
}

fn existing(path: PathBuf) -> Result<PathBuf> {
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }

    Ok(path)
}

fn read_value<T>(path: &Path) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

    text.trim()
        .parse()
        .with_context(|| format!("failed to parse {}: {:?}", path.display(), text.trim()))
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tempfile::TempDir;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        sensors: SensorConfig,
    }

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn fake_sysfs() -> TempDir {
        let root = TempDir::new().unwrap();
        let r = root.path();
        write(r, "bus/iio/devices/iio:device0/in_temp_input", "21300\n");
        write(r, "bus/iio/devices/iio:device0/in_humidityrelative_input", "48700\n");
        write(r, "bus/iio/devices/iio:device1/in_voltage0_raw", "312\n");
        write(r, "class/gpio/gpio24/value", "0\n");
        write(r, "class/gpio/gpio23/value", "1\n");
        write(r, "class/gpio/gpio25/value", "0\n");
        root
    }

    fn config(root: &Path) -> SensorConfig {
        let root = root.to_str().unwrap();
        Cli::parse_from(["test", "--sysfs-root", root]).sensors
    }

    #[test]
    fn reads_devices_from_sysfs_tree() {
        let root = fake_sysfs();
        let mut devices = open_devices(&config(root.path())).unwrap();

        let sample = devices.hygrometer.read().unwrap();
        assert!((sample.temperature_celsius - 21.3).abs() < 1e-9);
        assert!((sample.humidity_percent - 48.7).abs() < 1e-9);

        assert_eq!(devices.gas_adc.read_raw().unwrap(), 312);
        assert_eq!(devices.gas_adc.max_value(), 1023);

        assert!(!devices.light.is_high().unwrap());
        assert!(devices.motion.is_high().unwrap());
    }

    #[test]
    fn indicator_writes_gpio_value() {
        let root = fake_sysfs();
        let mut devices = open_devices(&config(root.path())).unwrap();

        devices.indicator.set(true).unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("class/gpio/gpio25/value")).unwrap(),
            "1"
        );

        devices.indicator.set(false).unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("class/gpio/gpio25/value")).unwrap(),
            "0"
        );
    }

    #[test]
    fn missing_gpio_is_a_startup_error() {
        let root = fake_sysfs();
        fs::remove_file(root.path().join("class/gpio/gpio23/value")).unwrap();

        assert!(open_devices(&config(root.path())).is_err());
    }

    #[test]
    fn garbage_values_are_read_errors() {
        let root = fake_sysfs();
        let mut devices = open_devices(&config(root.path())).unwrap();
        write(root.path(), "class/gpio/gpio24/value", "7\n");
        write(
            root.path(),
            "bus/iio/devices/iio:device0/in_temp_input",
            "not a number",
        );

        assert!(devices.light.is_high().is_err());
        assert!(devices.hygrometer.read().is_err());
    }
}
