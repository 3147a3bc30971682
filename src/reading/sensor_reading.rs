use serde::{Deserialize, Deserializer, Serialize};

/// One full set of sensor values. Any float may be absent when its sensor
/// failed to produce a usable value for this tick.
///
/// Fields are declared in alphabetical order so the serialized object has a
/// stable key order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(deserialize_with = "nullable")]
    pub co: Option<f64>,

    #[serde(deserialize_with = "nullable")]
    pub humidity: Option<f64>,

    pub light: bool,

    #[serde(deserialize_with = "nullable")]
    pub lpg: Option<f64>,

    pub motion: bool,

    #[serde(deserialize_with = "nullable")]
    pub smoke: Option<f64>,

    #[serde(deserialize_with = "nullable")]
    pub temperature: Option<f64>,
}

/// Accepts `null` but, unlike a plain `Option`, rejects a missing key.
fn nullable<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TemperatureHumidity {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GasConcentrations {
    pub lpg: Option<f64>,
    pub co: Option<f64>,
    pub smoke: Option<f64>,
}

impl SensorReading {
    pub fn new(
        climate: TemperatureHumidity,
        gas: GasConcentrations,
        light: bool,
        motion: bool,
    ) -> Self {
        Self {
            co: gas.co,
            humidity: climate.humidity,
            light,
            lpg: gas.lpg,
            motion,
            smoke: gas.smoke,
            temperature: climate.temperature,
        }
    }
}
