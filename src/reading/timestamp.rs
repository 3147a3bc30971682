use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";
const LENIENT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&time.format(WIRE_FORMAT))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse(&s).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {s}")))
}

fn parse(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, LENIENT_FORMAT))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_wire_and_rfc3339_forms() {
        let expected = Utc.with_ymd_and_hms(2021, 3, 27, 0, 0, 0).unwrap();

        assert_eq!(parse("2021-03-27 00:00:00.000000+00:00"), Some(expected));
        assert_eq!(parse("2021-03-27 00:00:00+00:00"), Some(expected));
        assert_eq!(parse("2021-03-27T00:00:00Z"), Some(expected));
        assert_eq!(parse("2021-03-27T02:00:00+02:00"), Some(expected));
    }

    #[test]
    fn rejects_timestamps_without_offset() {
        assert_eq!(parse("2021-03-27 00:00:00"), None);
        assert_eq!(parse("yesterday"), None);
    }
}
