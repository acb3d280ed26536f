//! Wall-clock helpers. Timestamps leave the crate as fractional seconds since
//! the Unix epoch, which is what the front-end plots against.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch
pub fn unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

fn from_unix_seconds(secs: f64) -> Option<SystemTime> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    UNIX_EPOCH.checked_add(Duration::from_secs_f64(secs))
}

/// `#[serde(with = "epoch_secs")]` for `SystemTime` fields
pub mod epoch_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::SystemTime;

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(super::unix_seconds(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        super::from_unix_seconds(secs).ok_or_else(|| D::Error::custom("invalid epoch timestamp"))
    }
}

/// `#[serde(with = "epoch_secs_opt")]` for `Option<SystemTime>` fields
pub mod epoch_secs_opt {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::SystemTime;

    pub fn serialize<S: Serializer>(
        time: &Option<SystemTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match time {
            Some(t) => serializer.serialize_some(&super::unix_seconds(*t)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<SystemTime>, D::Error> {
        match Option::<f64>::deserialize(deserializer)? {
            Some(secs) => super::from_unix_seconds(secs)
                .map(Some)
                .ok_or_else(|| D::Error::custom("invalid epoch timestamp")),
            None => Ok(None),
        }
    }
}
