// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Durations written the way cluster objects carry them: `90s`, `1m30s`, `500ms`.

/// `serde(with)` adapter for `Option<Duration>`.
pub mod opt {
    use humantime::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)] // signature imposed by serde
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&format_duration(*d).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        use serde::de::Error;
        Option::<String>::deserialize(d)?
            .map(|s| {
                parse_duration(&s)
                    .map_err(|e| D::Error::custom(format!("invalid duration '{s}': {e}")))
            })
            .transpose()
    }
}
