//! Shared utility functions for NLDI polygon query crates.

/// Coordinate helpers
pub mod coords {
    /// Number of decimal digits kept on every AOI coordinate (~11 m).
    pub const DECIMAL_DIGITS: i32 = 4;

    /// Round a value to `digits` decimal places.
    pub fn round_to(value: f64, digits: i32) -> f64 {
        let factor = 10f64.powi(digits);
        (value * factor).round() / factor
    }

    /// Round a lon/lat pair to [`DECIMAL_DIGITS`].
    pub fn round_pair(x: f64, y: f64) -> (f64, f64) {
        (round_to(x, DECIMAL_DIGITS), round_to(y, DECIMAL_DIGITS))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_round_to_four_digits() {
            assert_eq!(round_to(-105.123_456, 4), -105.1235);
            assert_eq!(round_to(40.000_04, 4), 40.0);
            assert_eq!(round_to(12.0, 4), 12.0);
        }

        #[test]
        fn test_round_pair() {
            let (x, y) = round_pair(-105.987_66, 39.123_44);
            assert_eq!(x, -105.9877);
            assert_eq!(y, 39.1234);
        }
    }
}

/// Identifier coercion for upstream JSON payloads
pub mod ids {
    use serde_json::Value;

    /// Read an integer identifier that may arrive as a JSON number or a string.
    ///
    /// Upstream services are inconsistent: the geoserver returns `featureid`
    /// as a float-typed number while the NLDI returns `nhdplus_comid` as a
    /// string. Values with a fractional part are rejected.
    pub fn json_to_i64(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| f as i64)
                })
            }
            _ => None,
        }
    }

    /// The station code carried at the tail of an NLDI identifier
    /// (e.g. `USGS-06719505` -> `06719505`).
    pub fn code_from_identifier(identifier: &str) -> &str {
        match identifier.rsplit_once('-') {
            Some((_, tail)) => tail,
            None => identifier,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn test_json_to_i64() {
            assert_eq!(json_to_i64(&json!(1234)), Some(1234));
            assert_eq!(json_to_i64(&json!(1234.0)), Some(1234));
            assert_eq!(json_to_i64(&json!("5678")), Some(5678));
            assert_eq!(json_to_i64(&json!(" 91.0 ")), Some(91));
            assert_eq!(json_to_i64(&json!(1.5)), None);
            assert_eq!(json_to_i64(&json!("abc")), None);
            assert_eq!(json_to_i64(&json!(null)), None);
        }

        #[test]
        fn test_code_from_identifier() {
            assert_eq!(code_from_identifier("USGS-06719505"), "06719505");
            assert_eq!(code_from_identifier("06719505"), "06719505");
        }
    }
}

/// Order-preserving deduplication
pub mod dedup {
    use std::collections::HashSet;
    use std::hash::Hash;

    /// Drop repeated values, keeping the first occurrence of each.
    pub fn first_seen<T>(items: impl IntoIterator<Item = T>) -> Vec<T>
    where
        T: Eq + Hash + Clone,
    {
        let mut seen = HashSet::new();
        items
            .into_iter()
            .filter(|item| seen.insert(item.clone()))
            .collect()
    }

    /// Drop items whose key was already produced by an earlier item.
    pub fn first_seen_by_key<T, K, F>(items: impl IntoIterator<Item = T>, mut key: F) -> Vec<T>
    where
        K: Eq + Hash,
        F: FnMut(&T) -> K,
    {
        let mut seen = HashSet::new();
        items
            .into_iter()
            .filter(|item| seen.insert(key(item)))
            .collect()
    }

}
