pub(crate) mod round_number {
    /// Deserialize (via Serde) an optional round or height that the upstream
    /// emits either as a number or as a numeric string. A present but
    /// non-numeric value decodes as 0; an absent value stays `None` so
    /// callers can apply their documented fallback chain.
    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        des: D,
    ) -> Result<Option<u64>, D::Error> {
        struct RoundVisitor;
        impl<'de> serde::de::Visitor<'de> for RoundVisitor {
            type Value = Option<u64>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "A number or a numeric string.")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error, {
                Ok(Some(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error, {
                Ok(Some(v.max(0) as u64))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error, {
                if v.is_finite() {
                    Ok(Some(v.max(0.0) as u64))
                } else {
                    Ok(Some(0))
                }
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error, {
                Ok(Some(parse_numeric(v)))
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error, {
                Ok(None)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error, {
                Ok(None)
            }

            fn visit_some<D2: serde::Deserializer<'de>>(
                self,
                des: D2,
            ) -> Result<Self::Value, D2::Error> {
                des.deserialize_any(self)
            }
        }
        des.deserialize_option(RoundVisitor)
    }

    /// Parse a decimal string the way the upstream's consumers do: integer
    /// first, fractional values truncated, anything non-finite is 0.
    pub(crate) fn parse_numeric(v: &str) -> u64 {
        let v = v.trim();
        if let Ok(n) = v.parse::<u64>() {
            return n;
        }
        match v.parse::<f64>() {
            Ok(f) if f.is_finite() => f.max(0.0) as u64,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(default, deserialize_with = "super::round_number::deserialize")]
        height: Option<u64>,
    }

    #[test]
    fn accepts_numbers_and_numeric_strings() {
        let w: Wrapper = serde_json::from_str(r#"{"height": 42}"#).unwrap();
        assert_eq!(w.height, Some(42));
        let w: Wrapper = serde_json::from_str(r#"{"height": "42"}"#).unwrap();
        assert_eq!(w.height, Some(42));
        let w: Wrapper = serde_json::from_str(r#"{"height": "12.7"}"#).unwrap();
        assert_eq!(w.height, Some(12));
    }

    #[test]
    fn non_numeric_defaults_to_zero_and_missing_stays_none() {
        let w: Wrapper = serde_json::from_str(r#"{"height": "garbage"}"#).unwrap();
        assert_eq!(w.height, Some(0));
        let w: Wrapper = serde_json::from_str(r#"{"height": null}"#).unwrap();
        assert_eq!(w.height, None);
        let w: Wrapper = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(w.height, None);
    }
}
