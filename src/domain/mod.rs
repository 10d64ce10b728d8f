//! Domain models: typed rows, status machines, reference formats.

pub mod events;
pub mod order;
pub mod payment;
pub mod product;
pub mod refund;
pub mod review;
pub mod tenant;

use rand::RngCore;

/// Reference string of the form `<PREFIX>-<16 uppercase hex>`, used for
/// gateway transaction refs (`TX-`) and refunds (`REF-`).
pub fn random_ref(prefix: &str) -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}-{}", prefix, hex::encode_upper(bytes))
}

/// Serde adapter rendering `Decimal` as a string with two fractional
/// digits, accepting either a string or a bare number on input.
pub mod decimal_string {
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &Decimal, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{:.2}", amount.round_dp(2)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Decimal, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(f64),
        }
        match Raw::deserialize(d)? {
            Raw::Text(t) => t.trim().parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Decimal::from_f64(n)
                .ok_or_else(|| serde::de::Error::custom("amount out of range")),
        }
    }

    pub mod option {
        use rust_decimal::prelude::FromPrimitive;
        use rust_decimal::Decimal;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            amount: &Option<Decimal>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match amount {
                Some(a) => super::serialize(a, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<Decimal>, D::Error> {
            #[derive(Deserialize)]
            #[serde(untagged)]
            enum Raw {
                Text(String),
                Number(f64),
            }
            match Option::<Raw>::deserialize(d)? {
                None => Ok(None),
                Some(Raw::Text(t)) => t
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                Some(Raw::Number(n)) => Decimal::from_f64(n)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom("amount out of range")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde::{Deserialize, Serialize};

    #[test]
    fn random_ref_shape() {
        let r = random_ref("TX");
        assert_eq!(r.len(), 3 + 16);
        assert!(r.starts_with("TX-"));
        assert!(r[3..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn random_refs_are_distinct() {
        let a = random_ref("REF");
        let b = random_ref("REF");
        assert_ne!(a, b);
    }

    #[derive(Serialize, Deserialize)]
    struct Amount(#[serde(with = "decimal_string")] Decimal);

    #[test]
    fn decimal_renders_two_digits() {
        let json = serde_json::to_string(&Amount(Decimal::new(2405, 1))).unwrap();
        assert_eq!(json, "\"240.50\"");
        let json = serde_json::to_string(&Amount(Decimal::new(120, 0))).unwrap();
        assert_eq!(json, "\"120.00\"");
    }

    #[test]
    fn decimal_accepts_string_or_number() {
        let a: Amount = serde_json::from_str("\"19.99\"").unwrap();
        assert_eq!(a.0, Decimal::new(1999, 2));
        let a: Amount = serde_json::from_str("240").unwrap();
        assert_eq!(a.0, Decimal::new(240, 0));
    }
}
