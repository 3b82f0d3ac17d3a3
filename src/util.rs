use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use chrono::Utc;
use rand::RngCore;

/// Number of random bytes behind every API key
pub const API_KEY_BYTES: usize = 24;

const API_KEY_PREFIX: &str = "sk_";

/// Generate a fresh API key: `sk_` followed by 24 random bytes in hex.
///
/// Uniqueness is enforced by the store at creation time.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    format!("{API_KEY_PREFIX}{}", hex::encode(bytes))
}

/// Current time in whole seconds since the epoch.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

const AGENT_PORT: &str = "AGENT_PORT";

const DEFAULT_AGENT_PORT: u16 = 51243;

const AGENT_ADDR: &str = "AGENT_ADDR";

const DEFAULT_AGENT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0));

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

pub fn get_agent_port() -> u16 {
    env_or(AGENT_PORT, DEFAULT_AGENT_PORT)
}

pub fn get_agent_addr() -> IpAddr {
    env_or(AGENT_ADDR, DEFAULT_AGENT_ADDR)
}

/// Serde adapter for sample values.
///
/// JSON has no literal for non-finite floats, so `NaN`, `+Inf` and `-Inf` travel as
/// strings spelled the way the exposition format spells them. Finite values stay numbers.
pub mod float_repr {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() && value.is_sign_positive() {
            serializer.serialize_str("+Inf")
        } else if value.is_infinite() {
            serializer.serialize_str("-Inf")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl Visitor<'_> for FloatVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a number or one of \"NaN\", \"+Inf\", \"-Inf\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                "NaN" => Ok(f64::NAN),
                "+Inf" | "Inf" => Ok(f64::INFINITY),
                "-Inf" => Ok(f64::NEG_INFINITY),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }
}
