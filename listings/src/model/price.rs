// Travel listings
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! The `Price` data type.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use travel_core::model::{ModelError, ModelResult};

/// Upper bound for prices, which matches a `DECIMAL(10, 2)` column.
const MAX_CENTS: i64 = 99_999_999_99;

/// A non-negative amount of money with cent precision.
///
/// Prices travel over the wire as strings with exactly two decimals (`"150.00"`) to avoid the
/// rounding issues of floating point numbers.  Parsing accepts fewer decimals, plain integers,
/// and JSON numbers with at most two fractional digits.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Price(i64);

impl Price {
    /// Creates a new price from a number of `cents`.
    pub fn from_cents(cents: i64) -> ModelResult<Self> {
        if cents < 0 {
            return Err(ModelError("Price cannot be negative".to_owned()));
        }
        if cents > MAX_CENTS {
            return Err(ModelError("Price is too large".to_owned()));
        }
        Ok(Self(cents))
    }

    /// Returns the price as a number of cents.
    pub fn as_cents(&self) -> i64 {
        self.0
    }
}

impl FromStr for Price {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        let invalid = || ModelError(format!("Invalid price '{}'", s));

        let (units, decimals) = s.split_once('.').unwrap_or((s, ""));
        if units.is_empty() || !units.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(invalid());
        }
        if decimals.len() > 2 || !decimals.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(invalid());
        }
        if s.ends_with('.') {
            return Err(invalid());
        }

        let units = units.parse::<i64>().map_err(|_| invalid())?;
        let cents = match decimals.len() {
            0 => 0,
            1 => decimals.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => decimals.parse::<i64>().map_err(|_| invalid())?,
        };
        let total = units.checked_mul(100).and_then(|u| u.checked_add(cents)).ok_or_else(invalid)?;
        Price::from_cents(total)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Visitor to deserialize a `Price` from a string or a number.
struct PriceVisitor;

impl Visitor<'_> for PriceVisitor {
    type Value = Price;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a decimal price with at most two fractional digits")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Price::from_str(v).map_err(|e| E::custom(e.to_string()))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let cents = i64::try_from(v)
            .ok()
            .and_then(|v| v.checked_mul(100))
            .ok_or_else(|| E::custom("Price is too large"))?;
        Price::from_cents(cents).map_err(|e| E::custom(e.to_string()))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let cents = v.checked_mul(100).ok_or_else(|| E::custom("Price is too large"))?;
        Price::from_cents(cents).map_err(|e| E::custom(e.to_string()))
    }

    /// Accepts numbers with a fractional part as long as their shortest decimal representation
    /// has at most two fractional digits.
    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if !v.is_finite() {
            return Err(E::custom(format!("Invalid price '{}'", v)));
        }
        if v < 0.0 {
            return Err(E::custom("Price cannot be negative"));
        }
        Price::from_str(&v.to_string()).map_err(|e| E::custom(e.to_string()))
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(PriceVisitor)
    }
}
