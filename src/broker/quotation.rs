use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fixed-point number as used by the Invest API: `units + nano / 1e9`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    #[serde(serialize_with = "ser_i64_string", deserialize_with = "de_i64_flexible", default)]
    pub units: i64,
    #[serde(default)]
    pub nano: i32,
}

impl Quotation {
    pub fn from_f64(value: f64) -> Self {
        let units = value.trunc() as i64;
        let nano = ((value - units as f64) * 1e9).round() as i32;
        Self { units, nano }
    }

    pub fn to_f64(self) -> f64 {
        self.units as f64 + self.nano as f64 / 1e9
    }
}

/// Quotation with a currency code attached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoneyValue {
    #[serde(default)]
    pub currency: String,
    #[serde(serialize_with = "ser_i64_string", deserialize_with = "de_i64_flexible", default)]
    pub units: i64,
    #[serde(default)]
    pub nano: i32,
}

impl MoneyValue {
    pub fn rub(units: i64) -> Self {
        Self {
            currency: "RUB".to_string(),
            units,
            nano: 0,
        }
    }

    pub fn to_f64(&self) -> f64 {
        self.units as f64 + self.nano as f64 / 1e9
    }
}

/// int64 fields travel as JSON strings; accept plain numbers too
pub fn de_i64_flexible<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

pub fn ser_i64_string<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}
