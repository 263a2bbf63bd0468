//! `sqlx` has no native SQLite mapping for `rust_decimal::Decimal` — SQLite
//! itself has no decimal type — so fixed-precision columns (the `(5,4)`/
//! `(7,6)` confidence/score convention) round-trip through this newtype,
//! stored as `NUMERIC`-affinity TEXT.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{Sqlite, SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Type};
use std::ops::Deref;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(pub Decimal);

impl Amount {
    pub fn into_inner(self) -> Decimal {
        self.0
    }
}

impl Deref for Amount {
    type Target = Decimal;
    fn deref(&self) -> &Decimal {
        &self.0
    }
}

impl From<Decimal> for Amount {
    fn from(d: Decimal) -> Self {
        Amount(d)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Type<Sqlite> for Amount {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

impl<'r> Decode<'r, Sqlite> for Amount {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let text = <String as Decode<Sqlite>>::decode(value)?;
        Ok(Amount(Decimal::from_str(&text)?))
    }
}

impl<'q> Encode<'q, Sqlite> for Amount {
    fn encode_by_ref(&self, buf: &mut Vec<SqliteArgumentValue<'q>>) -> sqlx::encode::IsNull {
        buf.push(SqliteArgumentValue::Text(self.0.to_string().into()));
        sqlx::encode::IsNull::No
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_displays_like_its_decimal() {
        let a = Amount(Decimal::from_str("0.1234").unwrap());
        assert_eq!(a.to_string(), "0.1234");
    }
}
