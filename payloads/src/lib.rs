#[cfg(feature = "api-client")]
pub mod api_client;
pub mod requests;
pub mod responses;

#[cfg(feature = "api-client")]
pub use api_client::{APIClient, ClientError};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Macro for the `prefix_<uuid>` identifier newtypes used throughout the
/// ledger. Each id serializes as its prefixed string form so it round-trips
/// through JSON and the `text` id columns unchanged, while staying backed by
/// a `Uuid` internally.
macro_rules! prefixed_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let suffix = s
                    .strip_prefix(concat!($prefix, "_"))
                    .ok_or(IdParseError::WrongPrefix)?;
                Ok(Self(Uuid::parse_str(suffix)?))
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdParseError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.to_string()
            }
        }

        #[cfg(feature = "use-sqlx")]
        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }
        }

        #[cfg(feature = "use-sqlx")]
        impl sqlx::Encode<'_, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <String as sqlx::Encode<sqlx::Postgres>>::encode(self.to_string(), buf)
            }
        }

        #[cfg(feature = "use-sqlx")]
        impl sqlx::Decode<'_, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'_>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok(s.parse()?)
            }
        }
    };
}

#[derive(Debug, thiserror::Error)]
pub enum IdParseError {
    #[error("id does not carry the expected prefix")]
    WrongPrefix,
    #[error("malformed uuid: {0}")]
    Uuid(#[from] uuid::Error),
}

prefixed_id!(LedgerId, "led");
prefixed_id!(BalanceId, "bln");
prefixed_id!(TransactionId, "txn");
prefixed_id!(MonitorId, "mon");

/// Either a literal balance id or an `@indicator` alias resolved lazily
/// against the general ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BalanceRef {
    Id(BalanceId),
    Indicator(String),
}

impl BalanceRef {
    pub fn as_indicator(&self) -> Option<&str> {
        match self {
            Self::Indicator(s) => Some(s.as_str()),
            Self::Id(_) => None,
        }
    }
}

impl std::fmt::Display for BalanceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Indicator(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for BalanceRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('@') {
            Ok(Self::Indicator(s.to_string()))
        } else if let Ok(id) = s.parse::<BalanceId>() {
            Ok(Self::Id(id))
        } else {
            // Not a recognized balance id shape; treat as an indicator so
            // round-tripping through storage never panics.
            Ok(Self::Indicator(s.to_string()))
        }
    }
}

impl TryFrom<String> for BalanceRef {
    type Error = std::convert::Infallible;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BalanceRef> for String {
    fn from(r: BalanceRef) -> String {
        r.to_string()
    }
}

#[cfg(feature = "use-sqlx")]
impl sqlx::Type<sqlx::Postgres> for BalanceRef {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

#[cfg(feature = "use-sqlx")]
impl sqlx::Encode<'_, sqlx::Postgres> for BalanceRef {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode(self.to_string(), buf)
    }
}

#[cfg(feature = "use-sqlx")]
impl sqlx::Decode<'_, sqlx::Postgres> for BalanceRef {
    fn decode(
        value: sqlx::postgres::PgValueRef<'_>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(s.parse().expect("BalanceRef::from_str is infallible"))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "use-sqlx",
    sqlx(type_name = "transaction_status", rename_all = "UPPERCASE")
)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Queued,
    Scheduled,
    Inflight,
    Applied,
    Void,
    Rejected,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Void | Self::Rejected)
    }

    /// The webhook event name fired when a transaction settles into this
    /// status, e.g. `transaction.applied`.
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Queued => "transaction.queued",
            Self::Scheduled => "transaction.scheduled",
            Self::Inflight => "transaction.inflight",
            Self::Applied => "transaction.applied",
            Self::Void => "transaction.void",
            Self::Rejected => "transaction.rejected",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "use-sqlx",
    sqlx(type_name = "monitor_field", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum MonitorField {
    Balance,
    CreditBalance,
    DebitBalance,
    InflightBalance,
    InflightCreditBalance,
    InflightDebitBalance,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "use-sqlx",
    sqlx(type_name = "monitor_operator", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum MonitorOperator {
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Equal,
    NotEqual,
}

impl MonitorOperator {
    pub fn evaluate(self, actual: i64, threshold: i64) -> bool {
        match self {
            Self::GreaterThan => actual > threshold,
            Self::LessThan => actual < threshold,
            Self::GreaterOrEqual => actual >= threshold,
            Self::LessOrEqual => actual <= threshold,
            Self::Equal => actual == threshold,
            Self::NotEqual => actual != threshold,
        }
    }
}

/// A single leg of a `Distribution`: either a fraction of the parent amount
/// or an absolute sub-amount, addressed to its own destination (or source,
/// for source-side distributions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionLeg {
    pub balance: BalanceRef,
    /// Exactly one of `fraction`/`amount` must be set; validated by the
    /// orchestrator when splitting a transaction.
    pub fraction: Option<f64>,
    pub amount: Option<f64>,
}

pub const GENERAL_LEDGER_ID: &str = "general_ledger";

/// The fixed ledger id that indicator-addressed balances auto-create into
/// when no explicit ledger is given. A single-tenant constant; multi-tenant
/// deployments would need to parameterize this.
pub fn general_ledger_id() -> LedgerId {
    LedgerId(Uuid::nil())
}
