//! Shared domain enums, stored as lowercase text columns

use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Postgres};

/// Implements `as_str`, `Display`, `FromStr` and the text-backed SQLx conversions
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $slug:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $slug,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($slug => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl sqlx::Type<Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<Postgres>>::type_info()
            }

            // Columns are VARCHAR, not TEXT
            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<Postgres>>::compatible(ty)
            }
        }

        impl<'r> Decode<'r, Postgres> for $name {
            fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let s: String = Decode::<Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl Encode<'_, Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
                <&str as Encode<Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Borrower account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Regular,
    Librarian,
    Admin,
}

text_enum!(Role {
    Regular => "regular",
    Librarian => "librarian",
    Admin => "admin",
});

impl Role {
    /// Transfer copies between branches and change their administrative status
    pub fn can_manage_catalog(&self) -> bool {
        matches!(self, Role::Librarian | Role::Admin)
    }

    /// Issue, return and reserve on behalf of any borrower
    pub fn can_issue_loans(&self) -> bool {
        matches!(self, Role::Librarian | Role::Admin)
    }
}

// ---------------------------------------------------------------------------
// CopyStatus
// ---------------------------------------------------------------------------

/// Physical copy status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    #[default]
    Available,
    Loaned,
    Maintenance,
    Lost,
}

text_enum!(CopyStatus {
    Available => "available",
    Loaned => "loaned",
    Maintenance => "maintenance",
    Lost => "lost",
});

// ---------------------------------------------------------------------------
// LoanStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Returned,
}

text_enum!(LoanStatus {
    Active => "active",
    Returned => "returned",
});

// ---------------------------------------------------------------------------
// ReservationStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Fulfilled,
    Cancelled,
    Expired,
}

text_enum!(ReservationStatus {
    Active => "active",
    Fulfilled => "fulfilled",
    Cancelled => "cancelled",
    Expired => "expired",
});
