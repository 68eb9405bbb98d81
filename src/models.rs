use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnType {
    Business,
    Personal,
    Unreviewed,
    Split,
}

impl TxnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Business => "Business",
            Self::Personal => "Personal",
            Self::Unreviewed => "Unreviewed",
            Self::Split => "Split",
        }
    }
}

impl std::str::FromStr for TxnType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "business" => Ok(Self::Business),
            "personal" => Ok(Self::Personal),
            "unreviewed" => Ok(Self::Unreviewed),
            "split" => Ok(Self::Split),
            _ => Err(format!("Unknown transaction type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessType {
    Income,
    Expense,
    Transfer,
}

impl BusinessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "Income",
            Self::Expense => "Expense",
            Self::Transfer => "Transfer",
        }
    }
}

impl std::str::FromStr for BusinessType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            _ => Err(format!("Unknown business type: {s}")),
        }
    }
}

/// Lifecycle status. Only ever moves Pending -> Cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Cleared,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Cleared => "Cleared",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "cleared" => Ok(Self::Cleared),
            _ => Err(format!("Unknown status: {s}")),
        }
    }
}

macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_column!(TxnType);
text_column!(BusinessType);
text_column!(Status);

/// The `{type, businessType, category}` triple a rule or a user assigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub txn_type: TxnType,
    pub business_type: Option<BusinessType>,
    pub category: Option<String>,
}

impl Classification {
    /// Fallback used when no rule matches: money in is assumed to be sales,
    /// money out waits for review.
    pub fn default_for_amount(amount: f64) -> Self {
        if amount > 0.0 {
            Self {
                txn_type: TxnType::Business,
                business_type: Some(BusinessType::Income),
                category: Some("Sales".to_string()),
            }
        } else {
            Self {
                txn_type: TxnType::Unreviewed,
                business_type: Some(BusinessType::Expense),
                category: None,
            }
        }
    }
}

/// Source-neutral shape every ingestion path normalizes into before
/// fingerprinting and classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub date: NaiveDate,
    pub description: String,
    pub merchant: Option<String>,
    pub reference: Option<String>,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub date: NaiveDate,
    pub description: String,
    pub merchant: Option<String>,
    pub reference: Option<String>,
    pub amount: f64,
    pub classification: Classification,
    pub status: Status,
    pub tags: Vec<String>,
    pub fingerprint: Option<String>,
}

impl Transaction {
    pub fn as_candidate(&self) -> Candidate {
        Candidate {
            date: self.date,
            description: self.description.clone(),
            merchant: self.merchant.clone(),
            reference: self.reference.clone(),
            amount: self.amount,
        }
    }
}

/// A record ready to be written; the fingerprint is passed alongside it.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub candidate: Candidate,
    pub classification: Classification,
    pub status: Status,
    pub tags: Vec<String>,
}

/// Partial update: `None` leaves the column alone.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub reference: Option<String>,
    pub txn_type: Option<TxnType>,
    pub business_type: Option<Option<BusinessType>>,
    pub category: Option<Option<String>>,
    pub status: Option<Status>,
    pub fingerprint: Option<String>,
}

impl TransactionUpdate {
    pub fn is_empty(&self) -> bool {
        self.reference.is_none()
            && self.txn_type.is_none()
            && self.business_type.is_none()
            && self.category.is_none()
            && self.status.is_none()
            && self.fingerprint.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: i64,
    pub keyword: String,
    pub classification: Classification,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExclusionEntry {
    pub fingerprint: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub description: String,
    pub reason: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub account_uid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classification_for_income() {
        let c = Classification::default_for_amount(120.0);
        assert_eq!(c.txn_type, TxnType::Business);
        assert_eq!(c.business_type, Some(BusinessType::Income));
        assert_eq!(c.category.as_deref(), Some("Sales"));
    }

    #[test]
    fn test_default_classification_for_outflow() {
        let c = Classification::default_for_amount(-42.5);
        assert_eq!(c.txn_type, TxnType::Unreviewed);
        assert_eq!(c.business_type, Some(BusinessType::Expense));
        assert_eq!(c.category, None);
    }

    #[test]
    fn test_zero_amount_is_not_income() {
        let c = Classification::default_for_amount(0.0);
        assert_eq!(c.txn_type, TxnType::Unreviewed);
    }

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!("business".parse::<TxnType>(), Ok(TxnType::Business));
        assert_eq!("EXPENSE".parse::<BusinessType>(), Ok(BusinessType::Expense));
        assert_eq!(" cleared ".parse::<Status>(), Ok(Status::Cleared));
        assert!("refund".parse::<TxnType>().is_err());
    }
}
