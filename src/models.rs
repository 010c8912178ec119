use chrono::NaiveDate;
use rust_decimal::Decimal;

// ---- Canonical enums (stored as uppercase TEXT) ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Purchase,
    Credit,
    Transfer,
    Deposit,
    Withdrawal,
    Fee,
    Interest,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "PURCHASE",
            TransactionType::Credit => "CREDIT",
            TransactionType::Transfer => "TRANSFER",
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Fee => "FEE",
            TransactionType::Interest => "INTEREST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PURCHASE" => Some(TransactionType::Purchase),
            "CREDIT" => Some(TransactionType::Credit),
            "TRANSFER" => Some(TransactionType::Transfer),
            "DEPOSIT" => Some(TransactionType::Deposit),
            "WITHDRAWAL" => Some(TransactionType::Withdrawal),
            "FEE" => Some(TransactionType::Fee),
            "INTEREST" => Some(TransactionType::Interest),
            _ => None,
        }
    }

    /// Map a free-text statement label to the canonical type. Statements use
    /// a handful of spellings the enum names don't cover: card payments show
    /// up as "Payment" (or "Credit/Payment" in CSV exports) and older exports
    /// say "Debit" for purchases.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "DEBIT" => Some(TransactionType::Purchase),
            "PAYMENT" | "CREDIT/PAYMENT" => Some(TransactionType::Credit),
            other => TransactionType::parse(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvestmentTransactionType {
    Buy,
    Sell,
    Dividend,
    Interest,
    Split,
    Merger,
    Spinoff,
    Reinvestment,
}

impl InvestmentTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentTransactionType::Buy => "BUY",
            InvestmentTransactionType::Sell => "SELL",
            InvestmentTransactionType::Dividend => "DIVIDEND",
            InvestmentTransactionType::Interest => "INTEREST",
            InvestmentTransactionType::Split => "SPLIT",
            InvestmentTransactionType::Merger => "MERGER",
            InvestmentTransactionType::Spinoff => "SPINOFF",
            InvestmentTransactionType::Reinvestment => "REINVESTMENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(InvestmentTransactionType::Buy),
            "SELL" => Some(InvestmentTransactionType::Sell),
            "DIVIDEND" => Some(InvestmentTransactionType::Dividend),
            "INTEREST" => Some(InvestmentTransactionType::Interest),
            "SPLIT" => Some(InvestmentTransactionType::Split),
            "MERGER" => Some(InvestmentTransactionType::Merger),
            "SPINOFF" => Some(InvestmentTransactionType::Spinoff),
            "REINVESTMENT" => Some(InvestmentTransactionType::Reinvestment),
            _ => None,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        InvestmentTransactionType::parse(&label.trim().to_ascii_uppercase())
    }

    /// Types that open a position and therefore justify lazily creating a
    /// holding row when none exists yet.
    pub fn opens_position(&self) -> bool {
        matches!(
            self,
            InvestmentTransactionType::Buy | InvestmentTransactionType::Reinvestment
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityType {
    Stock,
    Option,
    Dividend,
    Interest,
    Fee,
    Deposit,
    Withdrawal,
    Other,
}

impl SecurityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityType::Stock => "STOCK",
            SecurityType::Option => "OPTION",
            SecurityType::Dividend => "DIVIDEND",
            SecurityType::Interest => "INTEREST",
            SecurityType::Fee => "FEE",
            SecurityType::Deposit => "DEPOSIT",
            SecurityType::Withdrawal => "WITHDRAWAL",
            SecurityType::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STOCK" => Some(SecurityType::Stock),
            "OPTION" => Some(SecurityType::Option),
            "DIVIDEND" => Some(SecurityType::Dividend),
            "INTEREST" => Some(SecurityType::Interest),
            "FEE" => Some(SecurityType::Fee),
            "DEPOSIT" => Some(SecurityType::Deposit),
            "WITHDRAWAL" => Some(SecurityType::Withdrawal),
            "OTHER" => Some(SecurityType::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Csv,
    Pdf,
    Manual,
    Api,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Csv => "CSV",
            SourceType::Pdf => "PDF",
            SourceType::Manual => "MANUAL",
            SourceType::Api => "API",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CSV" => Some(SourceType::Csv),
            "PDF" => Some(SourceType::Pdf),
            "MANUAL" => Some(SourceType::Manual),
            "API" => Some(SourceType::Api),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Checking,
    Savings,
    CreditCard,
    Loan,
    Investment,
    Other,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "CHECKING",
            AccountType::Savings => "SAVINGS",
            AccountType::CreditCard => "CREDIT_CARD",
            AccountType::Loan => "LOAN",
            AccountType::Investment => "INVESTMENT",
            AccountType::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CHECKING" => Some(AccountType::Checking),
            "SAVINGS" => Some(AccountType::Savings),
            "CREDIT_CARD" => Some(AccountType::CreditCard),
            "LOAN" => Some(AccountType::Loan),
            "INVESTMENT" => Some(AccountType::Investment),
            "OTHER" => Some(AccountType::Other),
            _ => None,
        }
    }

    /// Liability accounts carry what you owe; everything else is an asset.
    pub fn is_liability(&self) -> bool {
        matches!(self, AccountType::CreditCard | AccountType::Loan)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipType {
    Offsets,
    Refunds,
    Splits,
    FeesFor,
    Reverses,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Offsets => "OFFSETS",
            RelationshipType::Refunds => "REFUNDS",
            RelationshipType::Splits => "SPLITS",
            RelationshipType::FeesFor => "FEES_FOR",
            RelationshipType::Reverses => "REVERSES",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OFFSETS" => Some(RelationshipType::Offsets),
            "REFUNDS" => Some(RelationshipType::Refunds),
            "SPLITS" => Some(RelationshipType::Splits),
            "FEES_FOR" => Some(RelationshipType::FeesFor),
            "REVERSES" => Some(RelationshipType::Reverses),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    System,
    EodJob,
    Manual,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::System => "SYSTEM",
            SnapshotSource::EodJob => "EOD_JOB",
            SnapshotSource::Manual => "MANUAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SYSTEM" => Some(SnapshotSource::System),
            "EOD_JOB" => Some(SnapshotSource::EodJob),
            "MANUAL" => Some(SnapshotSource::Manual),
            _ => None,
        }
    }
}

// ---- Ledger entities ----

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub account_type: AccountType,
    pub institution_name: Option<String>,
    pub account_number_last4: Option<String>,
    pub balance: Decimal,
    pub balance_last_updated: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub account_id: Option<i64>,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub transaction_hash: String,
    pub transaction_date: NaiveDate,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub description: Option<String>,
    pub institution_name: String,
    pub account_number_last4: Option<String>,
    pub source_type: SourceType,
    pub needs_review: bool,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct InvestmentHolding {
    pub id: i64,
    pub account_id: i64,
    pub symbol: String,
    pub quantity: Decimal,
    pub average_cost_basis: Decimal,
    pub current_price: Option<Decimal>,
    pub last_price_update: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct InvestmentTransaction {
    pub id: i64,
    pub user_id: i64,
    pub account_id: Option<i64>,
    pub holding_id: Option<i64>,
    pub transaction_hash: String,
    pub transaction_date: NaiveDate,
    pub transaction_type: InvestmentTransactionType,
    pub symbol: Option<String>,
    pub api_symbol: Option<String>,
    pub security_type: Option<SecurityType>,
    pub quantity: Option<Decimal>,
    pub price_per_share: Option<Decimal>,
    pub amount: Decimal,
    pub description: Option<String>,
    pub institution_name: String,
    pub source_type: SourceType,
    pub needs_review: bool,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Tag {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct TransactionRelationship {
    pub id: i64,
    pub from_transaction_id: i64,
    pub to_transaction_id: i64,
    pub relationship_type: RelationshipType,
    pub amount_allocated: Option<Decimal>,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub id: i64,
    pub account_id: i64,
    pub value_date: NaiveDate,
    pub balance: Decimal,
    pub total_cost_basis: Option<Decimal>,
    pub unrealized_gain_loss: Option<Decimal>,
    pub principal_paid_ytd: Option<Decimal>,
    pub interest_paid_ytd: Option<Decimal>,
    pub snapshot_source: SnapshotSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_type_roundtrip() {
        for t in [
            TransactionType::Purchase,
            TransactionType::Credit,
            TransactionType::Transfer,
            TransactionType::Deposit,
            TransactionType::Withdrawal,
            TransactionType::Fee,
            TransactionType::Interest,
        ] {
            assert_eq!(TransactionType::parse(t.as_str()), Some(t));
        }
        assert_eq!(TransactionType::parse("GIFT"), None);
    }

    #[test]
    fn test_from_label_statement_vocabulary() {
        assert_eq!(TransactionType::from_label("Purchase"), Some(TransactionType::Purchase));
        assert_eq!(TransactionType::from_label("payment"), Some(TransactionType::Credit));
        assert_eq!(TransactionType::from_label("Credit/Payment"), Some(TransactionType::Credit));
        assert_eq!(TransactionType::from_label("Debit"), Some(TransactionType::Purchase));
        assert_eq!(TransactionType::from_label(" Deposit "), Some(TransactionType::Deposit));
        assert_eq!(TransactionType::from_label("Balance Adjustment"), None);
    }

    #[test]
    fn test_investment_label_mapping() {
        assert_eq!(
            InvestmentTransactionType::from_label("buy"),
            Some(InvestmentTransactionType::Buy)
        );
        assert_eq!(
            InvestmentTransactionType::from_label("REINVESTMENT"),
            Some(InvestmentTransactionType::Reinvestment)
        );
        // Schwab normalizes transfers/fees to labels the ledger has no
        // investment type for; those rows are skipped by the importer.
        assert_eq!(InvestmentTransactionType::from_label("TRANSFER"), None);
        assert_eq!(InvestmentTransactionType::from_label("OTHER"), None);
        assert_eq!(InvestmentTransactionType::from_label("Div/Int"), None);
    }

    #[test]
    fn test_opens_position() {
        assert!(InvestmentTransactionType::Buy.opens_position());
        assert!(InvestmentTransactionType::Reinvestment.opens_position());
        assert!(!InvestmentTransactionType::Sell.opens_position());
        assert!(!InvestmentTransactionType::Dividend.opens_position());
    }

    #[test]
    fn test_account_type_liability_split() {
        assert!(AccountType::CreditCard.is_liability());
        assert!(AccountType::Loan.is_liability());
        assert!(!AccountType::Checking.is_liability());
        assert!(!AccountType::Investment.is_liability());
        assert_eq!(AccountType::parse("credit_card"), Some(AccountType::CreditCard));
    }
}
