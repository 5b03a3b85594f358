//! Normalized ledger records.
//!
//! Every transport produces these shapes. The revenue/expense flags on
//! [`Ledger`] are always derived here from `name` and `parent` so that the
//! classification is identical whichever transport delivered the ledger.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Keywords marking a ledger as revenue.
pub const REVENUE_KEYWORDS: &[&str] = &["sales", "income", "revenue", "receipt"];

/// Keywords marking a ledger as expense.
pub const EXPENSE_KEYWORDS: &[&str] = &["expense", "purchase", "cost", "salary", "rent"];

// ============================================================================
// Records
// ============================================================================

/// A named book of accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub name: String,
    pub guid: String,
    pub fiscal_start: String,
    pub fiscal_end: String,
}

/// A ledger account with derived classification flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    pub name: String,
    pub parent: String,
    pub opening_balance: f64,
    pub closing_balance: f64,
    pub is_revenue: bool,
    pub is_expense: bool,
}

impl Ledger {
    /// Builds a ledger, computing `is_revenue` and `is_expense`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        parent: impl Into<String>,
        opening_balance: f64,
        closing_balance: f64,
    ) -> Self {
        let name = name.into();
        let parent = parent.into();
        let (is_revenue, is_expense) = classify(&name, &parent);

        Self {
            name,
            parent,
            opening_balance,
            closing_balance,
            is_revenue,
            is_expense,
        }
    }

    /// Recomputes the classification flags from `name` and `parent`.
    ///
    /// Used on ledgers that arrive already shaped (for example from a JSON
    /// payload) so flags from the wire are never trusted.
    pub fn reclassify(&mut self) {
        let (is_revenue, is_expense) = classify(&self.name, &self.parent);
        self.is_revenue = is_revenue;
        self.is_expense = is_expense;
    }
}

/// An accounting voucher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    pub date: String,
    pub number: String,
    #[serde(rename = "type")]
    pub voucher_type: String,
    pub party_name: String,
    pub amount: f64,
    pub narration: String,
}

/// An inventory item with quantity and value balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockItem {
    pub name: String,
    pub parent: String,
    pub opening_qty: f64,
    pub closing_qty: f64,
    pub opening_value: f64,
    pub closing_value: f64,
}

// ============================================================================
// Classification
// ============================================================================

/// Returns `(is_revenue, is_expense)` for a ledger name and parent group.
///
/// A keyword matches case-insensitively at the start of any word in either
/// field, so `Expenses` and `Rental` match while `Current` does not.
#[must_use]
pub fn classify(name: &str, parent: &str) -> (bool, bool) {
    let name = name.to_lowercase();
    let parent = parent.to_lowercase();
    let words: Vec<&str> = name
        .split(|c: char| !c.is_alphanumeric())
        .chain(parent.split(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .collect();
    let matches_any = |keywords: &[&str]| {
        words
            .iter()
            .any(|word| keywords.iter().any(|keyword| word.starts_with(keyword)))
    };

    (matches_any(REVENUE_KEYWORDS), matches_any(EXPENSE_KEYWORDS))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sales_account_is_revenue() {
        let ledger = Ledger::new("Sales Account", "Direct Income", 0.0, 0.0);
        assert!(ledger.is_revenue);
        assert!(!ledger.is_expense);
    }

    #[test]
    fn test_office_rent_is_expense() {
        let ledger = Ledger::new("Office Rent", "Indirect Expenses", 0.0, 0.0);
        assert!(ledger.is_expense);
        assert!(!ledger.is_revenue);
    }

    #[test]
    fn test_cash_is_neither() {
        let ledger = Ledger::new("Cash", "Current Assets", 0.0, 0.0);
        assert!(!ledger.is_revenue);
        assert!(!ledger.is_expense);
    }

    #[test]
    fn test_keyword_inside_a_word_does_not_match() {
        assert_eq!(classify("Bank OD", "Current Liabilities"), (false, false));
        assert_eq!(classify("Recurrent Deposit", "Investments"), (false, false));
    }

    #[test]
    fn test_keyword_at_word_start_matches() {
        assert_eq!(classify("Rental Income", "Indirect Incomes"), (true, true));
        assert_eq!(classify("Freight-Costs", "Misc"), (false, true));
    }

    #[test]
    fn test_match_is_case_insensitive_on_parent() {
        assert_eq!(classify("Misc", "PURCHASE ACCOUNTS"), (false, true));
        assert_eq!(classify("Interest Receipts", "Other"), (true, false));
    }

    #[test]
    fn test_reclassify_overrides_wire_flags() {
        let mut ledger = Ledger {
            name: "Salary Payable".into(),
            parent: "Current Liabilities".into(),
            opening_balance: 0.0,
            closing_balance: 0.0,
            is_revenue: true,
            is_expense: false,
        };
        ledger.reclassify();
        assert!(!ledger.is_revenue);
        assert!(ledger.is_expense);
    }

    #[test]
    fn test_voucher_serializes_type_field() {
        let voucher = Voucher {
            date: "20250401".into(),
            number: "1".into(),
            voucher_type: "Sales".into(),
            party_name: "Beta".into(),
            amount: 10.0,
            narration: String::new(),
        };
        let json = serde_json::to_value(&voucher).expect("serialize");
        assert_eq!(json["type"], "Sales");
        assert_eq!(json["partyName"], "Beta");
    }
}
