//! Gateway request envelopes.
//!
//! Every gateway call is an Export/Collection request:
//!
//! ```text
//! ENVELOPE
//! ├── HEADER        VERSION, TALLYREQUEST=Export, TYPE=Collection, ID
//! └── BODY/DESC
//!     ├── STATICVARIABLES   SVEXPORTFORMAT, SVCURRENTCOMPANY?, SVFROMDATE?, SVTODATE?
//!     └── TDL/TDLMESSAGE/COLLECTION NAME=ID
//!         ├── TYPE    record type
//!         └── FETCH   comma-separated fields
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Write;

use chrono::{Days, NaiveDate};

// ============================================================================
// Constants
// ============================================================================

/// Compact date format used by the gateway.
pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

/// Span of the default voucher window.
pub const DEFAULT_VOUCHER_WINDOW_DAYS: u64 = 365;

const COMPANY_FIELDS: &[&str] = &["NAME", "GUID", "STARTINGFROM", "ENDINGAT"];
const LEDGER_FIELDS: &[&str] = &["NAME", "PARENT", "OPENINGBALANCE", "CLOSINGBALANCE"];
const VOUCHER_FIELDS: &[&str] = &[
    "DATE",
    "VOUCHERNUMBER",
    "VOUCHERTYPENAME",
    "PARTYLEDGERNAME",
    "AMOUNT",
    "NARRATION",
];
const STOCK_ITEM_FIELDS: &[&str] = &[
    "NAME",
    "PARENT",
    "OPENINGBALANCE",
    "CLOSINGBALANCE",
    "OPENINGVALUE",
    "CLOSINGVALUE",
];

// ============================================================================
// DateRange
// ============================================================================

/// Inclusive date window for voucher exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Creates a range from explicit bounds.
    #[inline]
    #[must_use]
    pub const fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// The 365 days ending on `today`.
    #[must_use]
    pub fn trailing_year(today: NaiveDate) -> Self {
        let from = today
            .checked_sub_days(Days::new(DEFAULT_VOUCHER_WINDOW_DAYS))
            .unwrap_or(NaiveDate::MIN);
        Self { from, to: today }
    }

    /// The default window ending on the local calendar date.
    #[must_use]
    pub fn trailing_year_from_now() -> Self {
        Self::trailing_year(chrono::Local::now().date_naive())
    }

    /// Fills missing bounds from the trailing-year default.
    #[must_use]
    pub fn or_default(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        let default = Self::trailing_year_from_now();
        Self {
            from: from.unwrap_or(default.from),
            to: to.unwrap_or(default.to),
        }
    }

    /// Lower bound as `YYYYMMDD`.
    #[must_use]
    pub fn from_compact(&self) -> String {
        self.from.format(COMPACT_DATE_FORMAT).to_string()
    }

    /// Upper bound as `YYYYMMDD`.
    #[must_use]
    pub fn to_compact(&self) -> String {
        self.to.format(COMPACT_DATE_FORMAT).to_string()
    }
}

/// Parses a `YYYYMMDD` date.
#[must_use]
pub fn parse_compact_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), COMPACT_DATE_FORMAT).ok()
}

// ============================================================================
// CollectionRequest
// ============================================================================

/// One Export/Collection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRequest {
    /// Human-readable request id, also the collection name.
    pub id: &'static str,
    /// Gateway record type.
    pub record_type: &'static str,
    /// Fields to fetch.
    pub fields: &'static [&'static str],
    /// Company override (`SVCURRENTCOMPANY`).
    pub company: Option<String>,
    /// Date window override (`SVFROMDATE`/`SVTODATE`).
    pub range: Option<DateRange>,
}

impl CollectionRequest {
    /// All companies loaded in the gateway.
    #[must_use]
    pub fn companies() -> Self {
        Self {
            id: "List of Companies",
            record_type: "Company",
            fields: COMPANY_FIELDS,
            company: None,
            range: None,
        }
    }

    /// All ledgers of `company`.
    #[must_use]
    pub fn ledgers(company: &str) -> Self {
        Self {
            id: "List of Ledgers",
            record_type: "Ledger",
            fields: LEDGER_FIELDS,
            company: Some(company.to_string()),
            range: None,
        }
    }

    /// Vouchers of `company` within `range`.
    #[must_use]
    pub fn vouchers(company: &str, range: DateRange) -> Self {
        Self {
            id: "List of Vouchers",
            record_type: "Voucher",
            fields: VOUCHER_FIELDS,
            company: Some(company.to_string()),
            range: Some(range),
        }
    }

    /// All stock items of `company`.
    #[must_use]
    pub fn stock_items(company: &str) -> Self {
        Self {
            id: "List of Stock Items",
            record_type: "StockItem",
            fields: STOCK_ITEM_FIELDS,
            company: Some(company.to_string()),
            range: None,
        }
    }

    /// Renders the XML envelope.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut statics = String::from("<SVEXPORTFORMAT>$$SysName:XML</SVEXPORTFORMAT>");
        if let Some(company) = &self.company {
            let _ = write!(
                statics,
                "<SVCURRENTCOMPANY>{}</SVCURRENTCOMPANY>",
                escape_xml(company)
            );
        }
        if let Some(range) = &self.range {
            let _ = write!(
                statics,
                "<SVFROMDATE>{}</SVFROMDATE><SVTODATE>{}</SVTODATE>",
                range.from_compact(),
                range.to_compact()
            );
        }

        format!(
            "<ENVELOPE>\
             <HEADER>\
             <VERSION>1</VERSION>\
             <TALLYREQUEST>Export</TALLYREQUEST>\
             <TYPE>Collection</TYPE>\
             <ID>{id}</ID>\
             </HEADER>\
             <BODY><DESC>\
             <STATICVARIABLES>{statics}</STATICVARIABLES>\
             <TDL><TDLMESSAGE>\
             <COLLECTION NAME=\"{id}\">\
             <TYPE>{record_type}</TYPE>\
             <FETCH>{fetch}</FETCH>\
             </COLLECTION>\
             </TDLMESSAGE></TDL>\
             </DESC></BODY>\
             </ENVELOPE>",
            id = self.id,
            record_type = self.record_type,
            fetch = self.fields.join(", "),
        )
    }
}

/// Escapes the five XML special characters.
#[must_use]
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

// ============================================================================
// Tests
// ============================================================================
