//! Gateway response parsing.
//!
//! Responses are read as a DOM. All elements with the record tag are
//! selected in document order, and each field is read from a named child
//! element. Missing text becomes `""` and unparseable numbers become `0.0`.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use roxmltree::{Document, Node};

use crate::error::Result;
use crate::records::{Company, Ledger, StockItem, Voucher};

// ============================================================================
// Patterns
// ============================================================================

/// Leading numeric prefix, as accepted by a lenient float parser.
static NUMERIC_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?")
        .expect("numeric prefix pattern is valid")
});

/// Character references that are not legal XML 1.0 characters.
///
/// The gateway emits `&#4;` and friends inside names.
static ILLEGAL_CHAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(?:0*(?:[0-8]|1[124-9]|2\d|3[01])|[xX]0*(?:[0-8bBcCeEfF]|1[0-9a-fA-F]));")
        .expect("character reference pattern is valid")
});

// ============================================================================
// Record Parsers
// ============================================================================

/// Parses `COMPANY` elements.
pub fn parse_companies(xml: &str) -> Result<Vec<Company>> {
    parse_records(xml, "COMPANY", |node| Company {
        name: node.text("NAME"),
        guid: node.text("GUID"),
        fiscal_start: node.text("STARTINGFROM"),
        fiscal_end: node.text("ENDINGAT"),
    })
}

/// Parses `LEDGER` elements, deriving classification flags.
pub fn parse_ledgers(xml: &str) -> Result<Vec<Ledger>> {
    parse_records(xml, "LEDGER", |node| {
        Ledger::new(
            node.text("NAME"),
            node.text("PARENT"),
            node.number("OPENINGBALANCE"),
            node.number("CLOSINGBALANCE"),
        )
    })
}

/// Parses `VOUCHER` elements.
pub fn parse_vouchers(xml: &str) -> Result<Vec<Voucher>> {
    parse_records(xml, "VOUCHER", |node| Voucher {
        date: node.text("DATE"),
        number: node.text("VOUCHERNUMBER"),
        voucher_type: node.text("VOUCHERTYPENAME"),
        party_name: node.text("PARTYLEDGERNAME"),
        amount: node.number("AMOUNT"),
        narration: node.text("NARRATION"),
    })
}

/// Parses `STOCKITEM` elements.
pub fn parse_stock_items(xml: &str) -> Result<Vec<StockItem>> {
    parse_records(xml, "STOCKITEM", |node| StockItem {
        name: node.text("NAME"),
        parent: node.text("PARENT"),
        opening_qty: node.number("OPENINGBALANCE"),
        closing_qty: node.number("CLOSINGBALANCE"),
        opening_value: node.number("OPENINGVALUE"),
        closing_value: node.number("CLOSINGVALUE"),
    })
}

// ============================================================================
// Helpers
// ============================================================================

/// Parses the leading numeric prefix of `text`, or `0.0`.
///
/// `"1200.50 Dr"` reads as `1200.5`, `"10 Nos"` as `10.0`.
#[must_use]
pub fn parse_number(text: &str) -> f64 {
    NUMERIC_PREFIX
        .find(text)
        .and_then(|m| m.as_str().trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Removes characters the XML parser would reject.
#[must_use]
pub fn sanitize(xml: &str) -> Cow<'_, str> {
    let without_refs = ILLEGAL_CHAR_REF.replace_all(xml, "");
    if without_refs
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
    {
        let cleaned: String = without_refs
            .chars()
            .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
            .collect();
        return Cow::Owned(cleaned);
    }
    without_refs
}

fn parse_records<T>(xml: &str, tag: &str, map: impl Fn(RecordNode<'_, '_>) -> T) -> Result<Vec<T>> {
    let clean = sanitize(xml);
    let document = Document::parse(&clean)?;

    Ok(document
        .descendants()
        .filter(|node| node.has_tag_name(tag))
        .map(|node| map(RecordNode(node)))
        .collect())
}

/// A record element with field accessors.
#[derive(Clone, Copy)]
struct RecordNode<'a, 'input>(Node<'a, 'input>);

impl RecordNode<'_, '_> {
    /// Text of the first `field` element, preferring direct children.
    ///
    /// Falls back to a same-named attribute (`<COMPANY NAME="Acme">`).
    fn text(&self, field: &str) -> String {
        let element = self
            .0
            .children()
            .find(|child| child.has_tag_name(field))
            .or_else(|| {
                self.0
                    .descendants()
                    .skip(1)
                    .find(|child| child.has_tag_name(field))
            });

        match element {
            Some(element) => element.text().unwrap_or_default().trim().to_string(),
            None => self.0.attribute(field).unwrap_or_default().trim().to_string(),
        }
    }

    fn number(&self, field: &str) -> f64 {
        parse_number(&self.text(field))
    }
}

// ============================================================================
// Tests
// ============================================================================
