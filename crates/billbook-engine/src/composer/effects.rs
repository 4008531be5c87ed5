//! Pure derivations shared by create, update and delete: line pricing and
//! the stock changes a document stands for.
//!
//! Delete and edit recompute the stock plan from the stored rows and undo
//! it change by change, so the plan must depend only on data that is
//! still there afterwards: the header, its lines and the source document.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use uuid::Uuid;

use billbook_core::tax::{aggregate, compute_line, DocumentDiscount, DocumentTotals, LineInput};
use billbook_core::validation::validate_rate_cents;
use billbook_core::{
    Document, DocumentLine, DocumentStatus, DocumentType, Item, Money, PartyKind, StockEffect,
};
use billbook_db::StockChange;

use super::payload::LinePayload;
use crate::error::{EngineError, EngineResult};

/// The document a new one is raised from, with its lines.
#[derive(Debug, Clone)]
pub(crate) struct SourceContext {
    pub document: Document,
    pub lines: Vec<DocumentLine>,
}

/// Lines priced for storage plus the rounded-once header totals.
#[derive(Debug, Clone)]
pub(crate) struct PricedLines {
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
}

/// Prices every line of a document.
///
/// A line without a rate takes the item's sale rate for customers and its
/// purchase rate for vendors, back-calculated when the master price
/// includes tax.
pub(crate) fn price_lines(
    document_id: &str,
    payloads: &[LinePayload],
    items: &HashMap<String, Item>,
    party_kind: PartyKind,
    is_interstate: bool,
    discount: DocumentDiscount,
) -> EngineResult<PricedLines> {
    let now = Utc::now();
    let mut lines = Vec::with_capacity(payloads.len());
    let mut taxes = Vec::with_capacity(payloads.len());

    for (index, payload) in payloads.iter().enumerate() {
        let item = items
            .get(&payload.item_id)
            .ok_or_else(|| EngineError::not_found("Item", &payload.item_id))?;
        let rate = match payload.rate_cents {
            Some(cents) => Money::from_cents(cents),
            None => match party_kind {
                PartyKind::Customer => item.default_sale_rate(),
                PartyKind::Vendor => item.default_purchase_rate(),
            },
        };
        validate_rate_cents(rate.cents())?;

        let tax = compute_line(&LineInput {
            quantity: payload.quantity,
            rate,
            discount_bps: payload.discount_bps,
            tax_rate: item.tax_rate(),
            is_interstate,
        })?;
        let amounts = tax.rounded()?;

        lines.push(DocumentLine {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            line_number: index as i64 + 1,
            item_id: item.id.clone(),
            description: payload.description.clone().unwrap_or_else(|| item.name.clone()),
            quantity: payload.quantity,
            rate_cents: rate.cents(),
            discount_bps: i64::from(payload.discount_bps),
            tax_rate_bps: i64::from(item.tax_rate().bps()),
            cgst_rate_bps: i64::from(tax.cgst_rate_bps),
            sgst_rate_bps: i64::from(tax.sgst_rate_bps),
            igst_rate_bps: i64::from(tax.igst_rate_bps),
            taxable_cents: amounts.taxable.cents(),
            cgst_cents: amounts.cgst.cents(),
            sgst_cents: amounts.sgst.cents(),
            igst_cents: amounts.igst.cents(),
            tax_cents: amounts.tax.cents(),
            line_total_cents: amounts.line_total.cents(),
            created_at: now,
        });
        taxes.push(tax);
    }

    Ok(PricedLines {
        lines,
        totals: aggregate(&taxes, discount)?,
    })
}

/// Stock changes a document has applied, in application order.
///
/// - sales orders hold a reservation only while still pending
/// - an invoice raised from a sales order ships against that order's
///   reservation and releases whatever it did not ship
/// - a bill raised from a GRN moves nothing; the GRN already received it
pub(crate) fn stock_plan(
    document: &Document,
    lines: &[DocumentLine],
    tracked: &HashSet<String>,
    source: Option<&SourceContext>,
) -> Vec<StockChange> {
    let policy = document.policy();
    let source_type = source.map(|s| s.document.document_type);
    let tracked_lines = lines.iter().filter(|l| tracked.contains(&l.item_id));

    let changes: Vec<StockChange> = match policy.stock {
        StockEffect::None => Vec::new(),
        StockEffect::Reserve => {
            if document.status != DocumentStatus::Pending {
                return Vec::new();
            }
            tracked_lines
                .map(|l| StockChange::reserve(&l.item_id, &document.branch_id, l.quantity))
                .collect()
        }
        StockEffect::Inbound => {
            if document.document_type == DocumentType::Bill
                && source_type == Some(DocumentType::Grn)
            {
                return Vec::new();
            }
            tracked_lines
                .map(|l| {
                    StockChange::inbound(&l.item_id, &document.branch_id, l.quantity)
                        .with_rate(l.rate_cents)
                })
                .collect()
        }
        StockEffect::Outbound => match source {
            Some(order) if order.document.document_type == DocumentType::SalesOrder => {
                fulfilment(document, lines, tracked, order)
            }
            _ => tracked_lines
                .map(|l| {
                    StockChange::outbound(&l.item_id, &document.branch_id, l.quantity)
                        .with_rate(l.rate_cents)
                })
                .collect(),
        },
    };

    changes
        .into_iter()
        .map(|c| c.with_reference(document.document_type.as_str(), &document.id))
        .collect()
}

fn fulfilment(
    document: &Document,
    lines: &[DocumentLine],
    tracked: &HashSet<String>,
    order: &SourceContext,
) -> Vec<StockChange> {
    let mut reserved: BTreeMap<&str, i64> = BTreeMap::new();
    for line in order.lines.iter().filter(|l| tracked.contains(&l.item_id)) {
        *reserved.entry(line.item_id.as_str()).or_default() += line.quantity;
    }

    let mut changes = Vec::new();
    for line in lines.iter().filter(|l| tracked.contains(&l.item_id)) {
        let remaining = reserved.entry(line.item_id.as_str()).or_default();
        let from_reservation = line.quantity.min(*remaining);
        *remaining -= from_reservation;
        changes.push(
            StockChange::fulfil(&line.item_id, &document.branch_id, line.quantity, from_reservation)
                .with_rate(line.rate_cents),
        );
    }

    for (item_id, remaining) in reserved {
        if remaining > 0 {
            changes.push(StockChange::release(item_id, &document.branch_id, remaining));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use billbook_core::{MovementType, PaymentStatus};
    use chrono::NaiveDate;

    fn item(id: &str, tax_rate_bps: i64, sale_rate_cents: i64, includes_tax: bool) -> Item {
        let now = Utc::now();
        Item {
            id: id.into(),
            company_id: "co-1".into(),
            code: id.to_uppercase(),
            name: format!("Item {id}"),
            tax_code: None,
            tax_rate_bps,
            sale_rate_cents,
            purchase_rate_cents: 8_000,
            rate_includes_tax: includes_tax,
            tracks_inventory: true,
            current_stock: 0,
            reserved_stock: 0,
            available_stock: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn header(document_type: DocumentType, status: DocumentStatus) -> Document {
        let now = Utc::now();
        Document {
            id: format!("{document_type}-1"),
            company_id: "co-1".into(),
            branch_id: "br-1".into(),
            document_type,
            document_number: "HQ-X-0001/24".into(),
            sequence_number: 1,
            fiscal_year: "2024-2025".into(),
            document_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            party_id: "cust-1".into(),
            source_id: None,
            status,
            payment_status: PaymentStatus::NotApplicable,
            is_interstate: false,
            subtotal_cents: 0,
            cgst_cents: 0,
            sgst_cents: 0,
            igst_cents: 0,
            tax_cents: 0,
            discount_bps: 0,
            discount_cents: 0,
            total_cents: 0,
            paid_cents: 0,
            balance_cents: 0,
            applied_cents: 0,
            advance_cents: 0,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn stored_line(document_id: &str, item_id: &str, quantity: i64) -> DocumentLine {
        DocumentLine {
            id: format!("{document_id}-{item_id}"),
            document_id: document_id.into(),
            line_number: 1,
            item_id: item_id.into(),
            description: String::new(),
            quantity,
            rate_cents: 10_000,
            discount_bps: 0,
            tax_rate_bps: 0,
            cgst_rate_bps: 0,
            sgst_rate_bps: 0,
            igst_rate_bps: 0,
            taxable_cents: 10_000 * quantity,
            cgst_cents: 0,
            sgst_cents: 0,
            igst_cents: 0,
            tax_cents: 0,
            line_total_cents: 10_000 * quantity,
            created_at: Utc::now(),
        }
    }

    fn tracked(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_worked_example_prices_to_1062() {
        let items = HashMap::from([("item-1".to_string(), item("item-1", 1_800, 10_000, false))]);
        let priced = price_lines(
            "doc-1",
            &[LinePayload {
                item_id: "item-1".into(),
                quantity: 10,
                rate_cents: None,
                discount_bps: 1_000,
                description: None,
            }],
            &items,
            PartyKind::Customer,
            false,
            DocumentDiscount::None,
        )
        .unwrap();

        let line = &priced.lines[0];
        assert_eq!(line.taxable_cents, 90_000);
        assert_eq!((line.cgst_cents, line.sgst_cents, line.igst_cents), (8_100, 8_100, 0));
        assert_eq!(line.line_total_cents, 106_200);
        assert_eq!((line.cgst_rate_bps, line.sgst_rate_bps), (900, 900));
        assert_eq!(priced.totals.total.cents(), 106_200);
    }

    #[test]
    fn test_rounding_happens_once_at_the_header() {
        // 1 x 0.35 at 5% three times: 1.75c tax per line
        let items = HashMap::from([("item-1".to_string(), item("item-1", 500, 35, false))]);
        let payload = LinePayload {
            item_id: "item-1".into(),
            quantity: 1,
            ..Default::default()
        };
        let priced = price_lines(
            "doc-1",
            &[payload.clone(), payload.clone(), payload],
            &items,
            PartyKind::Customer,
            true,
            DocumentDiscount::None,
        )
        .unwrap();

        let per_line: i64 = priced.lines.iter().map(|l| l.igst_cents).sum();
        assert_eq!(per_line, 6);
        assert_eq!(priced.totals.igst.cents(), 5);
        assert_eq!(priced.totals.total.cents(), 105 + 5);
    }

    #[test]
    fn test_inclusive_master_price_and_purchase_default() {
        let items = HashMap::from([("item-1".to_string(), item("item-1", 1_800, 11_800, true))]);
        let payload = LinePayload {
            item_id: "item-1".into(),
            quantity: 1,
            ..Default::default()
        };

        let none = DocumentDiscount::None;
        let sale = price_lines("d", &[payload.clone()], &items, PartyKind::Customer, false, none)
            .unwrap();
        assert_eq!(sale.lines[0].rate_cents, 10_000);

        let purchase =
            price_lines("d", &[payload], &items, PartyKind::Vendor, false, none).unwrap();
        assert_eq!(purchase.lines[0].rate_cents, 6_780);

        let missing = price_lines(
            "d",
            &[LinePayload {
                item_id: "ghost".into(),
                quantity: 1,
                ..Default::default()
            }],
            &items,
            PartyKind::Customer,
            false,
            DocumentDiscount::None,
        )
        .unwrap_err();
        assert_eq!(missing.code(), "NOT_FOUND");
    }

    #[test]
    fn test_untracked_items_move_no_stock() {
        let invoice = header(DocumentType::Invoice, DocumentStatus::Draft);
        let lines = vec![
            stored_line(&invoice.id, "item-1", 2),
            stored_line(&invoice.id, "svc-1", 1),
        ];

        let plan = stock_plan(&invoice, &lines, &tracked(&["item-1"]), None);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].current_delta, -2);
        assert_eq!(plan[0].min_available, Some(2));
        assert_eq!(plan[0].reference_id.as_deref(), Some("invoice-1"));
    }

    #[test]
    fn test_sales_order_reserves_only_while_pending() {
        let mut order = header(DocumentType::SalesOrder, DocumentStatus::Pending);
        let lines = vec![stored_line(&order.id, "item-1", 4)];

        let plan = stock_plan(&order, &lines, &tracked(&["item-1"]), None);
        assert_eq!((plan[0].current_delta, plan[0].reserved_delta), (0, 4));

        order.status = DocumentStatus::Cancelled;
        assert!(stock_plan(&order, &lines, &tracked(&["item-1"]), None).is_empty());
    }

    #[test]
    fn test_invoice_from_order_fulfils_and_releases() {
        let order = header(DocumentType::SalesOrder, DocumentStatus::Invoiced);
        let order_lines = vec![
            stored_line(&order.id, "item-1", 5),
            stored_line(&order.id, "item-2", 3),
        ];
        let source = SourceContext {
            document: order,
            lines: order_lines,
        };

        let invoice = header(DocumentType::Invoice, DocumentStatus::Draft);
        let lines = vec![stored_line(&invoice.id, "item-1", 7)];
        let plan = stock_plan(&invoice, &lines, &tracked(&["item-1", "item-2"]), Some(&source));

        assert_eq!(plan.len(), 2);
        assert_eq!((plan[0].current_delta, plan[0].reserved_delta), (-7, -5));
        assert_eq!(plan[0].min_available, Some(2));
        assert_eq!(plan[0].movement_type, MovementType::Out);
        assert_eq!((plan[1].item_id.as_str(), plan[1].reserved_delta), ("item-2", -3));
    }

    #[test]
    fn test_bill_from_grn_moves_nothing() {
        let grn = header(DocumentType::Grn, DocumentStatus::Verified);
        let source = SourceContext {
            document: grn,
            lines: Vec::new(),
        };
        let bill = header(DocumentType::Bill, DocumentStatus::Draft);
        let lines = vec![stored_line(&bill.id, "item-1", 3)];

        assert!(stock_plan(&bill, &lines, &tracked(&["item-1"]), Some(&source)).is_empty());
        let direct = stock_plan(&bill, &lines, &tracked(&["item-1"]), None);
        assert_eq!(direct[0].current_delta, 3);
        assert_eq!(direct[0].rate_cents, Some(10_000));
    }
}
