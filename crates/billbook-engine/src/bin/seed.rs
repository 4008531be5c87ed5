//! # Demo Data Seeder
//!
//! Provisions a company with one branch, a few parties and items, then runs
//! a full sales and purchase cycle through the engine.
//!
//! ## Usage
//! ```bash
//! # Use the configured database (billbook.toml / BILLBOOK_DB_PATH)
//! cargo run -p billbook-engine --bin seed
//!
//! # Explicit database and config file
//! cargo run -p billbook-engine --bin seed -- --db ./data/demo.db --config ./billbook.toml
//! ```
//!
//! ## Generated Documents
//! - quotation → sales order → invoice, then a part payment and a credit note
//! - purchase order → GRN → bill
//!
//! Re-running against a seeded database stops after the master data check.

use std::env;
use std::path::PathBuf;

use chrono::Utc;
use tracing_subscriber::EnvFilter;

use billbook_core::{Branch, Company, DocumentType, Item, Party, PartyKind};
use billbook_engine::{AllocationPayload, DocumentPayload, Engine, EngineConfig, LinePayload};

const COMPANY_ID: &str = "demo-co";
const BRANCH_ID: &str = "demo-hq";

/// (id, name, tax bps, sale cents, purchase cents, opening stock)
const ITEMS: &[(&str, &str, i64, i64, i64, Option<i64>)] = &[
    ("steel-rod", "Steel Rod 12mm", 1_800, 45_000, 38_000, Some(120)),
    ("cement-bag", "Cement 50kg", 2_800, 39_000, 33_500, Some(400)),
    ("paint-20l", "Exterior Paint 20L", 1_800, 620_000, 540_000, Some(25)),
    ("site-visit", "Site Survey", 1_800, 150_000, 0, None),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,billbook=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Billbook Demo Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (overrides config)");
                println!("  -c, --config <PATH>   Config file (default: platform config dir)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = EngineConfig::load(config_path)?;
    if db_path.is_some() {
        config.database.path = db_path;
    }

    println!("Billbook Demo Seeder");
    println!("====================");
    if let Some(path) = &config.database.path {
        println!("Database: {}", path.display());
    }
    println!();

    let engine = Engine::open(&config).await?;
    println!("✓ Connected, migrations applied");

    if engine.database().companies().get_by_id(COMPANY_ID).await?.is_some() {
        println!("⚠ {COMPANY_ID} already exists; delete the database file to regenerate.");
        return Ok(());
    }

    provision(&engine).await?;
    println!("✓ Company, branch, 2 parties, {} items", ITEMS.len());
    println!();

    sales_cycle(&engine).await?;
    purchase_cycle(&engine).await?;

    for party_id in ["acme-builders", "northwind-supply"] {
        let replay = engine.replay_balance(party_id).await?;
        println!(
            "{party_id:<18} balance {:>12}  entries {:>2}  consistent {}",
            replay.latest.to_string(),
            replay.entries,
            replay.is_consistent()
        );
    }

    println!();
    println!("✓ Seed complete");
    Ok(())
}

async fn provision(engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
    let db = engine.database();
    let now = Utc::now();

    db.companies()
        .insert(&Company {
            id: COMPANY_ID.into(),
            name: "Demo Hardware Pvt Ltd".into(),
            tax_id: Some("27AABCD1234E1Z5".into()),
            created_at: now,
        })
        .await?;
    db.branches()
        .insert(&Branch {
            id: BRANCH_ID.into(),
            company_id: COMPANY_ID.into(),
            name: "Head Office".into(),
            document_prefix: "HQ".into(),
            created_at: now,
        })
        .await?;

    let parties = [
        ("acme-builders", "Acme Builders", PartyKind::Customer, "27AACCA9876K1Z2"),
        ("northwind-supply", "Northwind Supply", PartyKind::Vendor, "29AADCN4321L1Z8"),
    ];
    for (id, name, kind, tax_id) in parties {
        db.parties()
            .insert(&Party {
                id: id.into(),
                company_id: COMPANY_ID.into(),
                kind,
                name: name.into(),
                tax_id: Some(tax_id.into()),
                billing_address: None,
                shipping_address: None,
                balance_cents: 0,
                advance_cents: 0,
                created_at: now,
                updated_at: now,
            })
            .await?;
    }

    for &(id, name, tax_rate_bps, sale, purchase, stock) in ITEMS {
        let current = stock.unwrap_or_default();
        db.items()
            .insert(&Item {
                id: id.into(),
                company_id: COMPANY_ID.into(),
                code: id.to_uppercase(),
                name: name.into(),
                tax_code: None,
                tax_rate_bps,
                sale_rate_cents: sale,
                purchase_rate_cents: purchase,
                rate_includes_tax: false,
                tracks_inventory: stock.is_some(),
                current_stock: current,
                reserved_stock: 0,
                available_stock: current,
                created_at: now,
                updated_at: now,
            })
            .await?;
    }
    Ok(())
}

fn document(party_id: &str, source_id: Option<&str>, lines: &[(&str, i64)]) -> DocumentPayload {
    DocumentPayload {
        company_id: COMPANY_ID.into(),
        branch_id: BRANCH_ID.into(),
        party_id: party_id.into(),
        source_id: source_id.map(Into::into),
        lines: lines
            .iter()
            .map(|&(item_id, quantity)| LinePayload {
                item_id: item_id.into(),
                quantity,
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

async fn sales_cycle(engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
    let customer = "acme-builders";
    let lines = [("steel-rod", 40), ("cement-bag", 100), ("site-visit", 1)];

    let quote = engine
        .create_document(DocumentType::Quotation, &document(customer, None, &lines))
        .await?
        .document;
    let order = engine
        .create_document(DocumentType::SalesOrder, &document(customer, Some(&quote.id), &lines))
        .await?
        .document;
    let invoice = engine
        .create_document(
            DocumentType::Invoice,
            &document(
                customer,
                Some(&order.id),
                &[("steel-rod", 40), ("cement-bag", 80), ("site-visit", 1)],
            ),
        )
        .await?
        .document;

    let part = invoice.total().cents() / 2;
    let payment = engine
        .create_document(
            DocumentType::Payment,
            &DocumentPayload {
                amount_cents: Some(part + 100_000),
                allocations: vec![AllocationPayload {
                    document_id: invoice.id.clone(),
                    amount_cents: part,
                }],
                ..document(customer, None, &[])
            },
        )
        .await?
        .document;
    let credit = engine
        .create_document(
            DocumentType::CreditNote,
            &document(customer, Some(&invoice.id), &[("cement-bag", 5)]),
        )
        .await?
        .document;

    for doc in [&quote, &order, &invoice, &payment, &credit] {
        println!("  {:<16} {:>14}", doc.document_number, doc.total().to_string());
    }
    Ok(())
}

async fn purchase_cycle(engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
    let vendor = "northwind-supply";
    let lines = [("paint-20l", 10), ("steel-rod", 60)];

    let order = engine
        .create_document(DocumentType::PurchaseOrder, &document(vendor, None, &lines))
        .await?
        .document;
    let receipt = engine
        .create_document(DocumentType::Grn, &document(vendor, Some(&order.id), &lines))
        .await?
        .document;
    let bill = engine
        .create_document(DocumentType::Bill, &document(vendor, Some(&receipt.id), &lines))
        .await?
        .document;

    for doc in [&order, &receipt, &bill] {
        println!("  {:<16} {:>14}", doc.document_number, doc.total().to_string());
    }
    Ok(())
}
