//! # Seed Data Generator
//!
//! Populates a local database with a minimal but workable data set for
//! development: the default company, one state/municipality pair, a
//! customer, payment methods and terms, and an open quotation ready to
//! be converted by hand.
//!
//! ## Usage
//! ```bash
//! cargo run -p cotar-db --bin seed
//!
//! # Specify database path
//! cargo run -p cotar-db --bin seed -- --db ./data/cotar.db
//! ```

use chrono::Utc;
use cotar_core::{
    Customer, Money, Municipality, PaymentMethod, PaymentTerm, Quotation, QuotationItem,
    QuotationStatus, State, TaxRegime,
};
use cotar_db::{Database, DbConfig};
use std::env;
use uuid::Uuid;

/// Seed quotation line items: (product code, description, qty, unit price).
const DEMO_ITEMS: &[(&str, &str, i64, Money)] = &[
    ("PRD-0001", "Parafuso sextavado M8", 200, Money::from_cents(45)),
    ("PRD-0002", "Chapa de aço 2mm", 10, Money::from_cents(12_900)),
    ("PRD-0003", "Tinta epóxi 3.6L", 4, Money::from_cents(18_750)),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./cotar_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Cotar Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./cotar_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Cotar Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if db.companies().default_exists().await? {
        println!("⚠ Database already seeded.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();

    db.companies()
        .ensure_default("Cotar Demonstração Ltda", Some("12345678000195"))
        .await?;
    println!("✓ Default company");

    db.geo()
        .insert_state(&State {
            code: "SP".to_string(),
            name: "São Paulo".to_string(),
            registry_id: Some(35),
            is_active: true,
            updated_at: now,
        })
        .await?;
    db.geo()
        .insert_municipality(&Municipality {
            code: "3550308".to_string(),
            name: "São Paulo".to_string(),
            state_code: "SP".to_string(),
            region: Some("Sudeste".to_string()),
            is_capital: true,
            area_code: Some("11".to_string()),
            updated_at: now,
        })
        .await?;
    println!("✓ Geography (SP / São Paulo)");

    db.customers()
        .insert(&Customer {
            code: "CLI-0001".to_string(),
            legal_name: "Metalúrgica Exemplo Ltda".to_string(),
            trade_name: Some("Exemplo Metais".to_string()),
            tax_id: Some("98765432000110".to_string()),
            state_registration: Some("110042490114".to_string()),
            street: Some("Rua das Indústrias".to_string()),
            number: Some("1200".to_string()),
            complement: None,
            district: Some("Distrito Industrial".to_string()),
            postal_code: Some("01310100".to_string()),
            municipality_name: Some("São Paulo".to_string()),
            state_code: Some("SP".to_string()),
            municipality_code: Some("3550308".to_string()),
            is_taxpayer: true,
            tax_regime: TaxRegime::Contributor,
            updated_at: now,
        })
        .await?;
    println!("✓ Customer CLI-0001");

    db.payments()
        .insert_method(&PaymentMethod {
            code: "BOL".to_string(),
            description: "Boleto bancário".to_string(),
            is_active: true,
            updated_at: now,
        })
        .await?;
    db.payments()
        .insert_term(&PaymentTerm {
            code: "30-60-90".to_string(),
            description: "3x 30/60/90 dias".to_string(),
            installment_count: 3,
            day_offsets: vec![30, 60, 90],
            is_active: true,
            updated_at: now,
        })
        .await?;
    println!("✓ Payment method and term");

    let total: Money = DEMO_ITEMS
        .iter()
        .fold(Money::zero(), |acc, (_, _, qty, unit)| {
            acc + *unit * *qty
        });

    db.quotations()
        .insert(&Quotation {
            code: "ORC-0001".to_string(),
            customer_code: "CLI-0001".to_string(),
            payment_term_code: "30-60-90".to_string(),
            status: QuotationStatus::Active,
            total_cents: total.cents(),
            order_code: None,
            created_at: now,
            converted_at: None,
        })
        .await?;
    for (product_code, description, qty, unit) in DEMO_ITEMS {
        db.quotations()
            .add_item(&QuotationItem {
                id: Uuid::new_v4().to_string(),
                quotation_code: "ORC-0001".to_string(),
                product_code: product_code.to_string(),
                description: description.to_string(),
                quantity: *qty,
                unit_price_cents: unit.cents(),
                total_cents: (*unit * *qty).cents(),
            })
            .await?;
    }
    println!("✓ Quotation ORC-0001 ({} items, total {})", DEMO_ITEMS.len(), total);

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
