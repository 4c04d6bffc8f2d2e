//! # Seed Data Generator
//!
//! Populates the database with categories and products for development.
//!
//! ## Usage
//! ```bash
//! # Generate 200 products (default)
//! cargo run -p kasir-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p kasir-db --bin seed -- --count 1000
//!
//! # Specify database path (otherwise KASIR_DB_PATH or ./kasir.db)
//! cargo run -p kasir-db --bin seed -- --db ./data/kasir.db
//!
//! # Also ring up one sample sale through the checkout engine
//! cargo run -p kasir-db --bin seed -- --sample-sale
//! ```
//!
//! Prices are whole rupiah; every product gets a category.

use std::env;
use std::sync::Arc;

use kasir_core::{CheckoutItem, NewCategory, NewProduct};
use kasir_db::{AppConfig, CheckoutEngine, Database};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Categories with the product names generated under each.
const CATALOG: &[(&str, &str, &[&str])] = &[
    (
        "Minuman",
        "Minuman dingin dan panas",
        &[
            "Kopi Hitam",
            "Kopi Susu",
            "Teh Manis",
            "Teh Tawar",
            "Es Jeruk",
            "Air Mineral",
            "Susu Coklat",
            "Jus Alpukat",
        ],
    ),
    (
        "Makanan",
        "Makanan berat",
        &[
            "Nasi Goreng",
            "Mie Goreng",
            "Mie Rebus",
            "Nasi Uduk",
            "Soto Ayam",
            "Bakso",
            "Gado-Gado",
            "Ayam Geprek",
        ],
    ),
    (
        "Camilan",
        "Makanan ringan",
        &[
            "Keripik Singkong",
            "Kacang Goreng",
            "Pisang Goreng",
            "Tahu Isi",
            "Roti Bakar",
            "Martabak Mini",
        ],
    ),
    (
        "Sembako",
        "Kebutuhan pokok",
        &[
            "Beras 5kg",
            "Gula Pasir 1kg",
            "Minyak Goreng 1L",
            "Telur 10 Butir",
            "Tepung Terigu 1kg",
        ],
    ),
];

/// Size variants and their price addon in rupiah.
const VARIANTS: &[(&str, i64)] = &[("", 0), ("Besar", 3000), ("Jumbo", 6000), ("Paket", 10000)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut config = AppConfig::from_env()?;

    let mut count: usize = 200;
    let mut sample_sale = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database.database_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--sample-sale" => sample_sale = true,
            "--help" | "-h" => {
                println!("Kasir POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: KASIR_DB_PATH or ./kasir.db)");
                println!("      --sample-sale  Run one checkout after seeding");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!(
        path = %config.database.database_path.display(),
        count,
        "Seeding database"
    );

    let db = Database::new(config.database.clone()).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        println!("Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut generated = 0usize;
    let mut seed = 0usize;

    'outer: for (category_name, description, names) in CATALOG {
        let category = db
            .categories()
            .create(NewCategory {
                name: category_name.to_string(),
                description: description.to_string(),
            })
            .await?;

        for name in names.iter() {
            for (variant, price_addon) in VARIANTS {
                if generated >= count {
                    break 'outer;
                }

                let product = generate_product(name, variant, *price_addon, category.id, seed);
                seed += 1;

                if let Err(e) = db.products().create(product).await {
                    warn!(error = %e, name, "Failed to insert product");
                    continue;
                }

                generated += 1;
                if generated % 50 == 0 {
                    info!(generated, "Seeding progress");
                }
            }
        }
    }

    let elapsed = start.elapsed();
    info!(generated, ?elapsed, "Products generated");

    if sample_sale && generated > 0 {
        let engine = CheckoutEngine::new(Arc::new(db.transactions()), config.checkout.clone());
        let items = [CheckoutItem::new(1, 2), CheckoutItem::new(2, 1), CheckoutItem::new(1, 1)];

        match engine.checkout(&items).await {
            Ok(tx) => {
                println!("Sample sale #{} total {}", tx.id, tx.total());
                for detail in &tx.details {
                    println!(
                        "  {} x{} = {}",
                        detail.product_name, detail.quantity, detail.subtotal
                    );
                }
            }
            Err(e) => warn!(error = %e, "Sample sale failed"),
        }
    }

    db.close().await;
    println!("Seed complete: {} products in {:?}", generated, elapsed);

    Ok(())
}

/// Installs the fmt subscriber; `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kasir=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Builds one product with deterministic price and stock.
fn generate_product(name: &str, variant: &str, price_addon: i64, category_id: i64, seed: usize) -> NewProduct {
    let full_name = if variant.is_empty() {
        name.to_string()
    } else {
        format!("{} {}", name, variant)
    };

    // Rp 2.000 - Rp 24.500 in steps of 500, plus the variant addon
    let base_price = 2000 + ((seed * 7) % 46) as i64 * 500;

    NewProduct {
        name: full_name,
        price: base_price + price_addon,
        stock: (seed % 101) as i64,
        category_id: Some(category_id),
    }
}
