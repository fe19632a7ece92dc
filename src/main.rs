//! Laundry utility calculator CLI
//!
//! Browse a machine catalog, build carts and estimate daily utility usage
//! and cost.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use laundry_calc::calculator::{self, View};
use laundry_calc::models::{MachineFamily, UtilityKind};
use laundry_calc::rates::{CategoryRates, RateKey, resolve_rate_key};
use laundry_calc::{db, export, import};

#[derive(Parser)]
#[command(name = "laundry-calc")]
#[command(about = "Utility consumption and cost calculator for industrial laundry equipment")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, env = "LAUNDRY_CALC_DB", default_value = "laundry.db")]
    database: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "LAUNDRY_CALC_LOG", default_value = "warn")]
    log_level: String,

    /// Currency symbol for cost figures
    #[arg(long, default_value = "₱")]
    currency: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Import machine catalog JSON files from a directory
    Import {
        /// Directory containing catalog exports (e.g. mep_washer.json)
        catalog_dir: PathBuf,

        /// Clear the existing catalog before importing
        #[arg(long)]
        clear: bool,
    },

    /// Load sample machines for testing (without a catalog export)
    LoadSample,

    /// List catalog machines
    ListMachines {
        /// Only list one family: washer, dryer, ironer or other
        #[arg(short, long)]
        family: Option<MachineFamily>,
    },

    /// List catalog categories with their rate keys
    Categories,

    /// Show details for a catalog machine
    Machine {
        /// Machine ID
        id: String,
    },

    /// Create an empty cart
    CartNew,

    /// List saved carts, newest first
    Carts,

    /// Delete a cart
    CartDelete { cart: i64 },

    /// Write a cart (hours, lines and rates) as a JSON document
    CartExport {
        cart: i64,
        /// Output file (stdout when omitted)
        output: Option<PathBuf>,
    },

    /// Create a new cart from a JSON document
    CartImport { input: PathBuf },

    /// Add one unit of a machine to a cart
    CartAdd { cart: i64, machine: String },

    /// Remove one unit of a machine (quantity stays at least 1)
    CartRemove { cart: i64, machine: String },

    /// Remove a machine line from a cart
    CartRemoveAll { cart: i64, machine: String },

    /// Set the quantity of a machine line
    CartQty {
        cart: i64,
        machine: String,
        quantity: u32,
    },

    /// Remove every machine from a cart
    CartClear { cart: i64 },

    /// Set the daily operating hours of a cart
    Hours { cart: i64, hours: f64 },

    /// Set a utility rate for a machine category
    Rate {
        cart: i64,
        /// Raw category label as stored on the machines (e.g. mep_washer)
        category: String,
        /// electricity, waterCold, waterHot or gas
        utility: UtilityKind,
        value: f64,
    },

    /// Show the rate worksheet of a cart
    Rates { cart: i64 },

    /// Write the rate table of a cart as JSON
    RatesExport {
        cart: i64,
        /// Output file (stdout when omitted)
        output: Option<PathBuf>,
    },

    /// Replace the rate table of a cart from a JSON file
    RatesImport { cart: i64, input: PathBuf },

    /// Estimate usage and cost for a cart
    Calc {
        cart: i64,

        /// Which figures to tabulate: currency or usage
        #[arg(long, default_value = "currency")]
        view: View,

        /// Show the per-category rate worksheet as well
        #[arg(short, long)]
        verbose: bool,

        /// Print totals as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Compute a single load (one operating hour) instead of a day
        #[arg(long)]
        per_load: bool,

        /// Store the computed daily totals with the cart
        #[arg(long, conflicts_with = "per_load")]
        save: bool,
    },

    /// Export the consumption sheet of a cart as CSV
    Export { cart: i64, output: PathBuf },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::Import { catalog_dir, clear } => {
            if clear {
                println!("Clearing existing catalog...");
                db::clear_catalog(&conn)?;
            }

            let stats = import::import_to_database(&conn, &catalog_dir)?;
            println!("{}", stats);
        }

        Commands::LoadSample => {
            let count = import::load_sample(&conn)?;
            println!("Loaded {} sample machines", count);
        }

        Commands::ListMachines { family } => {
            let machines = db::list_machines(&conn, family)?;
            if machines.is_empty() {
                println!("No machines in catalog. Run 'import' or 'load-sample' first.");
            } else {
                println!(
                    "{:<12} {:<30} {:<14} {:>8} {:>10} {:>8} {:>8}",
                    "ID", "Model", "Category", "Load kW", "Gas BTU/h", "Cold L", "Hot L"
                );
                println!("{}", "-".repeat(96));
                for m in machines {
                    println!(
                        "{:<12} {:<30} {:<14} {:>8.2} {:>10.0} {:>8.0} {:>8.0}",
                        m.id, m.model, m.category, m.total_load_kw, m.gas_btu, m.cold_water_l, m.hot_water_l
                    );
                }
            }
        }

        Commands::Categories => {
            let categories = db::list_categories(&conn)?;
            if categories.is_empty() {
                println!("No machines in catalog. Run 'import' or 'load-sample' first.");
            }
            for (category, count) in categories {
                let key = resolve_rate_key(&category);
                println!(
                    "{:<24} {:>4} machines  {:<8} rate key: {}",
                    category, count, key.family, key
                );
            }
        }

        Commands::Machine { id } => match db::get_machine(&conn, &id)? {
            Some(m) => {
                println!("Machine: {}", m.display_name());
                println!("  ID: {}", m.id);
                println!("  Category: {} ({})", m.category, m.family);
                if let Some(capacity) = &m.capacity {
                    println!("  Capacity: {}", capacity);
                }
                println!("  Average load: {} kW", m.total_load_kw);
                if m.gas_btu != 0.0 {
                    println!("  Gas: {} BTU/h", m.gas_btu);
                }
                if m.cold_water_l != 0.0 || m.hot_water_l != 0.0 {
                    println!("  Water per load: {} L cold, {} L hot", m.cold_water_l, m.hot_water_l);
                }
                if m.exhaust_m3h != 0.0 {
                    println!("  Exhaust: {} m³/h", m.exhaust_m3h);
                }
                println!("  Rate key: {}", RateKey::for_machine(&m));
                let utilities: Vec<&str> = m
                    .family
                    .applicable_utilities()
                    .iter()
                    .map(|u| u.as_str())
                    .collect();
                println!("  Priced utilities: {}", utilities.join(", "));
            }
            None => println!("Machine '{}' not found", id),
        },

        Commands::CartNew => {
            let created_at = chrono::Local::now().to_rfc3339();
            let id = db::create_cart(&conn, &created_at)?;
            println!("Created cart {} ({} operating hours)", id, db::DEFAULT_HOURS);
        }

        Commands::Carts => {
            let carts = db::list_carts(&conn)?;
            if carts.is_empty() {
                println!("No carts yet. Run 'cart-new' first.");
            }
            for c in carts {
                let saved = c
                    .saved_total
                    .map(|t| format!(", saved total {}{:.2}", cli.currency, t))
                    .unwrap_or_default();
                println!(
                    "Cart {} | {} | {} h | {} lines, {} machines{}",
                    c.id, c.created_at, c.hours, c.lines, c.machines, saved
                );
            }
        }

        Commands::CartDelete { cart } => {
            db::delete_cart(&conn, cart)?;
            println!("Deleted cart {}", cart);
        }

        Commands::CartExport { cart, output } => {
            let cart = db::load_cart(&conn, cart)?;
            let json = serde_json::to_string_pretty(&import::CartDocument::from(&cart))?;
            match output {
                Some(path) => {
                    fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote cart {} to {}", cart.id, path.display());
                }
                None => println!("{}", json),
            }
        }

        Commands::CartImport { input } => {
            let document = import::read_cart_document(&input)?;
            let created_at = chrono::Local::now().to_rfc3339();
            let id = import::import_cart(&conn, &document, &created_at)?;
            println!(
                "Created cart {} with {} lines ({} operating hours)",
                id,
                document.items.len(),
                document.hours
            );
        }

        Commands::CartAdd { cart, machine } => {
            let quantity = db::add_to_cart(&conn, cart, &machine)?;
            println!("{} x{} in cart {}", machine, quantity, cart);
        }

        Commands::CartRemove { cart, machine } => {
            let quantity = db::remove_one_from_cart(&conn, cart, &machine)?;
            println!("{} x{} in cart {}", machine, quantity, cart);
        }

        Commands::CartRemoveAll { cart, machine } => {
            db::remove_all_from_cart(&conn, cart, &machine)?;
            println!("Removed {} from cart {}", machine, cart);
        }

        Commands::CartQty {
            cart,
            machine,
            quantity,
        } => {
            db::set_quantity(&conn, cart, &machine, quantity)?;
            println!("{} x{} in cart {}", machine, quantity, cart);
        }

        Commands::CartClear { cart } => {
            db::clear_cart(&conn, cart)?;
            println!("Cleared cart {}", cart);
        }

        Commands::Hours { cart, hours } => {
            db::set_hours(&conn, cart, hours)?;
            println!("Cart {} runs {} hours per day", cart, hours);
        }

        Commands::Rate {
            cart,
            category,
            utility,
            value,
        } => {
            let key = resolve_rate_key(&category);
            let stored = db::set_rate(&conn, cart, &key, utility, value)?;
            if !key.family.applicable_utilities().contains(&utility) {
                println!(
                    "Note: {} machines are not normally priced on {}",
                    key.family, utility
                );
            }
            println!("{} {} = {}{:.2}", key, utility, cli.currency, stored);
        }

        Commands::Rates { cart } => {
            let cart = db::load_cart(&conn, cart)?;
            if cart.items.is_empty() {
                println!("Cart {} is empty.", cart.id);
            } else {
                print!(
                    "{}",
                    calculator::format_rate_sheet(&cart.items, &cart.rates, &cli.currency)
                );
            }
        }

        Commands::RatesExport { cart, output } => {
            let rates = db::load_rates(&conn, cart)?;
            let json = serde_json::to_string_pretty(&rates)?;
            match output {
                Some(path) => {
                    fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {} rate entries to {}", rates.len(), path.display());
                }
                None => println!("{}", json),
            }
        }

        Commands::RatesImport { cart, input } => {
            let content = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let rates: CategoryRates = serde_json::from_str(&content)
                .with_context(|| format!("Invalid rate file {}", input.display()))?;
            db::replace_rates(&conn, cart, &rates)?;
            println!("Loaded {} rate entries into cart {}", rates.len(), cart);
        }

        Commands::Calc {
            cart,
            view,
            verbose,
            json,
            per_load,
            save,
        } => {
            let cart = db::load_cart(&conn, cart)?;
            let summary = if per_load {
                calculator::summarize_per_load(&cart.items, &cart.rates, view, &cli.currency)
            } else {
                calculator::summarize(&cart.items, cart.hours, &cart.rates, view, &cli.currency)
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&summary.totals)?);
            } else {
                if verbose {
                    println!("Rates:\n");
                    print!(
                        "{}",
                        calculator::format_rate_sheet(&cart.items, &cart.rates, &cli.currency)
                    );
                }
                println!("{}", summary);
            }

            if save {
                db::save_totals(&conn, cart.id, &summary.totals)?;
                println!("Saved totals for cart {}", cart.id);
            }
        }

        Commands::Export { cart, output } => {
            let cart = db::load_cart(&conn, cart)?;
            let sheet = export::build_sheet(&cart.items, cart.hours, &cart.rates);
            sheet.save(&output)?;
            println!(
                "Exported {} machine columns to {}",
                sheet.machine_columns(),
                output.display()
            );
        }
    }

    Ok(())
}
