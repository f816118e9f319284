//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `cellar_core` linkage and print its version.
//! - With a database path, open the store and print catalogue counts and
//!   filter statistics.

use cellar_core::{core_version, Store, StoreConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("cellar_core version={}", core_version());

    let Some(path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };

    let store = match Store::open(&path, StoreConfig::default()) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("failed to open `{path}`: {err}");
            return ExitCode::FAILURE;
        }
    };

    let wines = store.wines();
    let vineyards = store.vineyards();
    wines.update_uniques();
    vineyards.update_uniques();

    println!("wines={}", wines.get_count(None));
    println!("vineyards={}", vineyards.get_count(None));
    println!("reviews={}", store.reviews().get_count());
    println!("geolocations={}", store.geolocations().count());

    let stats = wines.stats();
    println!("countries={}", stats.countries.len());
    println!("wineries={}", stats.wineries.len());
    println!("colors={}", stats.colors.len());
    if let (Some(min), Some(max)) = (stats.vintage.min, stats.vintage.max) {
        println!("vintage={min}..={max}");
    }
    if let (Some(min), Some(max)) = (stats.price.min, stats.price.max) {
        println!("price={min}..={max}");
    }
    println!("statements={}", store.database().statement_count());
    ExitCode::SUCCESS
}
