use rekordsync_lib::library_parser::parse_catalog;
use rekordsync_lib::library_writer::write_catalog;
use std::env;
use std::fs;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: verify_catalog <catalog.xml>");
        return;
    }

    let path = &args[1];
    println!("Reading catalog: {}", path);

    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            println!("Error reading file: {}", e);
            process::exit(1);
        }
    };

    let catalog = match parse_catalog(&bytes) {
        Ok(c) => c,
        Err(e) => {
            println!("Error parsing catalog: {}", e);
            process::exit(1);
        }
    };

    println!(
        "Product: {} {} ({})",
        catalog.product_name, catalog.product_version, catalog.product_company
    );
    println!("Tracks: {}", catalog.tracks.len());
    println!("Playlists: {}", catalog.root.playlist_count());

    let missing = catalog
        .tracks
        .values()
        .filter(|track| !track.file_path().exists())
        .count();
    println!("Tracks whose file is missing: {}", missing);

    let dangling = catalog.dangling_references();
    if dangling.is_empty() {
        println!("No dangling playlist entries.");
    } else {
        println!("Dangling playlist entries: {:?}", dangling);
    }

    // The first write normalises formatting; the second must match it exactly.
    let first = match write_catalog(&catalog) {
        Ok(b) => b,
        Err(e) => {
            println!("Error writing catalog: {}", e);
            process::exit(1);
        }
    };
    let stable = parse_catalog(&first)
        .and_then(|reparsed| write_catalog(&reparsed))
        .map(|second| second == first)
        .unwrap_or(false);

    if stable {
        println!("Success! Catalog rewrites byte-for-byte.");
    } else {
        println!("Rewrite is NOT stable.");
        process::exit(1);
    }
}
