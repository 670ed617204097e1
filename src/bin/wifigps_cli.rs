use std::path::PathBuf;
use structopt::StructOpt;

use wifigps::config::Config;
use wifigps::fingerprint::{fingerprint, strong_access_points, Fingerprint};
use wifigps::models::ScanEntry;
use wifigps::persistence::{CacheStore, SqliteCacheStore};

/// WiFiGPS command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "wifigps", about = "WiFi-fingerprint GPS duty-cycling tools")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Dump the persisted location cache
    Inspect {
        /// Path to the cache database
        #[structopt(short, long, default_value = "wifigps_cache.db")]
        database: PathBuf,
        /// Only show records with a stored location
        #[structopt(long)]
        located: bool,
    },
    /// Print the fingerprint of a scan given as id:strength pairs
    Hash {
        /// Access points, e.g. 00:11:22:33:44:55:-61
        aps: Vec<String>,
    },
}

/// Split "id:strength" at the last colon, since BSSIDs contain colons
fn parse_ap(arg: &str) -> Result<ScanEntry, String> {
    let (id, strength) = arg
        .rsplit_once(':')
        .ok_or_else(|| format!("Expected id:strength, got {:?}", arg))?;
    let strength = strength
        .parse::<i32>()
        .map_err(|e| format!("Bad strength in {:?}: {}", arg, e))?;
    Ok(ScanEntry::new(id, strength))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Inspect { database, located } => {
            if !database.exists() {
                eprintln!("Database not found: {:?}", database);
                std::process::exit(1);
            }

            let store = SqliteCacheStore::new(&database)?;
            let mut rows = store.load_all()?;
            rows.sort_by(|a, b| b.1.count.cmp(&a.1.count));

            let shown: Vec<_> = rows
                .iter()
                .filter(|(_, r)| !located || r.location.is_some())
                .collect();
            println!("{} cache record(s) (showing {}):\n", rows.len(), shown.len());

            for (sig, record) in shown {
                let when = chrono::DateTime::from_timestamp_millis(record.last_seen_ms)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| record.last_seen_ms.to_string());
                print!(
                    "  {}  count={:<3} resolved={:<5} seen={}",
                    sig.to_hex(),
                    record.count,
                    record.resolved,
                    when
                );
                match record.location {
                    Some(loc) => println!(
                        "  at {:.6}, {:.6} ({:.1} m)",
                        loc.latitude, loc.longitude, loc.accuracy
                    ),
                    None => println!(),
                }
            }
        }
        Cli::Hash { aps } => {
            let entries = aps
                .iter()
                .map(|a| parse_ap(a))
                .collect::<Result<Vec<_>, _>>()?;

            match fingerprint(&entries) {
                Fingerprint::NoWifi => println!("No access points: no fingerprint"),
                Fingerprint::Signature(sig) => {
                    println!("Strong APs: [{}]", strong_access_points(&entries).join(", "));
                    println!("{}", sig.to_hex());
                }
            }
        }
    }

    Ok(())
}
