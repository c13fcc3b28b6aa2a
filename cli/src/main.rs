mod keyfile;

use anyhow::{Context, anyhow};
use std::env;
use std::sync::Arc;

use makora_config::MakoraConfig;
use makora_privacy::{
    PrivacyManager, RpcAnnouncementSource, ScanOptions, StealthAnnouncement, StealthKeys,
    StealthMetaAddress, derive_stealth_private_key, generate_stealth_address,
    verify_stealth_ownership,
};

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let cmd = &args[1];

    let result = match cmd.as_str() {
        "keygen" => keygen(args.get(2).map(String::as_str)),
        "meta" => meta(args.get(2).map(String::as_str)),
        "derive" => match args.get(2) {
            Some(encoded) => derive(encoded),
            None => {
                println!("Usage: derive <meta-address>");
                return;
            }
        },
        "recover" => match (args.get(2), args.get(3)) {
            (Some(key_file), Some(announcement)) => recover(key_file, announcement),
            _ => {
                println!("Usage: recover <key-file> <announcement-hex>");
                println!("  announcement-hex - 65-byte announcement as hex (130 chars)");
                return;
            }
        },
        "scan" => scan(parse_scan_args(&args[2..])).await,
        "status" => status(),
        "help" | "--help" | "-h" => {
            print_usage();
            return;
        }
        _ => {
            println!("❌ Unknown command: {}", cmd);
            println!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Makora Privacy CLI - stealth payments and shielded notes");
    println!();
    println!("USAGE:");
    println!("  makora-privacy <command> [args]");
    println!();
    println!("KEY COMMANDS:");
    println!("  keygen [file]                  Generate spending + viewing keys");
    println!("  meta [file]                    Print the stealth meta-address");
    println!();
    println!("PAYMENT COMMANDS:");
    println!("  derive <meta-address>          Derive a one-time stealth address");
    println!("  recover <file> <announcement>  Recover the keypair for an announcement");
    println!("  scan [file] [options]          Scan the chain for incoming payments");
    println!();
    println!("OTHER COMMANDS:");
    println!("  status                         Show privacy status");
    println!("  help                           Show this help message");
    println!();
    println!("SCAN OPTIONS:");
    println!("  --from <slot>                  First slot to scan");
    println!("  --to <slot>                    Last slot to scan (default: current)");
    println!("  --all                          Include claimed payments");
    println!();
    println!("EXAMPLES:");
    println!("  makora-privacy keygen                    # Write ~/.makora/stealth.json");
    println!("  makora-privacy derive st:<spend>:<view>  # Pay someone privately");
    println!("  makora-privacy scan --from 250000000     # Look for payments");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("  MK_CONFIG              Config file path");
    println!("  MK_PRIVACY_ENABLED     Enable privacy features (true/false)");
    println!("  SOLANA_RPC_URL         Solana RPC endpoint");
    println!("  MK_PRIVACY_PROGRAM_ID  Program emitting announcements");
    println!("  RUST_LOG               Log level (debug/info/warn/error)");
}

struct ScanArgs {
    key_file: Option<String>,
    options: ScanOptions,
}

fn parse_scan_args(args: &[String]) -> anyhow::Result<ScanArgs> {
    let mut parsed = ScanArgs {
        key_file: None,
        options: ScanOptions::default(),
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--from" => {
                let slot = args.get(i + 1).ok_or_else(|| anyhow!("--from needs a slot"))?;
                parsed.options.from_slot = Some(slot.parse().context("--from must be a number")?);
                i += 1;
            }
            "--to" => {
                let slot = args.get(i + 1).ok_or_else(|| anyhow!("--to needs a slot"))?;
                parsed.options.to_slot = Some(slot.parse().context("--to must be a number")?);
                i += 1;
            }
            "--all" => {
                parsed.options.include_claimed = true;
            }
            other if !other.starts_with("--") && parsed.key_file.is_none() => {
                parsed.key_file = Some(other.to_string());
            }
            other => {
                return Err(anyhow!("Unknown scan option: {other}"));
            }
        }
        i += 1;
    }

    Ok(parsed)
}

fn keygen(filename: Option<&str>) -> anyhow::Result<()> {
    let path = keyfile::resolve_path(filename)?;

    println!("🔐 Generating stealth keys...");
    let keys = StealthKeys::random();
    keyfile::save(&path, &keys)?;

    println!("✅ Wrote stealth keys to {}", path.display());
    println!("🔑 Meta-address: {}", keys.meta_address());
    Ok(())
}

fn meta(filename: Option<&str>) -> anyhow::Result<()> {
    let keys = keyfile::load(&keyfile::resolve_path(filename)?)?;
    println!("{}", keys.meta_address());
    Ok(())
}

fn derive(encoded: &str) -> anyhow::Result<()> {
    let meta = StealthMetaAddress::parse(encoded)?;
    let stealth = generate_stealth_address(&meta)?;
    let announcement = StealthAnnouncement::from(&stealth);

    println!("Stealth address:  {}", stealth.address_base58());
    println!(
        "Ephemeral key:    {}",
        bs58::encode(stealth.ephemeral_pubkey).into_string()
    );
    println!("View tag:         {}", stealth.view_tag);
    println!("Announcement:     {}", hex::encode(announcement.to_bytes()));
    Ok(())
}

fn recover(key_file: &str, announcement_hex: &str) -> anyhow::Result<()> {
    let keys = keyfile::load(&keyfile::resolve_path(Some(key_file))?)?;
    let bytes = hex::decode(announcement_hex.trim()).context("announcement is not hex")?;
    let announcement = StealthAnnouncement::from_bytes(&bytes)?;

    let ours = verify_stealth_ownership(
        &announcement.stealth_address,
        &announcement.ephemeral_pubkey,
        keys.viewing_secret(),
        &keys.spending_pubkey(),
        Some(announcement.view_tag),
    );
    if !ours {
        println!("❌ Announcement is not addressed to these keys");
        std::process::exit(2);
    }

    let keypair = derive_stealth_private_key(
        keys.spending_key(),
        keys.viewing_secret(),
        &announcement.ephemeral_pubkey,
    )?;
    println!("✅ Payment is ours");
    println!("Stealth address:  {}", keypair.address());
    Ok(())
}

async fn scan(args: anyhow::Result<ScanArgs>) -> anyhow::Result<()> {
    let args = args?;
    log::debug!("Scan options: {:?}", args.options);
    let keys = keyfile::load(&keyfile::resolve_path(args.key_file.as_deref())?)?;

    let config = MakoraConfig::load()?;
    let privacy = config.privacy_config();
    let source = Arc::new(RpcAnnouncementSource::from_config(&privacy.solana));
    println!("🔎 Scanning via {}...", source.rpc_url());

    let mut manager = PrivacyManager::new(privacy)?;
    manager.initialize_scanner(source, keys.viewing_secret().clone(), keys.spending_pubkey())?;

    let payments = manager.scan_payments(args.options).await?;
    if payments.is_empty() {
        println!("No payments found");
    }
    for payment in &payments {
        let balance = payment
            .balance
            .map_or_else(|| "unknown".to_string(), |b| b.to_string());
        println!(
            "{} amount={} balance={} claimed={} slot={} tx={}",
            payment.address(),
            payment.amount,
            balance,
            payment.claimed,
            payment.slot,
            payment.signature
        );
    }

    if let Some(slot) = manager.scanner().and_then(|s| s.last_scanned_slot()) {
        println!("Scanned up to slot {slot}");
    }
    Ok(())
}

fn status() -> anyhow::Result<()> {
    let manager = PrivacyManager::from_env()?;
    println!("{}", serde_json::to_string_pretty(&manager.get_status())?);
    Ok(())
}
