//! Stealth key files
//!
//! JSON with the spending seed and viewing secret, both base58:
//! `{"spending": "...", "viewing": "..."}`

use anyhow::{Context, anyhow, bail};
use makora_privacy::StealthKeys;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const DEFAULT_KEY_FILE: &str = "stealth.json";

#[derive(Serialize, Deserialize)]
struct KeyFile {
    spending: String,
    viewing: String,
}

/// `~/.makora/<filename>`, or the path itself if it has a directory part
pub fn resolve_path(filename: Option<&str>) -> anyhow::Result<PathBuf> {
    let name = filename.unwrap_or(DEFAULT_KEY_FILE);
    let given = Path::new(name);
    if given.components().count() > 1 || given.is_absolute() {
        return Ok(given.to_path_buf());
    }

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow!("Could not determine home directory"))?;
    Ok(Path::new(&home).join(".makora").join(name))
}

fn decode_secret(value: &str, what: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = bs58::decode(value)
        .into_vec()
        .with_context(|| format!("{what} key is not base58"))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow!("{what} key must be 32 bytes, got {}", b.len()))
}

pub fn load(path: &Path) -> anyhow::Result<StealthKeys> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file: {}", path.display()))?;
    let file: KeyFile = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse key file: {}", path.display()))?;

    Ok(StealthKeys::from_bytes(
        decode_secret(&file.spending, "spending")?,
        decode_secret(&file.viewing, "viewing")?,
    ))
}

/// Write a new key file readable only by the owner. Never overwrites.
pub fn save(path: &Path, keys: &StealthKeys) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
            println!("📁 Created directory: {}", dir.display());

            #[cfg(unix)]
            {
                let mut perms = fs::metadata(dir)?.permissions();
                perms.set_mode(0o700);
                fs::set_permissions(dir, perms)?;
            }
        }
    }

    if path.exists() {
        bail!(
            "File {} already exists. Remove it first or use a different filename.",
            path.display()
        );
    }

    let json = serde_json::to_string_pretty(&KeyFile {
        spending: bs58::encode(keys.spending_bytes()).into_string(),
        viewing: bs58::encode(keys.viewing_bytes()).into_string(),
    })?;

    let mut f = OpenOptions::new().write(true).create_new(true).open(path)?;

    #[cfg(unix)]
    {
        let mut perms = f.metadata()?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    f.write_all(json.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("stealth.json");
        let keys = StealthKeys::random();

        save(&path, &keys).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.spending_pubkey(), keys.spending_pubkey());
        assert_eq!(loaded.viewing_pubkey(), keys.viewing_pubkey());
        assert!(save(&path, &keys).is_err());
    }

    #[test]
    fn test_rejects_short_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"spending": "3mJr7AoUXx2Wqd", "viewing": "3mJr7AoUXx2Wqd"}"#,
        )
        .unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("must be 32 bytes"));
    }

    #[test]
    fn test_resolve_path_keeps_explicit_paths() {
        assert_eq!(
            resolve_path(Some("./keys/a.json")).unwrap(),
            PathBuf::from("./keys/a.json")
        );
        assert!(resolve_path(None).unwrap().ends_with(".makora/stealth.json"));
    }
}
