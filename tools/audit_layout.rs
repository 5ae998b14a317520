use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assets::{AssetManager, AssetOptions};
use catalog::Catalog;
use storage::LocalFileStore;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let uploads_dir = args
        .next()
        .or_else(|| env::var("UPLOADS_DIR").ok())
        .ok_or("UPLOADS_DIR not set and no path argument")?;
    let catalog_path = args
        .next()
        .or_else(|| env::var("CATALOG_PATH").ok())
        .unwrap_or_else(|| "catalog.redb".to_string());

    if !Path::new(&catalog_path).exists() {
        return Err(format!("catalog {} does not exist", catalog_path).into());
    }
    let catalog = Catalog::open(&PathBuf::from(&catalog_path))?;
    let store = LocalFileStore::new(PathBuf::from(&uploads_dir))?;
    let manager = AssetManager::new(catalog, Arc::new(store), AssetOptions::default());

    let report = manager.audit()?;
    for issue in &report.issues {
        match &issue.expected_path {
            Some(expected) => println!(
                "file {} (song {}): {:?} {} -> {}",
                issue.file_id, issue.song_id, issue.kind, issue.stored_path, expected
            ),
            None => println!(
                "file {} (song {}): {:?} {}",
                issue.file_id, issue.song_id, issue.kind, issue.stored_path
            ),
        }
    }
    println!("Checked {} files, {} issues", report.checked, report.issues.len());

    if report.issues.is_empty() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
