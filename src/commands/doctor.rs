// pg-r2-backup/src/commands/doctor.rs
use crate::backup::s3_upload::S3Store;
use crate::config::{
    EnvSource, StorageConfig, flag, lookup, resolve_backup_time, resolve_dump_format,
    select_database_url,
};
use crate::utils::setting::check_db_connection;
use crate::utils::{PG_DUMP, find_executable};

const STORAGE_VARS: [&str; 4] = ["R2_ACCESS_KEY", "R2_SECRET_KEY", "R2_BUCKET_NAME", "R2_ENDPOINT"];

fn uses_public_url(env: &dyn EnvSource) -> bool {
    flag(env, "USE_PUBLIC_URL")
}

/// Variables a run cannot do without, given the selected URL mode.
pub fn missing_variables(env: &dyn EnvSource) -> Vec<&'static str> {
    let url_var = if uses_public_url(env) {
        "DATABASE_PUBLIC_URL"
    } else {
        "DATABASE_URL"
    };
    std::iter::once(url_var)
        .chain(STORAGE_VARS)
        .filter(|name| lookup(env, name).is_none())
        .collect()
}

/// Prints the environment report. Returns `true` when every check passed.
pub async fn execute(env: &dyn EnvSource) -> bool {
    let mut healthy = true;
    println!("pg-r2-backup doctor\n");

    match find_executable(PG_DUMP) {
        Ok(path) => println!("[OK] pg_dump found at {}", path.display()),
        Err(_) => {
            println!("[FAIL] pg_dump not found in PATH");
            healthy = false;
        }
    }

    let missing = missing_variables(env);
    if missing.is_empty() {
        println!("\n[OK] Required environment variables set");
    } else {
        println!("\n[FAIL] Missing environment variables:");
        for name in &missing {
            println!("  - {}", name);
        }
        healthy = false;
    }

    let use_public = uses_public_url(env);
    match select_database_url(env, use_public) {
        Ok(url) => match check_db_connection(url.expose()).await {
            Ok(()) => println!("[OK] Database reachable"),
            Err(e) => {
                println!("[FAIL] Database unreachable: {:#}", e);
                healthy = false;
            }
        },
        Err(_) => println!("[SKIP] Database connectivity (no connection string)"),
    }

    let storage = StorageConfig::from_env(env);
    if storage.credentials().is_ok() {
        match S3Store::new(storage).check_bucket().await {
            Ok(()) => println!("[OK] Bucket reachable"),
            Err(e) => {
                println!("[FAIL] Bucket check failed: {:#}", e);
                healthy = false;
            }
        }
    } else {
        println!("[SKIP] Bucket access (object storage not configured)");
    }

    let format = resolve_dump_format(env);
    let backup_time = resolve_backup_time(lookup(env, "BACKUP_TIME").as_deref());

    println!("\nDatabase URL mode : {}", if use_public { "public" } else { "private" });
    if lookup(env, "BACKUP_PASSWORD").is_some() {
        println!("Compression       : 7z (encrypted)");
    } else {
        println!("Compression       : gzip");
    }
    println!("Dump format       : {} (.{})", format.pg_dump_flag(), format.extension());
    println!("Backup time       : {} UTC", backup_time.value);
    if let Some(warning) = backup_time.warning {
        println!("[WARN] {}", warning);
    }
    println!("Local backups     : deleted after upload");

    println!("\nDoctor check complete.");
    healthy
}
