use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use ccas_crypto::{ContentHasher, EncryptionKey, HashAlgorithm, MasterContentSecret};
use ccas_store::{
    FormatConfig, FsStorage, ObjectFormatter, ObjectManager, ObjectManagerStats, PlainFormatter,
    RepositoryConfig, StatsSnapshot, WrittenObject,
};
use ccas_types::ObjectId;
use colored::Colorize;
use serde_json::json;
use tracing::info;

use crate::cli::*;

/// Directory holding object files inside a repository.
const OBJECTS_DIR: &str = "objects";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Init(args) => cmd_init(args, format),
        Command::Hash(args) => cmd_hash(args, format),
        Command::Put(args) => cmd_put(args, format),
        Command::Get(args) => cmd_get(args),
        Command::Stats(args) => cmd_stats(args, format),
    }
}

fn config_path(repo: &Path) -> PathBuf {
    repo.join(RepositoryConfig::FILE_NAME)
}

fn init_repository(repo: &Path, encrypt: bool, hash: HashAlgorithm) -> anyhow::Result<RepositoryConfig> {
    let path = config_path(repo);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    fs::create_dir_all(repo.join(OBJECTS_DIR))
        .with_context(|| format!("creating {}", repo.display()))?;

    let format = if encrypt {
        FormatConfig::encrypted(&MasterContentSecret::generate()?)
    } else {
        FormatConfig::plain(hash)
    };
    let config = RepositoryConfig { format };
    config.save(&path)?;
    info!(repo = %repo.display(), encrypted = encrypt, "repository initialized");
    Ok(config)
}

fn open_repository(repo: &Path) -> anyhow::Result<ObjectManager> {
    let path = config_path(repo);
    let config = RepositoryConfig::load(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    let storage = Arc::new(FsStorage::open(repo.join(OBJECTS_DIR))?);
    Ok(ObjectManager::from_config(&config.format, storage)?)
}

fn put_file(manager: &ObjectManager, file: &Path, prefix: &str) -> anyhow::Result<WrittenObject> {
    let source = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    manager
        .write_seekable(BufReader::new(source), prefix)
        .with_context(|| format!("storing {}", file.display()))
}

fn get_object(manager: &ObjectManager, id: &str, key: Option<&str>) -> anyhow::Result<Vec<u8>> {
    let id = ObjectId::parse(id)?;
    let key = key.map(EncryptionKey::from_hex).transpose()?;
    Ok(manager.read_object_with_key(&id, key)?)
}

fn hash_file(args: &HashArgs) -> anyhow::Result<ObjectId> {
    let file = File::open(&args.file).with_context(|| format!("opening {}", args.file.display()))?;
    let mut reader = BufReader::new(file);
    let id = match &args.repo {
        Some(repo) => open_repository(repo)?.compute_id_reader(&mut reader, &args.prefix)?,
        None => {
            let formatter = PlainFormatter::new(ContentHasher::new(args.hash));
            formatter.format_reader(&mut reader, &args.prefix, &ObjectManagerStats::new())?.0
        }
    };
    Ok(id)
}

fn cmd_init(args: InitArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = init_repository(&args.repo, args.encrypt, args.hash)?;
    let mode = if config.format.encryption {
        "encrypted".to_string()
    } else {
        config.format.hash.to_string()
    };
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "repo": args.repo.display().to_string(), "format": mode })
        ),
        OutputFormat::Text => {
            println!("{} Initialized {} repository in {}", "✓".green().bold(), mode.cyan(), args.repo.display().to_string().bold());
            if config.format.encryption {
                println!("  Master secret stored in {}; keep it private.", RepositoryConfig::FILE_NAME.yellow());
            }
        }
    }
    Ok(())
}

fn cmd_hash(args: HashArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = hash_file(&args)?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "file": args.file.display().to_string(), "id": id.as_str() })),
        OutputFormat::Text => println!("{id}"),
    }
    Ok(())
}

fn cmd_put(args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let manager = open_repository(&args.repo)?;
    let mut written = Vec::with_capacity(args.files.len());
    for file in &args.files {
        let object = put_file(&manager, file, &args.prefix)?;
        written.push((file, object));
    }

    match format {
        OutputFormat::Json => {
            let objects: Vec<_> = written
                .iter()
                .map(|(file, object)| {
                    json!({
                        "file": file.display().to_string(),
                        "id": object.id.as_str(),
                        "key": object.key.as_ref().map(EncryptionKey::to_hex),
                        "deduplicated": object.deduplicated,
                        "stored_bytes": object.stored_bytes,
                    })
                })
                .collect();
            println!("{}", json!({ "objects": objects, "stats": manager.stats().snapshot() }));
        }
        OutputFormat::Text => {
            for (file, object) in &written {
                let status = if object.deduplicated { "present".dimmed() } else { "stored".green() };
                println!("{} {}  {}", status, object.id.as_str().yellow(), file.display());
                if let Some(key) = &object.key {
                    println!("  key: {}", key.to_hex());
                }
            }
        }
    }
    Ok(())
}

fn cmd_get(args: GetArgs) -> anyhow::Result<()> {
    let manager = open_repository(&args.repo)?;
    let data = get_object(&manager, &args.id, args.key.as_deref())?;
    match &args.output {
        Some(path) => fs::write(path, &data).with_context(|| format!("writing {}", path.display()))?,
        None => std::io::stdout().lock().write_all(&data)?,
    }
    Ok(())
}

fn cmd_stats(args: StatsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let manager = open_repository(&args.repo)?;
    let ids = manager.list_objects()?;
    let encrypted = ids.iter().filter(|id| id.is_encrypted()).count();

    let mut failures = Vec::new();
    if args.verify {
        // Encrypted objects cannot be read without their keys.
        for id in ids.iter().filter(|id| !id.is_encrypted()) {
            if let Err(e) = manager.verify_object(id) {
                failures.push((id.clone(), e));
            }
        }
    }
    let snapshot = manager.stats().snapshot();

    match format {
        OutputFormat::Json => {
            let failed: Vec<_> = failures.iter().map(|(id, _)| id.as_str()).collect();
            println!(
                "{}",
                json!({
                    "formatter": manager.formatter_name(),
                    "objects": ids.len(),
                    "encrypted_objects": encrypted,
                    "failed": failed,
                    "stats": snapshot,
                })
            );
        }
        OutputFormat::Text => print_stats(manager.formatter_name(), ids.len(), encrypted, &snapshot, &failures),
    }

    if !failures.is_empty() {
        bail!("{} object(s) failed verification", failures.len());
    }
    Ok(())
}

fn print_stats(
    formatter: &str,
    objects: usize,
    encrypted: usize,
    snapshot: &StatsSnapshot,
    failures: &[(ObjectId, ccas_store::StoreError)],
) {
    println!("Formatter: {}", formatter.cyan());
    println!("Objects: {} ({} encrypted)", objects.to_string().bold(), encrypted);
    println!("Read: {} objects, {} bytes", snapshot.read_objects, snapshot.read_bytes);
    println!("Invalid: {}", snapshot.invalid_objects);
    for (id, err) in failures {
        println!("  {} {}: {}", "✗".red().bold(), id.short().yellow(), err);
    }
    if failures.is_empty() && snapshot.read_objects > 0 {
        println!("{} All verified objects are intact", "✓".green().bold());
    }
}
