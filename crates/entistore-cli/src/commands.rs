use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use entistore_dao::{
    BinaryDeletion, Conditions, DaoConfig, DaoService, Entity, EntityKey, GenericDao,
};
use entistore_store::FileDatastore;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cli::*;
use crate::files::{guess_content_type, StoredFile, SUMMARY};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Command::Put(PutArgs {
        chunk_size: Some(size),
        ..
    }) = &cli.command
    {
        config.chunk_size = *size;
    }

    if let Command::Config(_) = cli.command {
        return cmd_config(&config, &cli.data, cli.format);
    }

    let store = FileDatastore::open(&cli.data)
        .with_context(|| format!("cannot open store {}", cli.data.display()))?;
    let service = DaoService::new(Arc::new(store), config);
    let files: GenericDao<StoredFile> = service.dao(false);

    match cli.command {
        Command::Put(args) => cmd_put(&files, args, cli.format),
        Command::Get(args) => cmd_get(&files, args),
        Command::Ls(args) => cmd_ls(&files, args, cli.format),
        Command::Find(args) => cmd_find(&files, args, cli.format),
        Command::Rm(args) => cmd_rm(&files, args, cli.format),
        Command::Config(_) => Ok(()),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DaoConfig> {
    let Some(path) = path else {
        return Ok(DaoConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    let config = toml::from_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Parse `StoredFile(3)`-style key text, or a bare numeric id.
fn parse_key(text: &str) -> anyhow::Result<EntityKey> {
    if let Ok(id) = text.parse::<i64>() {
        return Ok(EntityKey::new(StoredFile::KIND, id));
    }
    let key: EntityKey = text.parse()?;
    Ok(key)
}

/// Parse `field=value` pairs. Values that are valid JSON keep their type;
/// anything else is taken as a string.
fn parse_conditions(pairs: &[String]) -> anyhow::Result<Conditions> {
    let mut conditions = Conditions::new();
    for pair in pairs {
        let Some((field, value)) = pair.split_once('=') else {
            bail!("condition `{pair}` is not of the form field=value");
        };
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.into()));
        conditions.insert(field.trim().to_string(), value);
    }
    Ok(conditions)
}

#[derive(Serialize)]
struct FileRow {
    key: String,
    name: String,
    size: u64,
    content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks: Option<usize>,
}

impl FileRow {
    fn new(file: &StoredFile, long: bool) -> Self {
        Self {
            key: file.key().map(|k| k.to_string()).unwrap_or_default(),
            name: file.name.clone(),
            size: file.size,
            content_type: file.content_type.clone(),
            chunks: long.then(|| file.chunk_keys.len()),
        }
    }
}

fn print_rows(rows: &[FileRow], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No files.");
            }
            for row in rows {
                print!(
                    "{}  {}  {} bytes  {}",
                    row.key.yellow(),
                    row.name.bold(),
                    row.size,
                    row.content_type.dimmed()
                );
                match row.chunks {
                    Some(chunks) => println!("  ({chunks} chunks)"),
                    None => println!(),
                }
            }
        }
    }
    Ok(())
}

fn cmd_put(files: &GenericDao<StoredFile>, args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("cannot read {}", args.file.display()))?;
    let name = match args.name {
        Some(name) => name,
        None => args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    let content_type = args
        .content_type
        .unwrap_or_else(|| guess_content_type(&args.file).to_string());

    let mut file = StoredFile::new(name, bytes.len() as u64, content_type);
    let key = files.store_binary(&mut file, &bytes)?;

    match format {
        OutputFormat::Json => print_rows(&[FileRow::new(&file, true)], format)?,
        OutputFormat::Text => println!(
            "{} Stored {} as {} ({} chunks)",
            "✓".green().bold(),
            file.name.bold(),
            key.to_string().yellow(),
            file.chunk_keys.len()
        ),
    }
    Ok(())
}

fn cmd_get(files: &GenericDao<StoredFile>, args: GetArgs) -> anyhow::Result<()> {
    let key = parse_key(&args.key)?;
    let file = files.find_key(&key)?;
    let bytes = files.load_binary(&file)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, &bytes)
                .with_context(|| format!("cannot write {}", path.display()))?;
            eprintln!(
                "{} Wrote {} bytes to {}",
                "✓".green().bold(),
                bytes.len(),
                path.display()
            );
        }
        None => std::io::stdout().lock().write_all(&bytes)?,
    }
    Ok(())
}

fn cmd_ls(files: &GenericDao<StoredFile>, args: LsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let listed = if args.long {
        files.list()?
    } else {
        files.load(&[SUMMARY])?
    };
    let rows: Vec<FileRow> = listed.iter().map(|f| FileRow::new(f, args.long)).collect();
    print_rows(&rows, format)
}

fn cmd_find(files: &GenericDao<StoredFile>, args: FindArgs, format: OutputFormat) -> anyhow::Result<()> {
    let conditions = parse_conditions(&args.conditions)?;
    let found = files.load_where(&conditions, &[SUMMARY])?;
    let rows: Vec<FileRow> = found.iter().map(|f| FileRow::new(f, false)).collect();
    print_rows(&rows, format)
}

fn cmd_rm(files: &GenericDao<StoredFile>, args: RmArgs, format: OutputFormat) -> anyhow::Result<()> {
    let key = parse_key(&args.key)?;
    let file = files.find_key(&key)?;
    match files.delete_binary(&file)? {
        BinaryDeletion::Deleted { key, chunks } => match format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({ "deleted": key.to_string(), "chunks": chunks })
            ),
            OutputFormat::Text => println!(
                "{} Deleted {} and {} chunks",
                "✓".green().bold(),
                key.to_string().yellow(),
                chunks
            ),
        },
        BinaryDeletion::Aborted { .. } => bail!("{key} could not be resolved; nothing was deleted"),
    }
    Ok(())
}

fn cmd_config(config: &DaoConfig, data: &Path, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => {
            println!("{} = {}", "data".bold(), data.display());
            print!("{}", toml::to_string_pretty(config)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dao(service: &DaoService) -> GenericDao<StoredFile> {
        service.dao(false)
    }

    #[test]
    fn bare_ids_become_stored_file_keys() {
        assert_eq!(parse_key("7").unwrap(), EntityKey::new("StoredFile", 7));
        assert_eq!(
            parse_key("StoredFile(\"a\")").unwrap(),
            EntityKey::new("StoredFile", "a")
        );
        assert!(parse_key("StoredFile(").is_err());
    }

    #[test]
    fn conditions_keep_json_types() {
        let conditions = parse_conditions(&[
            "size=12".to_string(),
            "name=photo.png".to_string(),
            "content_type = \"image/png\"".to_string(),
        ])
        .unwrap();
        assert_eq!(conditions["size"], json!(12));
        assert_eq!(conditions["name"], json!("photo.png"));
        assert_eq!(conditions["content_type"], json!("image/png"));
        assert!(parse_conditions(&["size".to_string()]).is_err());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entistore.toml");
        std::fs::write(&path, "chunk_size = 4096\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.cache_capacity, DaoConfig::default().cache_capacity);
        assert_eq!(load_config(None).unwrap(), DaoConfig::default());
    }

    #[test]
    fn put_get_rm_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        let payload = "line\n".repeat(300);
        std::fs::write(&source, &payload).unwrap();

        let store = FileDatastore::open(dir.path().join("store.json")).unwrap();
        let service = DaoService::new(Arc::new(store), DaoConfig::default().with_chunk_size(256));
        let files = dao(&service);

        let put = PutArgs {
            file: source,
            name: None,
            content_type: None,
            chunk_size: None,
        };
        cmd_put(&files, put, OutputFormat::Text).unwrap();

        let listed = files.load(&[SUMMARY]).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "notes.txt");
        assert_eq!(listed[0].content_type, "text/plain");
        let key = listed[0].key().unwrap().to_string();

        let output = dir.path().join("out.txt");
        let get = GetArgs {
            key: key.clone(),
            output: Some(output.clone()),
        };
        cmd_get(&files, get).unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), payload);

        cmd_rm(&files, RmArgs { key: key.clone() }, OutputFormat::Json).unwrap();
        assert!(files.list().unwrap().is_empty());
        assert!(cmd_rm(&files, RmArgs { key }, OutputFormat::Text).is_err());
    }
}
