use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use toonforge_contracts::characters::{Character, CharacterDraft, CharacterStore};
use toonforge_contracts::models::ModeRegistry;
use toonforge_contracts::records::DEFAULT_HISTORY_LIMIT;
use toonforge_engine::config::EngineConfig;
use toonforge_engine::{GenerationRequest, Studio};
use tracing::error;
use tracing_subscriber::EnvFilter;

const DEFAULT_DATA_DIR: &str = "toonforge-data";

#[derive(Debug, Parser)]
#[command(name = "toonforge", version, about = "Webtoon scene generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Generate(GenerateArgs),
    History(HistoryArgs),
    Show(ShowArgs),
    #[command(subcommand)]
    Character(CharacterCommand),
    Modes,
}

#[derive(Debug, Parser)]
struct DataArgs {
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    scenario: String,
    #[arg(long = "character")]
    characters: Vec<String>,
    #[arg(long)]
    mode: Option<String>,
    #[command(flatten)]
    data: DataArgs,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    limit: usize,
    #[command(flatten)]
    data: DataArgs,
}

#[derive(Debug, Parser)]
struct ShowArgs {
    #[arg(long)]
    id: String,
    #[command(flatten)]
    data: DataArgs,
}

#[derive(Debug, Subcommand)]
enum CharacterCommand {
    Add(CharacterAddArgs),
    List(DataArgs),
    Update(CharacterUpdateArgs),
    Delete(CharacterDeleteArgs),
}

#[derive(Debug, Parser)]
struct CharacterAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long)]
    image: Option<String>,
    #[command(flatten)]
    data: DataArgs,
}

#[derive(Debug, Parser)]
struct CharacterUpdateArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Pass an empty string to clear the reference image.
    #[arg(long)]
    image: Option<String>,
    #[command(flatten)]
    data: DataArgs,
}

#[derive(Debug, Parser)]
struct CharacterDeleteArgs {
    #[arg(long)]
    id: String,
    #[command(flatten)]
    data: DataArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("toonforge error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::History(args) => run_history(args),
        Command::Show(args) => run_show(args),
        Command::Character(command) => run_character(command),
        Command::Modes => {
            let modes: Vec<Value> = ModeRegistry::new(None)
                .list()
                .map(|mode| {
                    json!({
                        "name": mode.name,
                        "provider": mode.provider,
                        "model": mode.model,
                    })
                })
                .collect();
            print_json(&modes)?;
            Ok(0)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn open_studio(data_dir: &Path) -> Result<Studio> {
    Studio::open(EngineConfig::from_env(data_dir))
        .with_context(|| format!("failed to open data dir {}", data_dir.display()))
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let studio = open_studio(&args.data.data_dir)?;
    let request = GenerationRequest {
        scenario_text: args.scenario,
        character_ids: args.characters,
        provider_mode: args.mode,
    };
    match studio.generate(request) {
        Ok(response) => {
            print_json(&response)?;
            Ok(0)
        }
        Err(err) => {
            error!(error = %err, "generation failed");
            print_json(&generation_failed_body())?;
            Ok(1)
        }
    }
}

fn generation_failed_body() -> Value {
    json!({"success": false, "error": "Generation failed"})
}

fn run_history(args: HistoryArgs) -> Result<i32> {
    let studio = open_studio(&args.data.data_dir)?;
    let entries = studio.recent(args.limit)?;
    print_json(&entries)?;
    Ok(0)
}

fn run_show(args: ShowArgs) -> Result<i32> {
    let studio = open_studio(&args.data.data_dir)?;
    match studio.generation(&args.id)? {
        Some(entry) => {
            print_json(&entry)?;
            Ok(0)
        }
        None => bail!("generation {} not found", args.id),
    }
}

fn run_character(command: CharacterCommand) -> Result<i32> {
    match command {
        CharacterCommand::Add(args) => {
            let store = character_store(&args.data.data_dir);
            let row = store.create(CharacterDraft {
                name: args.name,
                description: args.description,
                image_url: args.image,
            })?;
            print_json(&row)?;
        }
        CharacterCommand::List(data) => {
            print_json(&character_store(&data.data_dir).list()?)?;
        }
        CharacterCommand::Update(args) => {
            let store = character_store(&args.data.data_dir);
            let Some(existing) = store.get(&args.id)? else {
                bail!("character {} not found", args.id);
            };
            let draft = merge_draft(existing, args.name, args.description, args.image);
            print_json(&store.update(&args.id, draft)?)?;
        }
        CharacterCommand::Delete(args) => {
            character_store(&args.data.data_dir).delete(&args.id)?;
            print_json(&json!({"success": true, "id": args.id}))?;
        }
    }
    Ok(0)
}

fn character_store(data_dir: &Path) -> CharacterStore {
    CharacterStore::new(EngineConfig::new(data_dir).characters_path())
}

/// Fields left unset keep their stored value; an empty image clears it.
fn merge_draft(
    existing: Character,
    name: Option<String>,
    description: Option<String>,
    image: Option<String>,
) -> CharacterDraft {
    let image_url = match image {
        Some(value) if value.trim().is_empty() => None,
        Some(value) => Some(value),
        None => existing.image_url,
    };
    CharacterDraft {
        name: name.unwrap_or(existing.name),
        description: description.unwrap_or(existing.description),
        image_url,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use toonforge_contracts::characters::Character;

    use super::{generation_failed_body, merge_draft, CharacterCommand, Cli, Command};

    #[test]
    fn generate_accepts_repeated_characters() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "toonforge",
            "generate",
            "--scenario",
            "They fight in the rain",
            "--character",
            "aria",
            "--character",
            "bram",
            "--mode",
            "nano-banana",
            "--data-dir",
            "/tmp/tf",
        ])?;
        let Command::Generate(args) = cli.command else {
            anyhow::bail!("expected generate");
        };
        assert_eq!(args.characters, vec!["aria".to_string(), "bram".to_string()]);
        assert_eq!(args.mode.as_deref(), Some("nano-banana"));
        assert_eq!(args.data.data_dir.to_string_lossy(), "/tmp/tf");
        Ok(())
    }

    #[test]
    fn history_defaults_to_ten_entries() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["toonforge", "history"])?;
        let Command::History(args) = cli.command else {
            anyhow::bail!("expected history");
        };
        assert_eq!(args.limit, 10);
        Ok(())
    }

    #[test]
    fn character_subcommands_parse() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["toonforge", "character", "delete", "--id", "c-1"])?;
        assert!(matches!(
            cli.command,
            Command::Character(CharacterCommand::Delete(ref args)) if args.id == "c-1"
        ));
        Ok(())
    }

    #[test]
    fn merge_draft_keeps_unset_fields_and_clears_empty_image() {
        let existing = Character {
            id: "c-1".to_string(),
            name: "Aria".to_string(),
            description: "silver hair".to_string(),
            image_url: Some("/uploads/aria.png".to_string()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };

        let kept = merge_draft(existing.clone(), None, Some("red coat".to_string()), None);
        assert_eq!(kept.name, "Aria");
        assert_eq!(kept.description, "red coat");
        assert_eq!(kept.image_url.as_deref(), Some("/uploads/aria.png"));

        let cleared = merge_draft(existing, None, None, Some(String::new()));
        assert!(cleared.image_url.is_none());
    }

    #[test]
    fn failure_body_matches_wire_shape() {
        let body = generation_failed_body();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Generation failed");
    }
}
