use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use livepad_core::{
    FileStore, HeadlessWidget, HostPageSurface, ProjectId, Session, SourceLanguage, SourceRef,
    Status,
};
use livepad_project::{Confirmation, ProjectStore, ProjectWorkspace};
use livepad_settings::{Preferences, PreferencesStore};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "livepad",
    about = "Live preview and project management for LivePad",
    author,
    version
)]
struct Cli {
    /// 偏好設定檔路徑。 / Preferences file (JSON).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 組合資料夾內容並輸出預覽頁面。 / Compose a folder and write the sandboxed preview page.
    Preview(PreviewArgs),
    /// 管理使用者的專案。 / Manage an owner's projects.
    Project(ProjectArgs),
}

#[derive(Args)]
struct PreviewArgs {
    /// 要開啟的資料夾。 / Folder to open.
    folder: PathBuf,

    /// 預覽頁面輸出路徑。 / Destination of the host page.
    #[arg(long, value_name = "PATH")]
    output: PathBuf,

    /// 作為主體的 HTML 檔（相對於資料夾）。 / Markup file used as the body, relative to the folder.
    #[arg(long, value_name = "FILE")]
    entry: Option<PathBuf>,
}

#[derive(Args)]
struct ProjectArgs {
    /// 專案清單所在資料夾。 / Directory holding the project lists.
    #[arg(long, value_name = "DIR")]
    store: PathBuf,

    /// 專案擁有者。 / Owner of the projects.
    #[arg(long, value_name = "NAME")]
    owner: String,

    #[command(subcommand)]
    command: ProjectCommand,
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// 列出專案。 / List projects.
    List,
    /// 建立專案。 / Create a project.
    Create(ProjectCreateArgs),
    /// 刪除專案。 / Delete a project.
    Delete(ProjectDeleteArgs),
    /// 匯出專案 JSON。 / Export a project as JSON.
    Export(ProjectExportArgs),
    /// 匯入專案 JSON。 / Import a project from JSON.
    Import(ProjectImportArgs),
    /// 輸出專案的預覽頁面。 / Write the preview page of a project.
    Preview(ProjectPreviewArgs),
}

#[derive(Args)]
struct ProjectCreateArgs {
    name: String,

    /// 專案語言，可重複指定。 / Languages of the project; repeatable.
    #[arg(long = "lang", value_name = "LANGUAGE", value_parser = parse_language)]
    languages: Vec<SourceLanguage>,
}

#[derive(Args)]
struct ProjectDeleteArgs {
    id: String,

    /// 確認刪除。 / Confirm the deletion.
    #[arg(long)]
    yes: bool,
}

#[derive(Args)]
struct ProjectExportArgs {
    id: String,

    /// 輸出檔案；略過時寫到標準輸出。 / Destination file; stdout when omitted.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct ProjectImportArgs {
    input: PathBuf,
}

#[derive(Args)]
struct ProjectPreviewArgs {
    id: String,

    #[arg(long, value_name = "PATH")]
    output: PathBuf,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LIVEPAD_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let Cli { config, command } = Cli::parse();
    let preferences = load_preferences(config.as_deref())?;
    match command {
        Commands::Preview(args) => execute_preview(args, &preferences),
        Commands::Project(args) => execute_project(args, &preferences),
    }
}

fn load_preferences(path: Option<&Path>) -> Result<Preferences> {
    let Some(path) = path else {
        return Ok(Preferences::default());
    };
    let path = resolve_input_path(path)?;
    let store = PreferencesStore::load(&path)
        .with_context(|| format!("failed to load preferences from {}", path.display()))?;
    Ok(store.preferences().clone())
}

fn execute_preview(args: PreviewArgs, preferences: &Preferences) -> Result<()> {
    let folder = resolve_input_path(&args.folder)?;
    if !folder.is_dir() {
        bail!("folder '{}' does not exist", folder.display());
    }
    let output = resolve_input_path(&args.output)?;
    let store = FileStore::new(&folder);
    let files = store
        .list_files()
        .with_context(|| format!("failed to list {}", folder.display()))?;
    let folder_name = store.name();

    let mut session = Session::new(
        store,
        HeadlessWidget::new(),
        Box::new(HostPageSurface::new(&output)),
        preferences.session_options(),
    );
    session.set_status(Status::FolderLoaded(folder_name));
    info!(status = %session.status(), files = files.len(), "folder opened");

    for file in files.iter().filter(|file| !is_same_file(&folder.join(file), &output)) {
        if let Err(err) = session.open(SourceRef::file(file)) {
            warn!(file = %file.display(), error = %err, "skipping file");
        }
    }

    let entry = match args.entry {
        Some(entry) => entry,
        None => files
            .iter()
            .find(|file| SourceLanguage::from_path(file) == SourceLanguage::Markup)
            .cloned()
            .ok_or_else(|| anyhow!("no markup file found in {}", folder.display()))?,
    };
    let source = SourceRef::file(&entry);
    if source.language() != SourceLanguage::Markup {
        bail!("entry '{}' is not a markup file", entry.display());
    }
    let tab = session
        .find_by_source(&source)
        .ok_or_else(|| anyhow!("entry '{}' could not be opened", entry.display()))?;
    session.activate(tab);
    session.set_canonical_markup(Some(tab));
    session.run();

    if session.compositor().last_loaded().is_none() {
        bail!("failed to write the preview: {}", session.status());
    }
    debug!(tabs = session.len(), "preview composed");
    println!(
        "Preview of {} written to {}",
        entry.display(),
        output.display()
    );
    Ok(())
}

fn execute_project(args: ProjectArgs, preferences: &Preferences) -> Result<()> {
    let ProjectArgs {
        store,
        owner,
        command,
    } = args;
    let root = resolve_input_path(&store)?;
    let mut store = ProjectStore::new(&root);
    match command {
        ProjectCommand::List => list_projects(&mut store, &owner),
        ProjectCommand::Create(args) => create_project(&mut store, &owner, args, preferences),
        ProjectCommand::Delete(args) => delete_project(&mut store, &owner, args),
        ProjectCommand::Export(args) => export_project(&mut store, &owner, args),
        ProjectCommand::Import(args) => import_project(&mut store, &owner, args),
        ProjectCommand::Preview(args) => preview_project(store, &owner, args),
    }
}

fn list_projects(store: &mut ProjectStore, owner: &str) -> Result<()> {
    let projects = store
        .list(owner)
        .with_context(|| format!("failed to load projects of {owner}"))?;
    if projects.is_empty() {
        println!("No projects for {owner}");
        return Ok(());
    }
    for project in projects {
        let languages: Vec<&str> = project
            .languages
            .iter()
            .map(|language| language.as_str())
            .collect();
        println!("{}\t{}\t{}", project.id, project.name, languages.join(","));
    }
    Ok(())
}

fn create_project(
    store: &mut ProjectStore,
    owner: &str,
    args: ProjectCreateArgs,
    preferences: &Preferences,
) -> Result<()> {
    let languages = if args.languages.is_empty() {
        preferences.projects.default_languages.clone()
    } else {
        args.languages
    };
    let record = store
        .create(owner, &args.name, languages)
        .with_context(|| format!("failed to create project '{}'", args.name))?;
    println!("Created project {} ({})", record.name, record.id);
    Ok(())
}

fn delete_project(store: &mut ProjectStore, owner: &str, args: ProjectDeleteArgs) -> Result<()> {
    let id = known_project(store, owner, &args.id)?;
    let confirmation = if args.yes {
        Confirmation::Confirmed
    } else {
        Confirmation::Declined
    };
    if store
        .delete(owner, &id, confirmation)
        .with_context(|| format!("failed to delete project {id}"))?
    {
        println!("Deleted project {id}");
    } else {
        println!("Deletion of {id} declined; pass --yes to confirm");
    }
    Ok(())
}

fn export_project(store: &mut ProjectStore, owner: &str, args: ProjectExportArgs) -> Result<()> {
    let id = known_project(store, owner, &args.id)?;
    let blob = store
        .export_serialized(&id)
        .with_context(|| format!("failed to export project {id}"))?;
    match args.output {
        Some(output) => {
            let output = resolve_input_path(&output)?;
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::write(&output, blob)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Exported project {id} to {}", output.display());
        }
        None => println!("{blob}"),
    }
    Ok(())
}

fn import_project(store: &mut ProjectStore, owner: &str, args: ProjectImportArgs) -> Result<()> {
    let input = resolve_input_path(&args.input)?;
    if !input.exists() {
        bail!("project file '{}' does not exist", input.display());
    }
    let blob = fs::read_to_string(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let record = store
        .import_serialized(owner, &blob)
        .with_context(|| format!("failed to import {}", input.display()))?;
    println!("Imported project {} ({})", record.name, record.id);
    Ok(())
}

fn preview_project(mut store: ProjectStore, owner: &str, args: ProjectPreviewArgs) -> Result<()> {
    let id = known_project(&mut store, owner, &args.id)?;
    let output = resolve_input_path(&args.output)?;
    let mut workspace = ProjectWorkspace::start(
        store,
        owner,
        HeadlessWidget::new(),
        Box::new(HostPageSurface::new(&output)),
    )
    .with_context(|| format!("failed to open projects of {owner}"))?;
    workspace
        .open_project(&id)
        .with_context(|| format!("failed to open project {id}"))?;

    let loaded = workspace.session().compositor().last_loaded();
    workspace
        .finish()
        .with_context(|| format!("failed to close project {id}"))?;
    if loaded.is_none() {
        bail!("project {id} has no markup to preview");
    }
    println!("Preview of project {id} written to {}", output.display());
    Ok(())
}

fn known_project(store: &mut ProjectStore, owner: &str, raw: &str) -> Result<ProjectId> {
    let projects = store
        .list(owner)
        .with_context(|| format!("failed to load projects of {owner}"))?;
    projects
        .into_iter()
        .find(|project| project.id.as_str() == raw)
        .map(|project| project.id)
        .ok_or_else(|| anyhow!("project '{raw}' not found for {owner}"))
}

fn parse_language(value: &str) -> Result<SourceLanguage, String> {
    SourceLanguage::parse(value).ok_or_else(|| format!("unknown language '{value}'"))
}

fn is_same_file(left: &Path, right: &Path) -> bool {
    match (left.canonicalize(), right.canonicalize()) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

fn resolve_input_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("determine current directory")?
            .join(path))
    }
}
