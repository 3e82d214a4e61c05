use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use elevator_update::core::{
    auth::{AdminGate, Session, SessionMarker},
    config::{AppConfig, BackendMode},
    db::{Backend, LocalDb, NewProject, Project, ProjectType, ProjectUpdate, StepStatus},
    fallback::FallbackBackend,
    photos::{PhotoStore, UploadFile},
    projects::ProjectStore,
    remote::RemoteStore,
    sync::{RefreshOutcome, SnapshotClient, SnapshotSync, generate_export_snapshot},
    workflow::{StepId, WORKFLOW_STEPS},
};

#[derive(Parser)]
#[command(name = "elevator-update")]
#[command(about = "Track old-elevator modernization projects through the eight-step workflow")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, value_name = "FILE", default_value = "elevator-update.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the workflow step catalog
    Steps,
    /// List projects, newest first
    List {
        /// Only projects whose name or address contains this keyword
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one project with its steps and photos
    Show { id: String },
    /// Create a project with all eight steps pending
    Create {
        name: String,
        #[arg(long)]
        address: Option<String>,
        /// "lng,lat"
        #[arg(long)]
        coords: Option<String>,
        /// type1 | type2 | type3
        #[arg(long = "type")]
        project_type: Option<ProjectType>,
        #[arg(long)]
        elevators: Option<i64>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Edit descriptive fields; pass an empty string to clear one
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        coords: Option<String>,
        #[arg(long = "type")]
        project_type: Option<ProjectType>,
        #[arg(long)]
        elevators: Option<i64>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Set a step's status (pending | in-progress | completed)
    SetStep {
        id: String,
        step: u8,
        status: StepStatus,
    },
    /// Delete a project and all its photos
    Delete { id: String },
    /// List a project's photos, optionally for one step
    Photos {
        id: String,
        #[arg(long)]
        step: Option<u8>,
    },
    /// Attach a photo by URL
    AttachUrl { id: String, step: u8, url: String },
    /// Upload one or more image files, one after another
    AttachFile {
        id: String,
        step: u8,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete one photo
    RemovePhoto { photo_id: String },
    /// Write the dataset as a publishable snapshot
    Export {
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace the local dataset with the published snapshot
    Refresh,
    /// Log in as an admin role
    Login {
        role: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Whoami,
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

struct App {
    config: AppConfig,
    gate: AdminGate,
    marker: SessionMarker,
    session: Session,
    sync: Option<SnapshotSync>,
}

fn print_project_line(project: &Project) {
    println!(
        "{}  {:>3}%  {:<11}  {}  {}",
        project.id,
        project.progress(),
        format!("{:?}", project.badge()),
        project.project_type,
        project.name
    );
}

fn print_project(project: &Project) {
    println!("{} ({})", project.name, project.id);
    if let Some(address) = &project.address {
        println!("  address:   {address}");
    }
    if let Some(coords) = &project.coords {
        println!("  coords:    {coords}");
    }
    println!("  type:      {}", project.project_type);
    println!("  elevators: {}", project.elevator_count);
    if let Some(note) = &project.note {
        println!("  note:      {note}");
    }
    println!(
        "  progress:  {}% ({}/{} steps)",
        project.progress(),
        project.completed_steps(),
        WORKFLOW_STEPS.len()
    );
    for step_id in StepId::all() {
        let state = project.step_state(step_id);
        println!(
            "  [{}] {:<11} {} ({} photos)",
            step_id,
            state.status,
            step_id.definition().title,
            state.photos.len()
        );
    }
}

async fn run<B: Backend>(backend: Arc<B>, mut app: App, command: Command) -> anyhow::Result<()> {
    backend.init().await.context("Failed to initialize backend")?;
    let photos = PhotoStore::new(Arc::clone(&backend), app.config.max_upload_bytes);
    let projects = ProjectStore::new(
        Arc::clone(&backend),
        photos.clone(),
        app.config.default_project_type,
    );
    debug!(backend = backend.backend_tag(), "store ready");

    match command {
        Command::Steps => {
            for step in WORKFLOW_STEPS.iter() {
                println!("{}. {}\n   {}", step.id, step.title, step.description);
            }
        }
        Command::List { search } => {
            let list = match search {
                Some(keyword) => projects.search(&keyword).await?,
                None => projects.list().await?,
            };
            if list.is_empty() {
                println!("No projects.");
            }
            for project in &list {
                print_project_line(project);
            }
        }
        Command::Show { id } => print_project(&projects.get(&id).await?),
        Command::Create {
            name,
            address,
            coords,
            project_type,
            elevators,
            note,
        } => {
            let fields = NewProject {
                name,
                address,
                coords,
                project_type,
                elevator_count: elevators,
                note,
            };
            let project = projects.create(&app.session, fields).await?;
            println!("{}", project.id);
        }
        Command::Edit {
            id,
            name,
            address,
            coords,
            project_type,
            elevators,
            note,
        } => {
            let update = ProjectUpdate {
                name,
                address: address.map(Some),
                coords: coords.map(Some),
                project_type,
                elevator_count: elevators,
                note: note.map(Some),
            };
            print_project(&projects.update(&app.session, &id, update).await?);
        }
        Command::SetStep { id, step, status } => {
            let project = projects
                .set_step_status(&app.session, &id, StepId::new(step)?, status)
                .await?;
            println!("progress: {}%", project.progress());
        }
        Command::Delete { id } => projects.remove(&app.session, &id).await?,
        Command::Photos { id, step } => {
            projects.get(&id).await?;
            let list = match step {
                Some(step) => photos.list_for_step(&id, StepId::new(step)?).await?,
                None => photos.list_for_project(&id).await?,
            };
            for photo in &list {
                let url = if photo.is_inline() {
                    format!("<inline {} bytes>", photo.url.len())
                } else {
                    photo.url.clone()
                };
                println!("{}  step {}  {}  {}", photo.id, photo.step_id, photo.upload_time, url);
            }
        }
        Command::AttachUrl { id, step, url } => {
            let photo = photos
                .attach_from_url(&app.session, &id, StepId::new(step)?, &url)
                .await?;
            println!("{}", photo.id);
        }
        Command::AttachFile { id, step, files } => {
            let step = StepId::new(step)?;
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                uploads.push(
                    UploadFile::from_path(path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                );
            }
            let stored = photos
                .attach_files(&app.session, &id, step, &uploads, |index, pct| {
                    eprintln!("{}: {pct}%", uploads[index].file_name);
                })
                .await?;
            for photo in &stored {
                println!("{}", photo.id);
            }
        }
        Command::RemovePhoto { photo_id } => photos.remove(&app.session, &photo_id).await?,
        Command::Export { out } => {
            let blob = generate_export_snapshot(&projects.list().await?)?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, blob)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!(
                        "Snapshot written to {}. Publish it at the configured snapshot URL so other devices can refresh.",
                        path.display()
                    );
                }
                None => println!("{blob}"),
            }
        }
        Command::Refresh => {
            let Some(sync) = app.sync.as_ref() else {
                bail!("refresh requires backend.mode = \"snapshot\"");
            };
            match sync.refresh().await? {
                RefreshOutcome::Replaced { projects } => {
                    println!("Loaded {projects} projects from the published snapshot.");
                }
                RefreshOutcome::Empty => println!("No snapshot published; dataset is empty."),
                RefreshOutcome::Fallback { reason } => {
                    println!("Snapshot unavailable ({reason}); showing local data.");
                }
            }
        }
        Command::Login { role, password } => {
            app.session = app.gate.login(&role, &password)?;
            app.marker.save(&app.session)?;
            println!("Logged in as {role}.");
        }
        Command::Logout => {
            app.session.logout();
            app.marker.clear()?;
            println!("Logged out.");
        }
        Command::Whoami => match app.session.current_role() {
            Some(role) => println!("{role}"),
            None => println!("visitor"),
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_json);

    let config = AppConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    let gate = AdminGate::new(config.admin.roles.clone());
    let marker = SessionMarker::new(&config.session_file);
    let session = marker.load(&gate)?;

    let local = LocalDb::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    let timeout = Duration::from_secs(config.backend.http_timeout_secs);

    let mode = config.backend.mode;
    let mut app = App {
        config,
        gate,
        marker,
        session,
        sync: None,
    };

    let result = match mode {
        BackendMode::Local => run(Arc::new(local.clone()), app, args.command).await,
        BackendMode::Snapshot => {
            let url = app
                .config
                .backend
                .snapshot_url
                .as_deref()
                .context("backend.snapshot_url is not set")?;
            app.sync = Some(SnapshotSync::new(
                local.clone(),
                SnapshotClient::new(url, timeout)?,
            ));
            run(Arc::new(local.clone()), app, args.command).await
        }
        BackendMode::Remote => {
            let url = app
                .config
                .backend
                .remote_url
                .as_deref()
                .context("backend.remote_url is not set")?;
            let remote = RemoteStore::new(url, app.config.backend.remote_token.clone(), timeout)?;
            let backend = FallbackBackend::new(remote, local.clone());
            run(Arc::new(backend), app, args.command).await
        }
    };

    local.close().await.context("Failed to close database")?;
    result
}
