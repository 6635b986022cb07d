// Clipsmith CLI binary

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use clipsmith::clips::{load_batch_file, BatchItemOutcome, ClipExtractionService};
use clipsmith::compile::CompilationService;
use clipsmith::db::schema::{self, ArtifactStatus};
use clipsmith::jobs::{self, JobStatus};
use clipsmith::storyline::{GeminiGenerator, Storyline, StorylineAssembler};
use clipsmith::transcripts::{self, build_context, RankOptions, TranscriptContextRanker};
use clipsmith::{media, tools, videos, PipelineConfig, PipelineContext};

#[derive(Parser)]
#[command(name = "clipsmith")]
#[command(about = "Clip, compile and assemble storylines from a transcribed video catalog", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the per-user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog database (defaults to <data_dir>/clipsmith.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create directories and the catalog, and write a default config
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Source videos
    Video {
        #[command(subcommand)]
        action: VideoAction,
    },

    /// Transcripts produced by the transcription service
    Transcript {
        #[command(subcommand)]
        action: TranscriptAction,
    },

    /// Clips cut from source videos
    Clip {
        #[command(subcommand)]
        action: ClipAction,
    },

    /// Compilations of completed clips
    Compile {
        #[command(subcommand)]
        action: CompileAction,
    },

    /// AI-assisted storylines
    Storyline {
        #[command(subcommand)]
        action: StorylineAction,
    },

    /// Rank transcript excerpts for a question
    Context {
        query: String,
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Seed for the fallback sample
        #[arg(long)]
        seed: Option<u64>,
        /// Print excerpts as JSON instead of a context block
        #[arg(long)]
        json: bool,
    },

    /// List processing jobs
    Jobs {
        /// Filter by status (pending, running, completed, failed)
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "50")]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum VideoAction {
    /// Probe, upload and catalog a local file
    Add {
        path: PathBuf,
        #[arg(long)]
        title: Option<String>,
        /// Year the footage was recorded
        #[arg(long)]
        year: Option<i32>,
    },
    List {
        #[arg(long, default_value = "100")]
        limit: i64,
    },
    Show { id: i64 },
}

#[derive(Subcommand)]
enum TranscriptAction {
    /// Import `{language, status?, segments: [...]}` for a video
    Import { video_id: i64, file: PathBuf },
    List {
        #[arg(long)]
        video: Option<i64>,
    },
}

#[derive(Subcommand)]
enum ClipAction {
    /// Cut one clip; times are in seconds
    Create {
        video_id: i64,
        start: f64,
        end: f64,
        name: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        by: Option<String>,
    },
    /// Cut every clip listed in a JSON file from one video
    Batch {
        video_id: i64,
        file: PathBuf,
        #[arg(long)]
        by: Option<String>,
    },
    List {
        #[arg(long)]
        video: Option<i64>,
        /// pending, processing, completed or error
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "100")]
        limit: i64,
    },
    Show { id: i64 },
    Delete {
        id: i64,
        /// Keep the stored object, only remove the catalog row
        #[arg(long)]
        keep_object: bool,
    },
    /// Print a time-limited download URL
    Url {
        id: i64,
        /// Expiry in seconds
        #[arg(long)]
        expires: Option<u64>,
    },
}

#[derive(Subcommand)]
enum CompileAction {
    /// Concatenate completed clips in the given order
    Create {
        title: String,
        #[arg(required = true)]
        clip_ids: Vec<i64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        by: Option<String>,
        /// Stream-copy instead of conforming resolution and frame rate
        #[arg(long)]
        no_normalize: bool,
    },
    List {
        #[arg(long, default_value = "100")]
        limit: i64,
    },
    Show { id: i64 },
    /// Clips of a compilation in playback order
    Clips { id: i64 },
    Delete {
        id: i64,
        #[arg(long)]
        keep_object: bool,
    },
}

#[derive(Subcommand)]
enum StorylineAction {
    /// Propose storylines for the current transcripts (cached per corpus)
    Generate {
        #[arg(long)]
        force: bool,
    },
    List,
    Preview { id: String },
    /// Render a storyline to the output directory
    Create {
        id: String,
        #[arg(long)]
        name: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = PipelineConfig::load(cli.config.as_deref())?;
    if let Commands::Init { force } = cli.command {
        return cmd_init(config, cli.config.as_deref(), cli.db.as_deref(), force);
    }

    let ctx = open_context(config, cli.db.as_deref())?;
    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Video { action } => cmd_video(&ctx, action),
        Commands::Transcript { action } => cmd_transcript(&ctx, action),
        Commands::Clip { action } => cmd_clip(&ctx, action),
        Commands::Compile { action } => cmd_compile(&ctx, action),
        Commands::Storyline { action } => cmd_storyline(&ctx, action),
        Commands::Context { query, limit, seed, json } => cmd_context(&ctx, &query, limit, seed, json),
        Commands::Jobs { status, limit } => cmd_jobs(&ctx, status, limit),
    }
}

fn open_context(config: PipelineConfig, db: Option<&Path>) -> Result<PipelineContext> {
    let ctx = match db {
        Some(path) => PipelineContext::open_with_db(config, path)?,
        None => PipelineContext::open(config)?,
    };
    Ok(ctx)
}

fn cmd_init(config: PipelineConfig, config_path: Option<&Path>, db: Option<&Path>, force: bool) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .or_else(PipelineConfig::default_path)
        .context("No config directory available; pass --config")?;

    if path.exists() && !force {
        println!("Config exists at {} (use --force to overwrite)", path.display());
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
        println!("Wrote config to {}", path.display());
    }

    let data_dir = config.data_dir.clone();
    let work_dir = config.work_dir.clone();
    let output_dir = config.output_dir.clone();
    let ctx = open_context(config, db)?;

    println!("Catalog ready (bucket '{}')", ctx.store.bucket());
    println!("  Data:    {}", data_dir.display());
    println!("  Work:    {}", work_dir.display());
    println!("  Output:  {}", output_dir.display());
    for tool in ["ffmpeg", "ffprobe"] {
        if !tools::is_tool_available(tool) {
            println!("  Warning: {} not found (set CLIPSMITH_{}_PATH)", tool, tool.to_uppercase());
        }
    }
    Ok(())
}

fn cmd_video(ctx: &PipelineContext, action: VideoAction) -> Result<()> {
    match action {
        VideoAction::Add { path, title, year } => {
            let id = videos::register_video(ctx, &path, title.as_deref(), year)?;
            println!("Added video {}", id);
        }
        VideoAction::List { limit } => {
            let list = schema::list_videos(&ctx.conn, limit)?;
            if list.is_empty() {
                println!("No videos. Use 'clipsmith video add <path>' to add one.");
                return Ok(());
            }
            println!("{:>5}  {:>10}  {:>6}  {:>9}  {}", "ID", "Duration", "Year", "Status", "Title");
            println!("{}", "-".repeat(60));
            for v in list {
                println!(
                    "{:>5}  {:>10}  {:>6}  {:>9}  {}",
                    v.id,
                    v.duration_seconds.map(format_duration).unwrap_or_else(|| "-".into()),
                    v.event_year.map(|y| y.to_string()).unwrap_or_else(|| "-".into()),
                    v.status,
                    v.title
                );
            }
        }
        VideoAction::Show { id } => {
            let v = videos::get_video(ctx, id)?;
            println!("Video #{}", v.id);
            println!();
            println!("Title:       {}", v.title);
            println!("File:        {}", v.filename);
            if let Some(d) = v.duration_seconds {
                println!("Duration:    {}", format_duration(d));
            }
            if let (Some(w), Some(h)) = (v.width, v.height) {
                println!("Resolution:  {}x{}", w, h);
            }
            if let Some(y) = v.event_year {
                println!("Year:        {}", y);
            }
            println!("Key:         {}", v.storage_key.as_deref().unwrap_or("-"));
            println!("Created:     {}", v.created_at);

            let list = transcripts::list_transcripts(&ctx.conn, Some(id))?;
            if !list.is_empty() {
                println!();
                println!("Transcripts:");
                for t in list {
                    println!("  #{} {} ({} words)", t.id, t.status, t.word_count);
                }
            }
        }
    }
    Ok(())
}

fn cmd_transcript(ctx: &PipelineContext, action: TranscriptAction) -> Result<()> {
    match action {
        TranscriptAction::Import { video_id, file } => {
            let import = transcripts::load_transcript_file(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let id = transcripts::import_transcript(&ctx.conn, video_id, &import)?;
            println!("Imported transcript {} for video {}", id, video_id);
        }
        TranscriptAction::List { video } => {
            let list = transcripts::list_transcripts(&ctx.conn, video)?;
            if list.is_empty() {
                println!("No transcripts found.");
                return Ok(());
            }
            println!("{:>5}  {:>6}  {:>10}  {:>6}  {}", "ID", "Video", "Status", "Lang", "Words");
            println!("{}", "-".repeat(45));
            for t in list {
                println!(
                    "{:>5}  {:>6}  {:>10}  {:>6}  {}",
                    t.id,
                    t.video_id,
                    t.status,
                    t.language.as_deref().unwrap_or("-"),
                    t.word_count
                );
            }
        }
    }
    Ok(())
}

fn cmd_clip(ctx: &PipelineContext, action: ClipAction) -> Result<()> {
    let service = ClipExtractionService::new(ctx);
    match action {
        ClipAction::Create { video_id, start, end, name, notes, by } => {
            let id = service.create_clip(video_id, start, end, &name, notes.as_deref(), by.as_deref())?;
            let clip = service.get_clip(id)?;
            println!(
                "Created clip {} ({}, {})",
                id,
                format_duration(clip.duration()),
                clip.file_size_bytes.map(format_size).unwrap_or_default()
            );
        }
        ClipAction::Batch { video_id, file, by } => {
            let requests = load_batch_file(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let outcomes = service.create_clips_batch(video_id, &requests, by.as_deref())?;
            for outcome in &outcomes {
                match outcome {
                    BatchItemOutcome::Created { index, clip_id } => println!("  [{}] created clip {}", index, clip_id),
                    BatchItemOutcome::Rejected { index, clip_name, error } => {
                        println!("  [{}] rejected '{}': {}", index, clip_name, error)
                    }
                    BatchItemOutcome::Failed { index, clip_id, error } => {
                        println!("  [{}] clip {} failed: {}", index, clip_id, error)
                    }
                }
            }
            let created = outcomes.iter().filter(|o| o.is_created()).count();
            println!("Created {} of {} clips", created, outcomes.len());
        }
        ClipAction::List { video, status, limit } => {
            let status = status.map(|s| s.parse::<ArtifactStatus>()).transpose()?;
            let list = service.list_clips(video, status, limit)?;
            if list.is_empty() {
                println!("No clips found.");
                return Ok(());
            }
            println!("{:>5}  {:>6}  {:>10}  {:>10}  {}", "ID", "Video", "Duration", "Status", "Name");
            println!("{}", "-".repeat(55));
            for c in list {
                println!(
                    "{:>5}  {:>6}  {:>10}  {:>10}  {}",
                    c.id,
                    c.video_id,
                    format_duration(c.duration()),
                    c.status,
                    c.name
                );
            }
        }
        ClipAction::Show { id } => {
            let c = service.get_clip(id)?;
            println!("Clip #{}", c.id);
            println!();
            println!("Name:        {}", c.name);
            println!("Video:       {}", c.video_id);
            println!("Range:       {:.3}s - {:.3}s ({})", c.start_time, c.end_time, format_duration(c.duration()));
            println!("Status:      {}", c.status);
            if let Some(key) = &c.storage_key {
                println!("Key:         {}", key);
            }
            if let Some(size) = c.file_size_bytes {
                println!("Size:        {}", format_size(size));
            }
            if let Some(notes) = &c.notes {
                println!("Notes:       {}", notes);
            }
            if let Some(err) = &c.error_message {
                println!("Error:       {}", err);
            }
            println!("Created:     {}", c.created_at);
        }
        ClipAction::Delete { id, keep_object } => {
            service.delete_clip(id, !keep_object)?;
            println!("Deleted clip {}", id);
        }
        ClipAction::Url { id, expires } => {
            println!("{}", service.presign_clip(id, expires.map(Duration::from_secs))?);
        }
    }
    Ok(())
}

fn cmd_compile(ctx: &PipelineContext, action: CompileAction) -> Result<()> {
    let service = CompilationService::new(ctx);
    match action {
        CompileAction::Create { title, clip_ids, description, by, no_normalize } => {
            let id = service.compile(&title, &clip_ids, description.as_deref(), by.as_deref(), !no_normalize)?;
            let v = service.get_compiled_video(id)?;
            println!(
                "Compiled video {} ({}, {})",
                id,
                format_duration(v.total_duration_seconds),
                v.storage_key.as_deref().unwrap_or("-")
            );
        }
        CompileAction::List { limit } => {
            let list = service.list_compiled_videos(limit)?;
            if list.is_empty() {
                println!("No compiled videos.");
                return Ok(());
            }
            println!("{:>5}  {:>10}  {:>10}  {}", "ID", "Duration", "Status", "Title");
            println!("{}", "-".repeat(50));
            for v in list {
                println!(
                    "{:>5}  {:>10}  {:>10}  {}",
                    v.id,
                    format_duration(v.total_duration_seconds),
                    v.status,
                    v.title
                );
            }
        }
        CompileAction::Show { id } => {
            let v = service.get_compiled_video(id)?;
            println!("Compiled video #{}", v.id);
            println!();
            println!("Title:       {}", v.title);
            println!("Status:      {}", v.status);
            println!("Duration:    {}", format_duration(v.total_duration_seconds));
            println!("Normalized:  {}", v.normalized);
            if let (Some(w), Some(h)) = (v.width, v.height) {
                println!("Resolution:  {}x{}", w, h);
            }
            if let Some(key) = &v.storage_key {
                println!("Key:         {}", key);
            }
            if let Some(path) = &v.local_path {
                println!("Path:        {}", path);
            }
            if let Some(size) = v.file_size_bytes {
                println!("Size:        {}", format_size(size));
            }
            if let Some(desc) = &v.description {
                println!("Description: {}", desc);
            }
            if let Some(err) = &v.error_message {
                println!("Error:       {}", err);
            }
            println!("Created:     {}", v.created_at);
        }
        CompileAction::Clips { id } => {
            for (order, c) in service.get_clips_in_order(id)?.iter().enumerate() {
                println!("{:>3}. clip {} '{}' ({})", order + 1, c.id, c.name, format_duration(c.duration()));
            }
        }
        CompileAction::Delete { id, keep_object } => {
            service.delete_compiled_video(id, !keep_object)?;
            println!("Deleted compiled video {}", id);
        }
    }
    Ok(())
}

fn cmd_storyline(ctx: &PipelineContext, action: StorylineAction) -> Result<()> {
    match action {
        StorylineAction::Generate { force } => {
            let generator = GeminiGenerator::from_config(&ctx.config.ai)?;
            let assembler = StorylineAssembler::new(ctx).with_generator(&generator);
            let batch = assembler.generate(force)?;
            println!("{} storylines ({}, key {:.12})", batch.storylines.len(), batch.model, batch.cache_key);
            print_storylines(&batch.storylines);
        }
        StorylineAction::List => {
            let list = StorylineAssembler::new(ctx).list()?;
            if list.is_empty() {
                println!("No storylines. Use 'clipsmith storyline generate' first.");
                return Ok(());
            }
            print_storylines(&list);
        }
        StorylineAction::Preview { id } => {
            let s = StorylineAssembler::new(ctx).preview(&id)?;
            println!("{} ({})", s.title, format_duration(s.estimated_duration));
            println!();
            println!("{}", s.hook);
            println!("{}", s.why_compelling);
            println!();
            for (i, c) in s.clips.iter().enumerate() {
                println!(
                    "{:>3}. [{} @ {}-{}] {}",
                    i + 1,
                    c.video_title,
                    format_duration(c.start_time),
                    format_duration(c.end_time),
                    c.text
                );
            }
        }
        StorylineAction::Create { id, name } => {
            let path = StorylineAssembler::new(ctx).create_video(&id, name.as_deref())?;
            println!("Wrote {} ({})", path.display(), format_size(media::file_size(&path) as i64));
        }
    }
    Ok(())
}

fn print_storylines(storylines: &[Storyline]) {
    println!("{:>4}  {:>8}  {:>5}  {}", "ID", "Duration", "Clips", "Title");
    println!("{}", "-".repeat(50));
    for s in storylines {
        println!(
            "{:>4}  {:>8}  {:>5}  {}",
            s.id,
            format_duration(s.estimated_duration),
            s.clips.len(),
            s.title
        );
    }
}

fn cmd_context(ctx: &PipelineContext, query: &str, limit: usize, seed: Option<u64>, json: bool) -> Result<()> {
    let excerpts = TranscriptContextRanker::new(&ctx.conn).rank(query, RankOptions { limit, seed })?;
    if json {
        println!("{}", serde_json::to_string_pretty(&excerpts)?);
    } else {
        println!("{}", build_context(&excerpts));
    }
    Ok(())
}

fn cmd_jobs(ctx: &PipelineContext, status: Option<String>, limit: i64) -> Result<()> {
    let status = match status {
        Some(s) => Some(JobStatus::parse(&s).with_context(|| format!("Unknown job status '{}'", s))?),
        None => None,
    };
    let list = jobs::list_jobs(&ctx.conn, status, limit)?;
    if list.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    println!("{:>5}  {:>18}  {:>10}  {:>8}  {:>20}", "ID", "Type", "Status", "Progress", "Created");
    println!("{}", "-".repeat(70));
    for job in list {
        println!(
            "{:>5}  {:>18}  {:>10}  {:>7}%  {:>20}",
            job.id, job.job_type, job.status, job.progress, job.created_at
        );
        if job.status == JobStatus::Failed {
            if let Some(msg) = &job.message {
                println!("       {}", msg);
            }
        }
    }
    Ok(())
}

// --- Helper Functions ---

fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as i64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

fn format_size(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
