//! CLI subcommands: init, validate, list, synth, diff.

use crate::assets::{self, AssetManifest};
use crate::core::builder::StackBuilder;
use crate::core::config::{StackConfig, DEFAULT_ENV_FILE, FUNCTION_CONTEXT_DIR, STATIC_DIR};
use crate::core::naming::DatedNaming;
use crate::core::synth::{self, Format, Template};
use crate::core::types::{ConstructId, ResourceSpec};
use crate::core::{planner, state, validate, Stack};
use crate::error::{Error, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new project (.env, src/, static/)
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Declare the stack and check it without writing anything
    Validate {
        #[command(flatten)]
        stack: StackArgs,
    },

    /// List declared constructs in dependency order
    List {
        #[command(flatten)]
        stack: StackArgs,
    },

    /// Write the CloudFormation template and asset manifest
    Synth {
        #[command(flatten)]
        stack: StackArgs,

        /// Output directory
        #[arg(short, long, default_value = "cdk.out")]
        out: PathBuf,

        /// Template format
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },

    /// Show what changed since the last synth
    Diff {
        #[command(flatten)]
        stack: StackArgs,

        /// Output directory holding the previous synthesis
        #[arg(short, long, default_value = "cdk.out")]
        out: PathBuf,

        /// Exit non-zero when the template changed (for CI)
        #[arg(long)]
        fail_on_change: bool,
    },
}

/// Options shared by every command that declares the stack.
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Project directory holding src/ and static/
    #[arg(short = 'C', long, default_value = ".")]
    pub dir: PathBuf,

    /// Environment file (default: <dir>/.env)
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Naming date, YYYY-MM-DD (default: today, UTC)
    #[arg(long)]
    pub date: Option<String>,

    /// Let the function call identity-provider admin actions
    #[arg(long)]
    pub grant_identity_admin: bool,
}

impl StackArgs {
    fn env_file(&self) -> PathBuf {
        self.env_file
            .clone()
            .unwrap_or_else(|| self.dir.join(DEFAULT_ENV_FILE))
    }
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { stack } => cmd_validate(&stack),
        Commands::List { stack } => cmd_list(&stack),
        Commands::Synth { stack, out, format } => cmd_synth(&stack, &out, format),
        Commands::Diff {
            stack,
            out,
            fail_on_change,
        } => cmd_diff(&stack, &out, fail_on_change),
    }
}

fn cmd_init(path: &Path) -> Result<()> {
    let env_path = path.join(DEFAULT_ENV_FILE);
    if env_path.exists() {
        return Err(Error::AlreadyExists(env_path));
    }

    let context = path.join(FUNCTION_CONTEXT_DIR);
    let static_dir = path.join(STATIC_DIR);
    std::fs::create_dir_all(&context).map_err(io_err(&context))?;
    std::fs::create_dir_all(&static_dir).map_err(io_err(&static_dir))?;

    let template = r#"# Stack identifier; every construct id is derived from it.
CONSTRUCT_ID=Django
# Run the function on arm64 (only the value "true" enables it).
IS_ARM64=true
"#;
    std::fs::write(&env_path, template).map_err(io_err(&env_path))?;

    println!("Initialized project at {}", path.display());
    println!("  Created: {}", env_path.display());
    println!("  Created: {}/", context.display());
    println!("  Created: {}/", static_dir.display());
    Ok(())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> Error {
    let path = path.to_path_buf();
    move |source| Error::Io { path, source }
}

fn cmd_validate(args: &StackArgs) -> Result<()> {
    let stack = load_stack(args)?;
    println!(
        "OK: {} ({} constructs, {} references)",
        stack.name(),
        stack.len(),
        stack.references().len()
    );
    Ok(())
}

fn cmd_list(args: &StackArgs) -> Result<()> {
    let stack = load_stack(args)?;
    println!("Stack: {}", stack.name());
    for id in stack.execution_order()? {
        let Some(decl) = stack.get(&id) else {
            continue;
        };
        let physical = match &decl.spec {
            ResourceSpec::Bucket(b) => b.bucket_name.as_str(),
            ResourceSpec::Function(f) => f.function_name.as_str(),
            ResourceSpec::FrontDoor(fd) => fd.api_name.as_str(),
            _ => "-",
        };
        println!(
            "  {:<24} {:<14} {:<28} {}",
            decl.path,
            decl.kind().to_string(),
            decl.logical_id,
            physical
        );
    }
    Ok(())
}

fn cmd_synth(args: &StackArgs, out: &Path, format: Format) -> Result<()> {
    let stack = load_stack(args)?;
    let (template, assets) = synthesize(&stack)?;

    let template_path = state::save_template(out, stack.name(), &template, format)?;
    let manifest_path = state::save_manifest(out, &AssetManifest::new(stack.name(), &assets))?;

    println!(
        "Synthesized {} ({} resources, {} assets)",
        stack.name(),
        template.resources.len(),
        assets.len()
    );
    println!("  Template: {}", template_path.display());
    println!("  Assets:   {}", manifest_path.display());
    Ok(())
}

fn cmd_diff(args: &StackArgs, out: &Path, fail_on_change: bool) -> Result<()> {
    let stack = load_stack(args)?;
    let (template, _) = synthesize(&stack)?;
    let previous = state::load_template(out, stack.name())?;
    if previous.is_none() {
        println!("No previous synthesis in {}.", out.display());
    }

    let changes = planner::diff(stack.name(), previous.as_ref(), &template);
    print_changes(&changes);

    if fail_on_change && changes.has_changes() {
        return Err(Error::Changed(
            changes.to_create + changes.to_update + changes.to_destroy,
        ));
    }
    Ok(())
}

/// Load configuration, declare the stack, and validate it.
fn load_stack(args: &StackArgs) -> Result<Stack> {
    let config = StackConfig::load(&args.env_file(), &args.dir)?;
    let naming = match &args.date {
        Some(d) => DatedNaming::new(parse_date(d)?),
        None => DatedNaming::today(),
    };

    let mut builder = StackBuilder::new(ConstructId::new(&config.construct_id)?, naming);
    let handles = builder.build_default(&config)?;
    if args.grant_identity_admin {
        builder.grant_identity_admin(&handles.function)?;
    }
    let stack = builder.finish();

    let errors = validate::validate_stack(&stack);
    if errors.is_empty() {
        return Ok(stack);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(Error::Validation(errors.len()))
}

fn synthesize(stack: &Stack) -> Result<(Template, IndexMap<String, assets::Asset>)> {
    let assets = assets::stage_assets(stack)?;
    let template = synth::synthesize(stack, &assets)?;
    Ok((template, assets))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| Error::InvalidDate(s.to_string()))
}

/// Display a change set to stdout.
fn print_changes(changes: &planner::ChangeSet) {
    println!(
        "Diffing: {} ({} resources)",
        changes.stack,
        changes.changes.len()
    );
    println!();
    for change in &changes.changes {
        println!("  {} {}", change.action.symbol(), change.description);
    }
    println!();
    println!("{}", changes.summary());
}
