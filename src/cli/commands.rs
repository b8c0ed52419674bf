//! Command dispatch

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::generate;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::application::services::BundleSource;
use crate::application::{ApplicationError, IoResultExt};
use crate::cli::args::{Cli, Commands, ConfigCommands, MapArgs, SourceArgs, TimingArg};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{LayerArena, ValidationError};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

pub fn execute(cli: &Cli) -> CliResult<()> {
    let project_dir = project_dir(cli)?;
    debug!("project dir: {}", project_dir.display());

    match &cli.command {
        Some(Commands::Validate { source }) => cmd_validate(&project_dir, source),
        Some(Commands::Apply {
            source,
            filter,
            dry_run,
            output,
        }) => cmd_apply(&project_dir, source, *filter, *dry_run, output.as_deref()),
        Some(Commands::Tree { map }) => cmd_tree(&project_dir, map),
        Some(Commands::Classify { map }) => cmd_classify(&project_dir, map),
        Some(Commands::Config { command }) => cmd_config(&project_dir, command),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        None => Err(CliError::Usage(
            "no command given, run with --help for usage".into(),
        )),
    }
}

fn project_dir(cli: &Cli) -> CliResult<PathBuf> {
    match &cli.project_dir {
        Some(dir) if dir.is_dir() => Ok(dir.clone()),
        Some(dir) => Err(CliError::InvalidArgs(format!(
            "project directory does not exist: {}",
            dir.display()
        ))),
        None => std::env::current_dir()
            .map_err(|e| CliError::Infra(InfraError::io("current directory", e))),
    }
}

/// Relative paths are taken from the project directory.
fn in_project(project_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}

fn build_container(
    project_dir: &Path,
    source: Option<&SourceArgs>,
    filter: Option<TimingArg>,
) -> CliResult<ServiceContainer> {
    let mut settings = Settings::load(Some(project_dir))?;
    if let Some(profile) = source.and_then(|s| s.profile) {
        settings.validation_profile = profile.into();
    }
    if let Some(timing) = filter {
        settings.filter_timing = timing.into();
    }
    Ok(ServiceContainer::new(settings))
}

fn map_file(
    container: &ServiceContainer,
    project_dir: &Path,
    args: &MapArgs,
) -> CliResult<PathBuf> {
    args.map
        .clone()
        .or_else(|| container.settings.map_file.clone())
        .map(|p| in_project(project_dir, &p))
        .ok_or_else(|| CliError::Usage("no map document: pass --map or set map_file".into()))
}

fn instructions_file(
    container: &ServiceContainer,
    project_dir: &Path,
    args: &SourceArgs,
) -> CliResult<PathBuf> {
    args.instructions
        .clone()
        .or_else(|| container.settings.instructions_file.clone())
        .map(|p| in_project(project_dir, &p))
        .ok_or_else(|| {
            CliError::Usage("no instructions: pass --instructions or set instructions_file".into())
        })
}

fn bundles(project_dir: &Path, args: &MapArgs) -> Vec<BundleSource> {
    args.bundles
        .iter()
        .map(|b| BundleSource {
            id: b.id.clone(),
            path: in_project(project_dir, &b.path),
        })
        .collect()
}

fn load_tree(
    container: &ServiceContainer,
    project_dir: &Path,
    args: &MapArgs,
) -> CliResult<(PathBuf, LayerArena)> {
    let map = map_file(container, project_dir, args)?;
    let doc = container
        .documents()
        .compose_map(&map, &bundles(project_dir, args))?;
    let tree = LayerArena::from_document(&doc)
        .map_err(|e| ApplicationError::unavailable("layer tree", e))?;
    Ok((map, tree))
}

fn print_problems(errors: &[ValidationError]) {
    for problem in errors {
        if problem.is_warning() {
            output::warning(problem);
        } else {
            output::failure(problem);
        }
    }
}

#[instrument(level = "debug", skip(source))]
fn cmd_validate(project_dir: &Path, source: &SourceArgs) -> CliResult<()> {
    let container = build_container(project_dir, Some(source), None)?;
    let (_, tree) = load_tree(&container, project_dir, &source.map)?;
    let path = instructions_file(&container, project_dir, source)?;
    let instructions = container.documents().load_instructions(&path)?;

    let sorting = container.sorting();
    let result = sorting.validate(&instructions, &tree);
    output::header(&format!(
        "{} ({} profile)",
        path.display(),
        sorting.validator().profile()
    ));
    if result.valid {
        output::success(&format!(
            "{} instruction(s) valid against {} layer(s)",
            result.instructions.len(),
            tree.len()
        ));
        return Ok(());
    }
    print_problems(&result.errors);
    Err(ApplicationError::ValidationFailed {
        errors: result.errors,
    }
    .into())
}

#[instrument(level = "debug", skip(source))]
fn cmd_apply(
    project_dir: &Path,
    source: &SourceArgs,
    filter: Option<TimingArg>,
    dry_run: bool,
    output_path: Option<&Path>,
) -> CliResult<()> {
    let container = build_container(project_dir, Some(source), filter)?;
    let map = map_file(&container, project_dir, &source.map)?;
    let path = instructions_file(&container, project_dir, source)?;
    let instructions = container.documents().load_instructions(&path)?;
    let view = container.map_view(map.clone(), bundles(project_dir, &source.map));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| InfraError::io("start runtime", e))?;
    let outcome = runtime.block_on(container.sorting().run(&view, &instructions));
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(ApplicationError::ValidationFailed { errors }) => {
            print_problems(&errors);
            return Err(ApplicationError::ValidationFailed { errors }.into());
        }
        Err(e) => return Err(e.into()),
    };

    let report = &outcome.report;
    output::detail(&format!("roots: {}", report.root_ids.iter().join(", ")));
    if !report.created.is_empty() {
        output::detail(&format!("created: {}", report.created.iter().join(", ")));
    }
    if !report.pruned.is_empty() {
        output::detail(&format!("pruned: {}", report.pruned.iter().join(", ")));
    }

    if dry_run {
        output::info(&outcome.tree.to_tree_string(&map.display().to_string()));
        return Ok(());
    }

    let target = output_path
        .map(|p| in_project(project_dir, p))
        .unwrap_or(map);
    container
        .documents()
        .save_map(&target, &outcome.tree.to_document())?;
    output::action("Wrote", &target.display());
    Ok(())
}

fn cmd_tree(project_dir: &Path, args: &MapArgs) -> CliResult<()> {
    let container = build_container(project_dir, None, None)?;
    let (map, tree) = load_tree(&container, project_dir, args)?;
    output::info(&tree.to_tree_string(&map.display().to_string()));
    Ok(())
}

fn cmd_classify(project_dir: &Path, args: &MapArgs) -> CliResult<()> {
    let container = build_container(project_dir, None, None)?;
    let (_, tree) = load_tree(&container, project_dir, args)?;
    let filter = container.sorting().domain_filter();
    if !filter.is_active() {
        output::warning("no domain bundles configured ([domain.show_remaining])");
        return Ok(());
    }
    let show_remaining = &container.settings.domain.show_remaining;
    for (bundle, ids) in filter.classify(&tree) {
        let keep = show_remaining.get(&bundle).copied().unwrap_or(false);
        output::header(&format!("{bundle} (show remaining: {keep})"));
        if ids.is_empty() {
            output::detail("-");
        }
        for id in ids {
            output::detail(&id);
        }
    }
    Ok(())
}

fn cmd_config(project_dir: &Path, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(Some(project_dir))?;
            output::info(&settings.to_toml()?);
            Ok(())
        }
        ConfigCommands::Path => {
            let local = local_config_path(project_dir);
            match global_config_path() {
                Some(global) => {
                    output::detail(&format!("global: {}{}", global.display(), exists_mark(&global)))
                }
                None => output::detail("global: (no config directory)"),
            }
            output::detail(&format!("local:  {}{}", local.display(), exists_mark(&local)));
            Ok(())
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                global_config_path().ok_or_else(|| {
                    ApplicationError::Config {
                        message: "cannot determine global config directory".into(),
                    }
                })?
            } else {
                local_config_path(project_dir)
            };
            if path.exists() {
                return Err(CliError::Usage(format!(
                    "config already exists: {}",
                    path.display()
                )));
            }
            let container = ServiceContainer::new(Settings::default());
            container
                .fs
                .ensure_parent(&path)
                .with_path_context("create config directory", &path)?;
            container
                .fs
                .write(&path, &Settings::template())
                .with_path_context("write config", &path)?;
            output::action("Created", &path.display());
            Ok(())
        }
    }
}

fn exists_mark(path: &Path) -> &'static str {
    if path.exists() {
        ""
    } else {
        " (missing)"
    }
}
