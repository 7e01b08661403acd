//! Argument parsing, command dispatch, and top-level error reporting.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use gitpw_config::{ConfigKey, GitConfigStore, Settings};
use gitpw_telemetry::{LoggingConfig, init_logging};
use tracing::{debug, error};

use crate::client::{AppContext, CliError, CliResult, DEFAULT_TIMEOUT_SECS};
use crate::commands::bundle::{
    handle_bundle_add, handle_bundle_apply, handle_bundle_create, handle_bundle_delete,
    handle_bundle_download, handle_bundle_list, handle_bundle_remove, handle_bundle_show,
    handle_bundle_update,
};
use crate::commands::patch::{
    handle_patch_apply, handle_patch_download, handle_patch_list, handle_patch_show,
    handle_patch_update,
};
use crate::commands::series::{
    handle_series_apply, handle_series_download, handle_series_list, handle_series_show,
};
use crate::git::Git;
use crate::output::OutputFormat;

/// Parses CLI arguments, executes the requested command, and reports any
/// failure. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let command_name = command_label(&cli.command);
    let settings = cli.global.settings(Settings::new(GitConfigStore::default()));
    let verbose = settings.debug();

    if let Err(err) = init_logging(&LoggingConfig::for_verbosity(verbose)) {
        eprintln!("warning: {err}");
    }

    let ctx = match AppContext::build_client(Duration::from_secs(cli.global.timeout)) {
        Ok(client) => AppContext::new(client, settings, Git::default()),
        Err(err) => {
            report(&err, verbose);
            return err.exit_code();
        }
    };

    debug!(command = command_name, "dispatching");
    match dispatch(cli.command, &ctx).await {
        Ok(()) => 0,
        Err(err) => {
            report(&err, verbose);
            err.exit_code()
        }
    }
}

fn report(err: &CliError, verbose: bool) {
    let message = err.display_message();
    let message = message.trim_end();
    if !message.is_empty() {
        error!("{message}");
    }
    if verbose || err.always_diagnose() {
        if let Some(detail) = err.diagnostic() {
            error!("{detail}");
        }
    }
}

async fn dispatch(command: Command, ctx: &AppContext) -> CliResult<()> {
    match command {
        Command::Patch(patch) => match patch {
            PatchCommand::Apply(args) => handle_patch_apply(ctx, args).await,
            PatchCommand::Download(args) => handle_patch_download(ctx, args).await,
            PatchCommand::List(args) => handle_patch_list(ctx, args).await,
            PatchCommand::Show(args) => handle_patch_show(ctx, args).await,
            PatchCommand::Update(args) => handle_patch_update(ctx, args).await,
        },
        Command::Series(series) => match series {
            SeriesCommand::Apply(args) => handle_series_apply(ctx, args).await,
            SeriesCommand::Download(args) => handle_series_download(ctx, args).await,
            SeriesCommand::List(args) => handle_series_list(ctx, args).await,
            SeriesCommand::Show(args) => handle_series_show(ctx, args).await,
        },
        Command::Bundle(bundle) => match bundle {
            BundleCommand::Apply(args) => handle_bundle_apply(ctx, args).await,
            BundleCommand::Download(args) => handle_bundle_download(ctx, args).await,
            BundleCommand::List(args) => handle_bundle_list(ctx, args).await,
            BundleCommand::Show(args) => handle_bundle_show(ctx, args).await,
            BundleCommand::Create(args) => handle_bundle_create(ctx, args).await,
            BundleCommand::Update(args) => handle_bundle_update(ctx, args).await,
            BundleCommand::Delete(args) => handle_bundle_delete(ctx, args).await,
            BundleCommand::Add(args) => handle_bundle_add(ctx, args).await,
            BundleCommand::Remove(args) => handle_bundle_remove(ctx, args).await,
        },
    }
}

#[derive(Parser)]
#[command(
    name = "git-pw",
    version,
    about = "Interact with a Patchwork instance from the command line"
)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) global: GlobalArgs,
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Connection and authentication options shared by every command.
#[derive(Args, Debug, Clone)]
pub(crate) struct GlobalArgs {
    #[arg(
        long,
        global = true,
        env = "PW_DEBUG",
        help = "Output more information about what's going on."
    )]
    pub(crate) debug: bool,
    #[arg(
        long,
        global = true,
        env = "PW_TOKEN",
        hide_env_values = true,
        help = "Authentication token. Defaults to the value of 'git config pw.token'."
    )]
    pub(crate) token: Option<String>,
    #[arg(
        long,
        global = true,
        env = "PW_USERNAME",
        help = "Authentication username. Defaults to the value of 'git config pw.username'."
    )]
    pub(crate) username: Option<String>,
    #[arg(
        long,
        global = true,
        env = "PW_PASSWORD",
        hide_env_values = true,
        help = "Authentication password. Defaults to the value of 'git config pw.password'."
    )]
    pub(crate) password: Option<String>,
    #[arg(
        long,
        global = true,
        env = "PW_SERVER",
        help = "Patchwork server address/URL. Defaults to the value of 'git config pw.server'."
    )]
    pub(crate) server: Option<String>,
    #[arg(
        long,
        global = true,
        env = "PW_PROJECT",
        help = "Patchwork project. Defaults to the value of 'git config pw.project'."
    )]
    pub(crate) project: Option<String>,
    #[arg(
        long,
        global = true,
        env = "PW_TIMEOUT",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        help = "Request timeout in seconds."
    )]
    pub(crate) timeout: u64,
}

impl GlobalArgs {
    /// Layer explicit flags and environment values over `settings`.
    pub(crate) fn settings(&self, settings: Settings) -> Settings {
        settings
            .with_override(ConfigKey::Debug, self.debug.then(|| "true".to_string()))
            .with_override(ConfigKey::Token, self.token.clone())
            .with_override(ConfigKey::Username, self.username.clone())
            .with_override(ConfigKey::Password, self.password.clone())
            .with_override(ConfigKey::Server, self.server.clone())
            .with_override(ConfigKey::Project, self.project.clone())
    }
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Interact with patches.
    #[command(subcommand)]
    Patch(PatchCommand),
    /// Interact with series.
    #[command(subcommand)]
    Series(SeriesCommand),
    /// Interact with bundles.
    #[command(subcommand)]
    Bundle(BundleCommand),
}

#[derive(Subcommand)]
pub(crate) enum PatchCommand {
    /// Apply a patch locally using 'git am'.
    Apply(PatchApplyArgs),
    /// Download a patch diff/mbox without applying it.
    Download(PatchDownloadArgs),
    /// List patches.
    List(PatchListArgs),
    /// Show information about a patch.
    Show(PatchShowArgs),
    /// Update a patch.
    Update(PatchUpdateArgs),
}

#[derive(Subcommand)]
pub(crate) enum SeriesCommand {
    /// Apply a series locally using 'git am'.
    Apply(SeriesApplyArgs),
    /// Download a series in mbox format without applying it.
    Download(SeriesDownloadArgs),
    /// List series.
    List(SeriesListArgs),
    /// Show information about a series.
    Show(SeriesShowArgs),
}

#[derive(Subcommand)]
pub(crate) enum BundleCommand {
    /// Apply a bundle locally using 'git am'.
    Apply(BundleApplyArgs),
    /// Download a bundle in mbox format without applying it.
    Download(BundleDownloadArgs),
    /// List bundles.
    List(BundleListArgs),
    /// Show information about a bundle.
    Show(BundleShowArgs),
    /// Create a bundle.
    Create(BundleCreateArgs),
    /// Update a bundle.
    Update(BundleUpdateArgs),
    /// Delete a bundle.
    Delete(BundleDeleteArgs),
    /// Add one or more patches to a bundle.
    Add(BundlePatchesArgs),
    /// Remove one or more patches from a bundle.
    Remove(BundlePatchesArgs),
}

/// Output format for detail views.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct FormatArgs {
    #[arg(
        long,
        short = 'f',
        value_enum,
        help = "Output format. Defaults to the value of 'git config pw.format' else 'table'."
    )]
    pub(crate) format: Option<OutputFormat>,
}

/// Output format and column selection for list views.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct ListOutputArgs {
    #[command(flatten)]
    pub(crate) format: FormatArgs,
    #[arg(
        long = "column",
        short = 'c',
        value_name = "COLUMN",
        help = "Output columns. Defaults to all columns."
    )]
    pub(crate) columns: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct PageArgs {
    #[arg(long, value_name = "LIMIT", help = "Maximum number of items to show.")]
    pub(crate) limit: Option<u32>,
    #[arg(
        long,
        value_name = "PAGE",
        help = "Page to retrieve items from. This is influenced by the size of LIMIT."
    )]
    pub(crate) page: Option<u32>,
}

/// `--deps`/`--no-deps` pair; dependencies are included by default.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct DepsArgs {
    #[arg(long, overrides_with = "no_deps", help = "Include dependencies (default).")]
    pub(crate) deps: bool,
    #[arg(long, overrides_with = "deps", help = "Apply the patch on its own.")]
    pub(crate) no_deps: bool,
}

impl DepsArgs {
    pub(crate) const fn enabled(&self) -> bool {
        !self.no_deps
    }
}

/// `--public`/`--private` pair.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct VisibilityArgs {
    #[arg(long, conflicts_with = "private", help = "Make the bundle public.")]
    pub(crate) public: bool,
    #[arg(long, help = "Make the bundle private.")]
    pub(crate) private: bool,
}

impl VisibilityArgs {
    pub(crate) const fn requested(&self) -> Option<bool> {
        if self.public {
            Some(true)
        } else if self.private {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct PatchApplyArgs {
    pub(crate) patch_id: u64,
    #[arg(
        long,
        value_name = "SERIES",
        help = "Series to include dependencies from. Defaults to latest."
    )]
    pub(crate) series: Option<u64>,
    #[command(flatten)]
    pub(crate) deps: DepsArgs,
    /// Extra arguments passed to 'git am'.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub(crate) args: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct PatchDownloadArgs {
    pub(crate) patch_id: u64,
    /// Output path, a directory, or '-' for stdout.
    pub(crate) output: Option<PathBuf>,
    #[arg(long, conflicts_with = "mbox", help = "Download the patch in diff format.")]
    pub(crate) diff: bool,
    #[arg(long, help = "Download the patch in mbox format (default).")]
    pub(crate) mbox: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct PatchListArgs {
    /// Show only patches whose name matches this text.
    pub(crate) name: Option<String>,
    #[arg(
        long = "state",
        value_name = "STATE",
        default_values = ["under-review", "new"],
        help = "Show only patches matching these states."
    )]
    pub(crate) states: Vec<String>,
    #[arg(
        long = "submitter",
        value_name = "SUBMITTER",
        help = "Show only patches by these submitters. Should be an email, name or ID."
    )]
    pub(crate) submitters: Vec<String>,
    #[arg(
        long = "delegate",
        value_name = "DELEGATE",
        help = "Show only patches with these delegates. Should be an email or username."
    )]
    pub(crate) delegates: Vec<String>,
    #[arg(
        long = "hash",
        value_name = "HASH",
        help = "Show only patches with these hashes."
    )]
    pub(crate) hashes: Vec<String>,
    #[arg(long, help = "Include patches that are archived.")]
    pub(crate) archived: bool,
    #[command(flatten)]
    pub(crate) page: PageArgs,
    #[arg(
        long,
        value_name = "FIELD",
        default_value = "-date",
        value_parser = ["id", "-id", "name", "-name", "date", "-date"],
        help = "Sort output on given field."
    )]
    pub(crate) sort: String,
    #[command(flatten)]
    pub(crate) output: ListOutputArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct PatchShowArgs {
    pub(crate) patch_id: u64,
    #[command(flatten)]
    pub(crate) format: FormatArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct PatchUpdateArgs {
    pub(crate) patch_id: u64,
    #[arg(long, value_name = "COMMIT_REF", help = "Set the patch commit reference hash.")]
    pub(crate) commit_ref: Option<String>,
    #[arg(
        long,
        value_name = "STATE",
        help = "Set the patch state. The available states are instance dependent."
    )]
    pub(crate) state: Option<String>,
    #[arg(
        long,
        value_name = "DELEGATE",
        help = "Set the patch delegate: a username or an email address."
    )]
    pub(crate) delegate: Option<String>,
    #[arg(
        long,
        value_name = "ARCHIVED",
        value_parser = clap::builder::BoolishValueParser::new(),
        help = "Set the patch archived state."
    )]
    pub(crate) archived: Option<bool>,
    #[command(flatten)]
    pub(crate) format: FormatArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct SeriesApplyArgs {
    pub(crate) series_id: u64,
    /// Extra arguments passed to 'git am'.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub(crate) args: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct SeriesDownloadArgs {
    pub(crate) series_id: u64,
    /// Output path, a directory, or '-' for stdout.
    pub(crate) output: Option<PathBuf>,
    #[arg(
        long,
        conflicts_with = "combined",
        help = "Download each series patch to a separate file."
    )]
    pub(crate) separate: bool,
    #[arg(long, help = "Download all series patches to one file (default).")]
    pub(crate) combined: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct SeriesListArgs {
    /// Show only series whose name matches this text.
    pub(crate) name: Option<String>,
    #[arg(
        long = "submitter",
        value_name = "SUBMITTER",
        help = "Show only series by these submitters. Should be an email, name or ID."
    )]
    pub(crate) submitters: Vec<String>,
    #[command(flatten)]
    pub(crate) page: PageArgs,
    #[arg(
        long,
        value_name = "FIELD",
        default_value = "-date",
        value_parser = ["id", "-id", "name", "-name", "date", "-date"],
        help = "Sort output on given field."
    )]
    pub(crate) sort: String,
    #[command(flatten)]
    pub(crate) output: ListOutputArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct SeriesShowArgs {
    pub(crate) series_id: u64,
    #[command(flatten)]
    pub(crate) format: FormatArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct BundleApplyArgs {
    /// Bundle ID or unique name.
    pub(crate) bundle: String,
    /// Extra arguments passed to 'git am'.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub(crate) args: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct BundleDownloadArgs {
    /// Bundle ID or unique name.
    pub(crate) bundle: String,
    /// Output path, a directory, or '-' for stdout.
    pub(crate) output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct BundleListArgs {
    /// Show only bundles whose name matches this text.
    pub(crate) name: Option<String>,
    #[arg(
        long = "owner",
        value_name = "OWNER",
        help = "Show only bundles with these owners. Should be an email, name or ID."
    )]
    pub(crate) owners: Vec<String>,
    #[command(flatten)]
    pub(crate) page: PageArgs,
    #[arg(
        long,
        value_name = "FIELD",
        default_value = "name",
        value_parser = ["id", "-id", "name", "-name"],
        help = "Sort output on given field."
    )]
    pub(crate) sort: String,
    #[command(flatten)]
    pub(crate) output: ListOutputArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct BundleShowArgs {
    /// Bundle ID or unique name.
    pub(crate) bundle: String,
    #[command(flatten)]
    pub(crate) format: FormatArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct BundleCreateArgs {
    /// Name of the new bundle.
    pub(crate) name: String,
    /// Patches to include.
    #[arg(required = true)]
    pub(crate) patch_ids: Vec<u64>,
    #[command(flatten)]
    pub(crate) visibility: VisibilityArgs,
    #[command(flatten)]
    pub(crate) format: FormatArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct BundleUpdateArgs {
    /// Bundle ID or unique name.
    pub(crate) bundle: String,
    #[arg(long, value_name = "NAME", help = "Set the bundle name.")]
    pub(crate) name: Option<String>,
    #[arg(
        long = "patch",
        value_name = "PATCH_ID",
        help = "Replace the bundle patches with these."
    )]
    pub(crate) patch_ids: Vec<u64>,
    #[command(flatten)]
    pub(crate) visibility: VisibilityArgs,
    #[command(flatten)]
    pub(crate) format: FormatArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct BundleDeleteArgs {
    /// Bundle ID or unique name.
    pub(crate) bundle: String,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct BundlePatchesArgs {
    /// Bundle ID or unique name.
    pub(crate) bundle: String,
    #[arg(required = true)]
    pub(crate) patch_ids: Vec<u64>,
    #[command(flatten)]
    pub(crate) format: FormatArgs,
}

pub(crate) const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Patch(patch) => match patch {
            PatchCommand::Apply(_) => "patch_apply",
            PatchCommand::Download(_) => "patch_download",
            PatchCommand::List(_) => "patch_list",
            PatchCommand::Show(_) => "patch_show",
            PatchCommand::Update(_) => "patch_update",
        },
        Command::Series(series) => match series {
            SeriesCommand::Apply(_) => "series_apply",
            SeriesCommand::Download(_) => "series_download",
            SeriesCommand::List(_) => "series_list",
            SeriesCommand::Show(_) => "series_show",
        },
        Command::Bundle(bundle) => match bundle {
            BundleCommand::Apply(_) => "bundle_apply",
            BundleCommand::Download(_) => "bundle_download",
            BundleCommand::List(_) => "bundle_list",
            BundleCommand::Show(_) => "bundle_show",
            BundleCommand::Create(_) => "bundle_create",
            BundleCommand::Update(_) => "bundle_update",
            BundleCommand::Delete(_) => "bundle_delete",
            BundleCommand::Add(_) => "bundle_add",
            BundleCommand::Remove(_) => "bundle_remove",
        },
    }
}
