use anyhow::anyhow;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::api::{self, Filters, Resource, filter, optional};
use crate::cli::{
    PatchApplyArgs, PatchDownloadArgs, PatchListArgs, PatchShowArgs, PatchUpdateArgs,
};
use crate::client::{AppContext, CliError, CliResult};
use crate::commands::{
    apply_mbox, field, list_params, log_saved, mbox_url, person, repeated, submitter_filters,
    text, user_filters, yes_no,
};
use crate::output::{self, OutputFormat, Rows, humanize_date, resolve_format, trim};

const LIST_HEADERS: &[&str] = &[
    "ID",
    "Date",
    "Name",
    "Submitter",
    "State",
    "Archived",
    "Delegate",
];
const DEFAULT_LIST_STATES: &[&str] = &["under-review", "new"];

pub(crate) async fn handle_patch_apply(ctx: &AppContext, args: PatchApplyArgs) -> CliResult<()> {
    info!(
        "Applying patch: id={}, series={:?}, deps={}, args={}",
        args.patch_id,
        args.series,
        args.deps.enabled(),
        args.args.join(" ")
    );

    let patch = api::detail(ctx, Resource::Patches, args.patch_id, Vec::new()).await?;
    let series = dependency_series(args.deps.enabled(), args.series);
    apply_mbox(
        ctx,
        &mbox_url(&patch)?,
        &vec![optional("series", series)],
        &args.args,
    )
    .await
}

/// `*` (latest series) unless a series was named or dependencies are off.
pub(crate) fn dependency_series(deps: bool, series: Option<u64>) -> Option<String> {
    if !deps {
        return None;
    }
    Some(series.map_or_else(|| "*".to_string(), |id| id.to_string()))
}

pub(crate) async fn handle_patch_download(
    ctx: &AppContext,
    args: PatchDownloadArgs,
) -> CliResult<()> {
    debug!(
        "Downloading patch: id={}, format={}",
        args.patch_id,
        if args.diff { "diff" } else { "mbox" }
    );

    let patch = api::detail(ctx, Resource::Patches, args.patch_id, Vec::new()).await?;
    let mbox = mbox_url(&patch)?;

    let path = match (args.diff, args.output) {
        (true, Some(output)) => {
            let diff = text(&patch, "diff");
            if api::is_stdout(&output) {
                output::write_direct(&diff)?;
                None
            } else {
                tokio::fs::write(&output, diff).await.map_err(|err| {
                    CliError::failure(anyhow!("failed to write '{}': {err}", output.display()))
                })?;
                Some(output)
            }
        }
        (true, None) => {
            api::download(ctx, &raw_url(&mbox), &Vec::new(), None).await?
        }
        (false, output) => api::download(ctx, &mbox, &Vec::new(), output.as_deref()).await?,
    };

    log_saved("patch", path.as_deref());
    Ok(())
}

/// Plain diff variant of an mbox URL.
fn raw_url(mbox: &str) -> String {
    mbox.strip_suffix("mbox/")
        .map_or_else(|| mbox.replace("mbox", "raw"), |base| format!("{base}raw/"))
}

pub(crate) async fn handle_patch_list(ctx: &AppContext, args: PatchListArgs) -> CliResult<()> {
    info!(
        "List patches: states={}, submitters={}, delegates={}, hashes={}, archived={}",
        args.states.join(","),
        args.submitters.join(","),
        args.delegates.join(","),
        args.hashes.join(","),
        args.archived
    );

    let format = resolve_format(args.output.format.format, &ctx.settings)?;
    let default_states = args.states.iter().map(String::as_str).eq(DEFAULT_LIST_STATES.iter().copied());
    api::warn_on_multiple_filters(
        ctx,
        &[
            ("state", if default_states { 0 } else { args.states.len() }),
            ("submitter", args.submitters.len()),
            ("delegate", args.delegates.len()),
            ("hash", args.hashes.len()),
        ],
    )?;

    let mut params: Filters = args.states.iter().map(|state| filter("state", state)).collect();
    params.extend(submitter_filters(ctx, &args.submitters).await?);
    params.extend(user_filters(ctx, "delegate", &args.delegates).await?);
    params.extend(args.hashes.iter().map(|hash| filter("hash", hash)));
    let mut tail = list_params(args.name.as_deref(), &args.page, &args.sort);
    tail.insert(1, filter("archived", args.archived));
    params.extend(tail);

    let patches = api::index(ctx, Resource::Patches, params).await?;
    let rows = Rows::new(LIST_HEADERS, patches.iter().map(list_row).collect())
        .select(&args.output.columns)?;
    output::emit(&ctx.settings, &rows, format).await
}

fn list_row(patch: &Value) -> Vec<Value> {
    vec![
        field(patch, "id"),
        Value::String(humanize_date(&text(patch, "date"))),
        Value::String(trim(&text(patch, "name"), 70)),
        Value::String(person(&field(patch, "submitter"))),
        field(patch, "state"),
        yes_no(&field(patch, "archived")),
        Value::String(delegate_name(patch)),
    ]
}

fn delegate_name(patch: &Value) -> String {
    patch
        .get("delegate")
        .filter(|delegate| !delegate.is_null())
        .map(|delegate| text(delegate, "username"))
        .unwrap_or_default()
}

pub(crate) async fn handle_patch_show(ctx: &AppContext, args: PatchShowArgs) -> CliResult<()> {
    debug!("Showing patch: id={}", args.patch_id);

    let format = resolve_format(args.format.format, &ctx.settings)?;
    let patch = api::detail(ctx, Resource::Patches, args.patch_id, Vec::new()).await?;
    show_patch(ctx, &patch, format).await
}

async fn show_patch(ctx: &AppContext, patch: &Value, format: OutputFormat) -> CliResult<()> {
    output::emit(&ctx.settings, &patch_properties(patch), format).await
}

pub(crate) fn patch_properties(patch: &Value) -> Rows {
    let mut properties = vec![
        ("ID", field(patch, "id")),
        ("Message ID", field(patch, "msgid")),
        ("Date", field(patch, "date")),
        ("Name", field(patch, "name")),
        ("Submitter", Value::String(person(&field(patch, "submitter")))),
        ("State", field(patch, "state")),
        ("Archived", field(patch, "archived")),
        ("Project", Value::String(text(&field(patch, "project"), "name"))),
        ("Delegate", Value::String(delegate_name(patch))),
        ("Commit Ref", field(patch, "commit_ref")),
    ];
    properties.extend(repeated("Series", patch.get("series")));
    Rows::properties(properties)
}

pub(crate) async fn handle_patch_update(ctx: &AppContext, args: PatchUpdateArgs) -> CliResult<()> {
    info!(
        "Updating patch: id={}, commit_ref={:?}, state={:?}, archived={:?}",
        args.patch_id, args.commit_ref, args.state, args.archived
    );

    let format = resolve_format(args.format.format, &ctx.settings)?;
    if let Some(state) = &args.state {
        let allowed = ctx.settings.states();
        if !allowed.iter().any(|candidate| candidate == state) {
            return Err(CliError::validation(format!(
                "Invalid value for '--state': '{state}' is not one of {}",
                allowed.join(", ")
            )));
        }
    }

    let delegate = match &args.delegate {
        Some(delegate) => Some(api::resolve_unique(ctx, Resource::Users, delegate).await?),
        None => None,
    };

    let body = update_body(&args, delegate);
    let patch = api::update(ctx, Resource::Patches, args.patch_id, &body).await?;
    show_patch(ctx, &patch, format).await
}

/// Only the supplied fields are sent.
pub(crate) fn update_body(args: &PatchUpdateArgs, delegate: Option<String>) -> Value {
    let mut body = Map::new();
    if let Some(commit_ref) = &args.commit_ref {
        body.insert("commit_ref".into(), json!(commit_ref));
    }
    if let Some(state) = &args.state {
        body.insert("state".into(), json!(state));
    }
    if let Some(archived) = args.archived {
        body.insert("archived".into(), json!(archived));
    }
    if let Some(delegate) = delegate {
        let value = delegate
            .parse::<u64>()
            .map_or_else(|_| json!(delegate), |id| json!(id));
        body.insert("delegate".into(), value);
    }
    Value::Object(body)
}
