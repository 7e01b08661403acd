use gitpw_config::ApiVersion;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::api::{self, Resource};
use crate::cli::{
    BundleApplyArgs, BundleCreateArgs, BundleDeleteArgs, BundleDownloadArgs, BundleListArgs,
    BundlePatchesArgs, BundleShowArgs, BundleUpdateArgs,
};
use crate::client::{AppContext, CliError, CliResult};
use crate::commands::{
    apply_mbox, field, list_params, log_saved, mbox_url, repeated, text, user_filters, yes_no,
};
use crate::output::{self, OutputFormat, Rows, resolve_format, trim};

const LIST_HEADERS: &[&str] = &["ID", "Name", "Owner", "Public"];

/// Look a bundle up by id or by a name matching exactly one bundle.
async fn fetch_bundle(ctx: &AppContext, bundle: &str) -> CliResult<(String, Value)> {
    let id = api::resolve_unique(ctx, Resource::Bundles, bundle).await?;
    let record = api::detail(ctx, Resource::Bundles, &id, Vec::new()).await?;
    Ok((id, record))
}

fn patch_ids(bundle: &Value) -> Vec<u64> {
    bundle
        .get("patches")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|patch| patch.get("id").and_then(Value::as_u64))
        .collect()
}

pub(crate) async fn handle_bundle_apply(ctx: &AppContext, args: BundleApplyArgs) -> CliResult<()> {
    debug!("Applying bundle: id={}", args.bundle);

    let (_, bundle) = fetch_bundle(ctx, &args.bundle).await?;
    apply_mbox(ctx, &mbox_url(&bundle)?, &Vec::new(), &args.args).await
}

pub(crate) async fn handle_bundle_download(
    ctx: &AppContext,
    args: BundleDownloadArgs,
) -> CliResult<()> {
    debug!("Downloading bundle: id={}", args.bundle);

    let (_, bundle) = fetch_bundle(ctx, &args.bundle).await?;
    let path = api::download(ctx, &mbox_url(&bundle)?, &Vec::new(), args.output.as_deref()).await?;
    log_saved("bundle", path.as_deref());
    Ok(())
}

pub(crate) async fn handle_bundle_list(ctx: &AppContext, args: BundleListArgs) -> CliResult<()> {
    debug!(
        "List bundles: owners={}, limit={:?}, page={:?}, sort={}",
        args.owners.join(","),
        args.page.limit,
        args.page.page,
        args.sort
    );

    let format = resolve_format(args.output.format.format, &ctx.settings)?;
    api::warn_on_multiple_filters(ctx, &[("owner", args.owners.len())])?;

    let mut params = user_filters(ctx, "owner", &args.owners).await?;
    params.extend(list_params(args.name.as_deref(), &args.page, &args.sort));

    let bundles = api::index(ctx, Resource::Bundles, params).await?;
    let rows = Rows::new(LIST_HEADERS, bundles.iter().map(list_row).collect())
        .select(&args.output.columns)?;
    output::emit(&ctx.settings, &rows, format).await
}

fn list_row(bundle: &Value) -> Vec<Value> {
    vec![
        field(bundle, "id"),
        Value::String(trim(&text(bundle, "name"), 70)),
        Value::String(text(&field(bundle, "owner"), "username")),
        yes_no(&field(bundle, "public")),
    ]
}

pub(crate) async fn handle_bundle_show(ctx: &AppContext, args: BundleShowArgs) -> CliResult<()> {
    debug!("Showing bundle: id={}", args.bundle);

    let format = resolve_format(args.format.format, &ctx.settings)?;
    let (_, bundle) = fetch_bundle(ctx, &args.bundle).await?;
    show_bundle(ctx, &bundle, format).await
}

async fn show_bundle(ctx: &AppContext, bundle: &Value, format: OutputFormat) -> CliResult<()> {
    output::emit(&ctx.settings, &bundle_properties(bundle), format).await
}

pub(crate) fn bundle_properties(bundle: &Value) -> Rows {
    let mut properties = vec![
        ("ID", field(bundle, "id")),
        ("Name", field(bundle, "name")),
        ("URL", field(bundle, "web_url")),
        ("Owner", json!(text(&field(bundle, "owner"), "username"))),
        ("Project", json!(text(&field(bundle, "project"), "name"))),
        ("Public", field(bundle, "public")),
    ];
    properties.extend(repeated("Patches", bundle.get("patches")));
    Rows::properties(properties)
}

pub(crate) async fn handle_bundle_create(
    ctx: &AppContext,
    args: BundleCreateArgs,
) -> CliResult<()> {
    api::require_version(
        ctx,
        ApiVersion::V1_2,
        "Creating bundles is only supported from API version 1.2",
    )?;
    info!(
        "Creating bundle: name={}, patches={:?}, public={}",
        args.name,
        args.patch_ids,
        args.visibility.requested().unwrap_or(false)
    );

    let format = resolve_format(args.format.format, &ctx.settings)?;
    let body = json!({
        "name": args.name,
        "patches": args.patch_ids,
        "public": args.visibility.requested().unwrap_or(false),
    });
    let bundle = api::create(ctx, Resource::Bundles, &body).await?;
    show_bundle(ctx, &bundle, format).await
}

pub(crate) async fn handle_bundle_update(
    ctx: &AppContext,
    args: BundleUpdateArgs,
) -> CliResult<()> {
    api::require_version(
        ctx,
        ApiVersion::V1_2,
        "Updating bundles is only supported from API version 1.2",
    )?;
    info!(
        "Updating bundle: id={}, name={:?}, patches={:?}, public={:?}",
        args.bundle,
        args.name,
        args.patch_ids,
        args.visibility.requested()
    );

    let format = resolve_format(args.format.format, &ctx.settings)?;
    let id = api::resolve_unique(ctx, Resource::Bundles, &args.bundle).await?;

    let mut body = Map::new();
    if let Some(name) = &args.name {
        body.insert("name".into(), json!(name));
    }
    if !args.patch_ids.is_empty() {
        body.insert("patches".into(), json!(args.patch_ids));
    }
    if let Some(public) = args.visibility.requested() {
        body.insert("public".into(), json!(public));
    }

    let bundle = api::update(ctx, Resource::Bundles, &id, &Value::Object(body)).await?;
    show_bundle(ctx, &bundle, format).await
}

pub(crate) async fn handle_bundle_delete(
    ctx: &AppContext,
    args: BundleDeleteArgs,
) -> CliResult<()> {
    api::require_version(
        ctx,
        ApiVersion::V1_2,
        "Deleting bundles is only supported from API version 1.2",
    )?;
    info!("Deleting bundle: id={}", args.bundle);

    let id = api::resolve_unique(ctx, Resource::Bundles, &args.bundle).await?;
    api::delete(ctx, Resource::Bundles, &id).await
}

pub(crate) async fn handle_bundle_add(ctx: &AppContext, args: BundlePatchesArgs) -> CliResult<()> {
    api::require_version(
        ctx,
        ApiVersion::V1_2,
        "Modifying bundles is only supported from API version 1.2",
    )?;
    info!(
        "Adding patches to bundle: id={}, patches={:?}",
        args.bundle, args.patch_ids
    );

    let format = resolve_format(args.format.format, &ctx.settings)?;
    let (id, bundle) = fetch_bundle(ctx, &args.bundle).await?;
    let patches = with_added(patch_ids(&bundle), &args.patch_ids);

    let bundle = api::update(ctx, Resource::Bundles, &id, &json!({ "patches": patches })).await?;
    show_bundle(ctx, &bundle, format).await
}

pub(crate) async fn handle_bundle_remove(
    ctx: &AppContext,
    args: BundlePatchesArgs,
) -> CliResult<()> {
    api::require_version(
        ctx,
        ApiVersion::V1_2,
        "Modifying bundles is only supported from API version 1.2",
    )?;
    info!(
        "Removing patches from bundle: id={}, patches={:?}",
        args.bundle, args.patch_ids
    );

    let format = resolve_format(args.format.format, &ctx.settings)?;
    let (id, bundle) = fetch_bundle(ctx, &args.bundle).await?;
    let patches = without_removed(patch_ids(&bundle), &args.patch_ids);
    if patches.is_empty() {
        return Err(CliError::validation(format!(
            "Bundles cannot be empty. Consider deleting the bundle instead: git-pw bundle delete {id}"
        )));
    }

    let bundle = api::update(ctx, Resource::Bundles, &id, &json!({ "patches": patches })).await?;
    show_bundle(ctx, &bundle, format).await
}

/// Existing ids followed by new ones, without duplicates.
pub(crate) fn with_added(mut existing: Vec<u64>, added: &[u64]) -> Vec<u64> {
    for id in added {
        if !existing.contains(id) {
            existing.push(*id);
        }
    }
    existing
}

pub(crate) fn without_removed(existing: Vec<u64>, removed: &[u64]) -> Vec<u64> {
    existing
        .into_iter()
        .filter(|id| !removed.contains(id))
        .collect()
}
