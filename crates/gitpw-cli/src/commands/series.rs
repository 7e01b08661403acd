use serde_json::{Value, json};
use tracing::{debug, info};

use crate::api::{self, Resource};
use crate::cli::{SeriesApplyArgs, SeriesDownloadArgs, SeriesListArgs, SeriesShowArgs};
use crate::client::{AppContext, CliError, CliResult};
use crate::commands::{
    apply_mbox, field, list_params, log_saved, mbox_url, person, repeated, submission_line,
    submitter_filters, text,
};
use crate::output::{self, Rows, humanize_date, resolve_format, trim};

const LIST_HEADERS: &[&str] = &["ID", "Date", "Name", "Version", "Submitter"];

pub(crate) async fn handle_series_apply(ctx: &AppContext, args: SeriesApplyArgs) -> CliResult<()> {
    debug!(
        "Applying series: id={}, args={}",
        args.series_id,
        args.args.join(" ")
    );

    let series = api::detail(ctx, Resource::Series, args.series_id, Vec::new()).await?;
    apply_mbox(ctx, &mbox_url(&series)?, &Vec::new(), &args.args).await
}

pub(crate) async fn handle_series_download(
    ctx: &AppContext,
    args: SeriesDownloadArgs,
) -> CliResult<()> {
    debug!("Downloading series: id={}", args.series_id);

    let output = args.output.as_deref();
    if args.separate && output.is_some_and(|path| !path.is_dir()) {
        return Err(CliError::validation(
            "When downloading into separate files, OUTPUT can only be a directory",
        ));
    }

    let series = api::detail(ctx, Resource::Series, args.series_id, Vec::new()).await?;

    if args.separate {
        let patches = series
            .get("patches")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for patch in &patches {
            let path = api::download(ctx, &mbox_url(patch)?, &Vec::new(), output).await?;
            if let Some(path) = path {
                info!(
                    "Downloaded patch {} from series {} to {}",
                    text(patch, "id"),
                    text(&series, "id"),
                    path.display()
                );
            }
        }
        return Ok(());
    }

    let path = api::download(ctx, &mbox_url(&series)?, &Vec::new(), output).await?;
    log_saved("series", path.as_deref());
    Ok(())
}

pub(crate) async fn handle_series_list(ctx: &AppContext, args: SeriesListArgs) -> CliResult<()> {
    debug!(
        "List series: submitters={}, limit={:?}, page={:?}, sort={}",
        args.submitters.join(","),
        args.page.limit,
        args.page.page,
        args.sort
    );

    let format = resolve_format(args.output.format.format, &ctx.settings)?;
    api::warn_on_multiple_filters(ctx, &[("submitter", args.submitters.len())])?;

    let mut params = submitter_filters(ctx, &args.submitters).await?;
    params.extend(list_params(args.name.as_deref(), &args.page, &args.sort));

    let series = api::index(ctx, Resource::Series, params).await?;
    let rows = Rows::new(LIST_HEADERS, series.iter().map(list_row).collect())
        .select(&args.output.columns)?;
    output::emit(&ctx.settings, &rows, format).await
}

fn list_row(series: &Value) -> Vec<Value> {
    vec![
        field(series, "id"),
        Value::String(humanize_date(&text(series, "date"))),
        Value::String(trim(&text(series, "name"), 70)),
        field(series, "version"),
        Value::String(person(&field(series, "submitter"))),
    ]
}

pub(crate) async fn handle_series_show(ctx: &AppContext, args: SeriesShowArgs) -> CliResult<()> {
    debug!("Showing series: id={}", args.series_id);

    let format = resolve_format(args.format.format, &ctx.settings)?;
    let series = api::detail(ctx, Resource::Series, args.series_id, Vec::new()).await?;
    output::emit(&ctx.settings, &series_properties(&series), format).await
}

pub(crate) fn series_properties(series: &Value) -> Rows {
    let cover = series
        .get("cover_letter")
        .filter(|cover| !cover.is_null())
        .map(submission_line)
        .unwrap_or_default();
    let mut properties = vec![
        ("ID", field(series, "id")),
        ("Date", field(series, "date")),
        ("Name", field(series, "name")),
        ("URL", field(series, "web_url")),
        ("Submitter", json!(person(&field(series, "submitter")))),
        ("Project", json!(text(&field(series, "project"), "name"))),
        ("Version", field(series, "version")),
        (
            "Received",
            json!(format!(
                "{} of {}",
                text(series, "received_total"),
                text(series, "total")
            )),
        ),
        ("Complete", field(series, "received_all")),
        ("Cover", json!(cover)),
    ];
    properties.extend(repeated("Patches", series.get("patches")));
    Rows::properties(properties)
}
