//! Request layer over the Patchwork REST API.
//!
//! Every collection and member URL carries a trailing slash. Reads attach
//! credentials when configured; writes require them and fail before any
//! request is built otherwise.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use futures_util::StreamExt;
use gitpw_config::{ApiVersion, Credentials};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, HeaderMap};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::client::{AppContext, CliError, CliResult, HttpError, Operation};

static FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"filename=(.+)").expect("static regex compiles"));

/// Ordered query pairs; repeated keys express multi-value filters and a
/// `None` value is left off the query string.
pub(crate) type Filters = Vec<(String, Option<String>)>;

/// Build a single filter pair.
pub(crate) fn filter(key: &str, value: impl ToString) -> (String, Option<String>) {
    (key.to_string(), Some(value.to_string()))
}

/// Build a filter pair that may be absent.
pub(crate) fn optional<T: ToString>(key: &str, value: Option<T>) -> (String, Option<String>) {
    (key.to_string(), value.map(|value| value.to_string()))
}

/// Resource collections exposed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resource {
    Patches,
    Series,
    Bundles,
    People,
    Users,
}

impl Resource {
    pub(crate) const fn path(self) -> &'static str {
        match self {
            Self::Patches => "patches",
            Self::Series => "series",
            Self::Bundles => "bundles",
            Self::People => "people",
            Self::Users => "users",
        }
    }
}

fn query_pairs(params: &Filters) -> Vec<(&str, &str)> {
    params
        .iter()
        .filter_map(|(key, value)| value.as_deref().map(|value| (key.as_str(), value)))
        .collect()
}

fn authorize(request: RequestBuilder, credentials: Option<&Credentials>) -> RequestBuilder {
    match credentials {
        Some(Credentials::Token(token)) => {
            request.header(AUTHORIZATION, format!("Token {}", token.trim()))
        }
        Some(Credentials::Basic { username, password }) => {
            request.basic_auth(username, Some(password))
        }
        None => request,
    }
}

/// Classify a non-success response into the HTTP error taxonomy.
pub(crate) async fn classify_response(operation: Operation, response: Response) -> CliError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify(operation, status, body)
}

fn classify(operation: Operation, status: StatusCode, body: String) -> CliError {
    if body.trim().is_empty() {
        return HttpError::Empty { operation, status }.into();
    }
    if status.is_server_error() {
        return HttpError::Server { status, body }.into();
    }
    if status == StatusCode::NOT_FOUND {
        return HttpError::NotFound.into();
    }
    let body = serde_json::from_str::<Value>(&body)
        .map_or_else(|_| body.trim().to_string(), |value| value.to_string());
    HttpError::Rejected { status, body }.into()
}

async fn send(operation: Operation, request: RequestBuilder) -> CliResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|source| HttpError::Unreachable { operation, source })?;
    if !response.status().is_success() {
        return Err(classify_response(operation, response).await);
    }
    debug!("Got response");
    Ok(response)
}

async fn get(ctx: &AppContext, url: &str, params: &Filters) -> CliResult<Response> {
    debug!("GET {url}");
    let credentials = ctx.settings.credentials();
    let request = authorize(ctx.client.get(url), credentials.as_ref()).query(&query_pairs(params));
    send(Operation::Fetch, request).await
}

async fn decode(operation: Operation, response: Response) -> CliResult<Value> {
    response
        .json::<Value>()
        .await
        .map_err(|source| HttpError::Unreachable { operation, source }.into())
}

/// `GET /{resource}/`, always scoped to the configured project.
pub(crate) async fn index(
    ctx: &AppContext,
    resource: Resource,
    mut params: Filters,
) -> CliResult<Vec<Value>> {
    let url = ctx.server()?.collection_url(resource.path());
    params.push(filter("project", ctx.settings.project()?));

    let response = get(ctx, &url, &params).await?;
    match decode(Operation::Fetch, response).await? {
        Value::Array(items) => Ok(items),
        other => Err(CliError::failure(anyhow!(
            "expected a list of {} but received: {other}",
            resource.path()
        ))),
    }
}

/// `GET /{resource}/{id}/`.
pub(crate) async fn detail(
    ctx: &AppContext,
    resource: Resource,
    id: impl Display,
    params: Filters,
) -> CliResult<Value> {
    let url = ctx.server()?.member_url(resource.path(), id);
    let response = get(ctx, &url, &params).await?;
    decode(Operation::Fetch, response).await
}

/// `POST /{resource}/`.
pub(crate) async fn create(ctx: &AppContext, resource: Resource, body: &Value) -> CliResult<Value> {
    let credentials = ctx.settings.require_credentials()?;
    let url = ctx.server()?.collection_url(resource.path());
    debug!("POST {url}, data={body}");

    let request = authorize(ctx.client.post(&url), Some(&credentials)).json(body);
    let response = send(Operation::Create, request).await?;
    decode(Operation::Create, response).await
}

/// `PATCH /{resource}/{id}/`.
pub(crate) async fn update(
    ctx: &AppContext,
    resource: Resource,
    id: impl Display,
    body: &Value,
) -> CliResult<Value> {
    let credentials = ctx.settings.require_credentials()?;
    let url = ctx.server()?.member_url(resource.path(), id);
    debug!("PATCH {url}, data={body}");

    let request = authorize(ctx.client.patch(&url), Some(&credentials)).json(body);
    let response = send(Operation::Update, request).await?;
    decode(Operation::Update, response).await
}

/// `DELETE /{resource}/{id}/`.
pub(crate) async fn delete(ctx: &AppContext, resource: Resource, id: impl Display) -> CliResult<()> {
    let credentials = ctx.settings.require_credentials()?;
    let url = ctx.server()?.member_url(resource.path(), id);
    debug!("DELETE {url}");

    let request = authorize(ctx.client.delete(&url), Some(&credentials));
    send(Operation::Delete, request).await?;
    Ok(())
}

/// Extract the suggested filename from `Content-Disposition`, dropping any
/// quoting and directory components.
pub(crate) fn suggested_filename(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    let raw = FILENAME.captures(header)?.get(1)?.as_str();
    let name = raw.split(';').next().unwrap_or(raw).trim().trim_matches('"');
    Path::new(name)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// True when `output` names standard output.
pub(crate) fn is_stdout(output: &Path) -> bool {
    output == Path::new("-")
}

/// Stream a resource to a file, a directory, a temporary location, or
/// stdout. Returns the written path, or `None` for stdout.
pub(crate) async fn download(
    ctx: &AppContext,
    url: &str,
    params: &Filters,
    output: Option<&Path>,
) -> CliResult<Option<PathBuf>> {
    let response = get(ctx, url, params).await?;
    let filename = suggested_filename(response.headers()).ok_or_else(|| {
        CliError::validation("Filename was expected but was not provided in response")
    })?;

    if output.is_some_and(is_stdout) {
        let mut stdout = tokio::io::stdout();
        stream_body(response, &mut stdout).await?;
        return Ok(None);
    }

    let path = match output {
        Some(path) if path.is_dir() => path.join(&filename),
        Some(path) => path.to_path_buf(),
        None => temp_dir()?.join(&filename),
    };
    debug!("Saving to {}", path.display());

    let mut file = tokio::fs::File::create(&path).await.map_err(|err| {
        CliError::failure(anyhow!("failed to create '{}': {err}", path.display()))
    })?;
    stream_body(response, &mut file).await?;
    Ok(Some(path))
}

fn temp_dir() -> CliResult<PathBuf> {
    tempfile::Builder::new()
        .prefix("git-pw")
        .tempdir()
        .map(tempfile::TempDir::keep)
        .map_err(|err| CliError::failure(anyhow!("failed to create temporary directory: {err}")))
}

async fn stream_body<W>(response: Response, sink: &mut W) -> CliResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|source| HttpError::Unreachable {
            operation: Operation::Fetch,
            source,
        })?;
        sink.write_all(&chunk)
            .await
            .map_err(|err| CliError::failure(anyhow!("failed to write download: {err}")))?;
    }
    sink.flush()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to write download: {err}")))
}

/// Fail before any request when the server is older than `minimum`.
pub(crate) fn require_version(ctx: &AppContext, minimum: ApiVersion, message: &str) -> CliResult<()> {
    if ctx.version()? < minimum {
        return Err(CliError::validation(message));
    }
    Ok(())
}

/// Warnings for multi-value options the server cannot combine.
pub(crate) fn multiple_filter_warnings(version: ApiVersion, options: &[(&str, usize)]) -> Vec<String> {
    if version >= ApiVersion::V1_1 {
        return Vec::new();
    }
    options
        .iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| {
            format!(
                "The `--{name}` filter was specified multiple times. Filtering by multiple \
                 {name}s is not supported with API version 1.0. If the server supports it, \
                 use version 1.1 instead. Refer to https://git.io/vN3vX for more information."
            )
        })
        .collect()
}

/// Emit [`multiple_filter_warnings`] for the current server.
pub(crate) fn warn_on_multiple_filters(ctx: &AppContext, options: &[(&str, usize)]) -> CliResult<()> {
    for message in multiple_filter_warnings(ctx.version()?, options) {
        warn!("{message}");
    }
    Ok(())
}

/// Warning for a free-text lookup that matched nothing or too much.
pub(crate) fn filter_match_warning(
    version: ApiVersion,
    name: &str,
    value: &str,
    matches: usize,
) -> Option<String> {
    if matches == 0 {
        return Some(format!("No matching {name} found: {value}"));
    }
    if matches > 1 && version < ApiVersion::V1_1 {
        return Some(format!(
            "More than one match for found for `--{name}={value}`. Filtering by multiple \
             {name}s is not supported with API version 1.0. If the server supports it, use \
             version 1.1 instead. Refer to https://git.io/vN3vX for more information."
        ));
    }
    None
}

fn item_id(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => Some(text.clone()),
        _ => None,
    }
}

/// Resolve free text to `(name, id)` filter pairs through a search of
/// `resource`. Ambiguity only warns; every match is returned.
pub(crate) async fn retrieve_filter_ids(
    ctx: &AppContext,
    resource: Resource,
    name: &str,
    value: &str,
) -> CliResult<Filters> {
    if value.chars().count() < 3 {
        return Err(CliError::validation(
            "Filters must be at least 3 characters long",
        ));
    }

    // Only the first page is consulted.
    let items = index(ctx, resource, vec![filter("q", value)]).await?;
    if let Some(message) = filter_match_warning(ctx.version()?, name, value, items.len()) {
        warn!("{message}");
    }

    Ok(items
        .iter()
        .filter_map(item_id)
        .map(|id| (name.to_string(), Some(id)))
        .collect())
}

/// Resolve an id or a free-text name to exactly one record's id.
pub(crate) async fn resolve_unique(
    ctx: &AppContext,
    resource: Resource,
    value: &str,
) -> CliResult<String> {
    if value.parse::<u64>().is_ok() {
        return Ok(value.to_string());
    }

    let items = index(ctx, resource, vec![filter("q", value)]).await?;
    match items.as_slice() {
        [] => Err(CliError::validation(format!(
            "No {} matching '{value}'",
            resource.path()
        ))),
        [item] => item_id(item).ok_or_else(|| {
            CliError::failure(anyhow!("{} record without an id", resource.path()))
        }),
        _ => Err(CliError::validation(format!(
            "More than one {} matching '{value}'; use the id instead",
            resource.path()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    use crate::client::test_context;

    #[test]
    fn filters_drop_absent_values_and_keep_order() {
        let params = vec![
            filter("state", "new"),
            optional::<u32>("page", None),
            filter("state", "rfc"),
            optional("order", Some("-date")),
        ];
        assert_eq!(
            query_pairs(&params),
            vec![("state", "new"), ("state", "rfc"), ("order", "-date")]
        );
    }

    #[test]
    fn classify_maps_status_and_body() {
        let server = classify(
            Operation::Fetch,
            StatusCode::INTERNAL_SERVER_ERROR,
            "boom".into(),
        );
        assert!(matches!(server, CliError::Http(HttpError::Server { .. })));

        let missing = classify(Operation::Fetch, StatusCode::NOT_FOUND, "{}".into());
        assert!(matches!(missing, CliError::Http(HttpError::NotFound)));

        let empty = classify(Operation::Delete, StatusCode::BAD_GATEWAY, String::new());
        assert!(matches!(
            empty,
            CliError::Http(HttpError::Empty {
                operation: Operation::Delete,
                ..
            })
        ));

        let rejected = classify(
            Operation::Update,
            StatusCode::BAD_REQUEST,
            r#"{"state": ["invalid"]}"#.into(),
        );
        assert_eq!(rejected.display_message(), r#"{"state":["invalid"]}"#);
    }

    #[test]
    fn filename_is_taken_from_content_disposition() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"123-fix.patch\""),
        );
        assert_eq!(suggested_filename(&headers).as_deref(), Some("123-fix.patch"));

        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=../../etc/passwd"),
        );
        assert_eq!(suggested_filename(&headers).as_deref(), Some("passwd"));

        headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static("inline"));
        assert!(suggested_filename(&headers).is_none());
    }

    #[test]
    fn multiple_filters_only_warn_on_old_servers() {
        let options = [("submitter", 2), ("delegate", 1)];
        let warnings = multiple_filter_warnings(ApiVersion::V1_0, &options);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("`--submitter`"));
        assert!(multiple_filter_warnings(ApiVersion::V1_1, &options).is_empty());
    }

    #[test]
    fn match_warnings_depend_on_count_and_version() {
        assert_eq!(
            filter_match_warning(ApiVersion::V1_0, "submitter", "jane", 0).as_deref(),
            Some("No matching submitter found: jane")
        );
        assert!(filter_match_warning(ApiVersion::V1_0, "submitter", "jane", 2).is_some());
        assert!(filter_match_warning(ApiVersion::V1_1, "submitter", "jane", 2).is_none());
        assert!(filter_match_warning(ApiVersion::V1_0, "submitter", "jane", 1).is_none());
    }

    #[tokio::test]
    async fn index_appends_project_and_trailing_slash() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/1.1/patches/")
                .query_param("state", "new")
                .query_param("project", "demo")
                .header("user-agent", crate::client::USER_AGENT);
            then.status(200).json_body(json!([{"id": 1}, {"id": 2}]));
        });
        let mut ctx = test_context(&server.url("/api/1.1"), &[("pw.project", "demo")]);
        ctx.client = crate::client::AppContext::build_client(std::time::Duration::from_secs(5))
            .expect("client");

        let items = index(&ctx, Resource::Patches, vec![filter("state", "new")])
            .await
            .expect("index");
        assert_eq!(items.len(), 2);
        mock.assert();
    }

    #[tokio::test]
    async fn wildcard_project_sends_empty_filter() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/1.1/series/")
                .query_param("project", "");
            then.status(200).json_body(json!([]));
        });
        let ctx = test_context(&server.url("/api/1.1"), &[("pw.project", " * ")]);

        let items = index(&ctx, Resource::Series, Vec::new()).await.expect("index");
        assert!(items.is_empty());
        mock.assert();
    }

    #[tokio::test]
    async fn detail_attaches_token_when_configured() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/1.1/patches/7/")
                .header("authorization", "Token abc");
            then.status(200).json_body(json!({"id": 7}));
        });
        let ctx = test_context(&server.url("/api/1.1"), &[("pw.token", "abc")]);

        let patch = detail(&ctx, Resource::Patches, 7, Vec::new())
            .await
            .expect("detail");
        assert_eq!(patch["id"], 7);
        mock.assert();
    }

    #[tokio::test]
    async fn not_found_and_server_errors_are_classified() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/1.1/patches/404/");
            then.status(404).json_body(json!({"detail": "Not found."}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/1.1/patches/500/");
            then.status(500).body("Traceback (most recent call last)");
        });
        let ctx = test_context(&server.url("/api/1.1"), &[]);

        let missing = detail(&ctx, Resource::Patches, 404, Vec::new()).await;
        assert!(matches!(missing, Err(CliError::Http(HttpError::NotFound))));

        let broken = detail(&ctx, Resource::Patches, 500, Vec::new()).await;
        let err = broken.expect_err("server error");
        assert!(err.always_diagnose());
    }

    #[tokio::test]
    async fn unreachable_server_reports_generic_failure() {
        let ctx = test_context("http://127.0.0.1:9/api/1.1", &[("pw.project", "demo")]);
        let err = index(&ctx, Resource::Patches, Vec::new())
            .await
            .expect_err("connection refused");
        assert!(
            err.display_message()
                .starts_with("Failed to fetch resource. Is your configuration correct?")
        );
    }

    #[tokio::test]
    async fn writes_require_credentials_before_any_request() {
        let ctx = test_context("http://127.0.0.1:9/api/1.2", &[]);
        let err = delete(&ctx, Resource::Bundles, 1)
            .await
            .expect_err("no credentials");
        assert!(matches!(err, CliError::Config(_)));
    }

    #[tokio::test]
    async fn update_sends_json_with_basic_auth() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method("PATCH")
                .path("/api/1.2/patches/3/")
                .header("authorization", "Basic amFuZTpzZWNyZXQ=")
                .json_body(json!({"state": "accepted"}));
            then.status(200).json_body(json!({"id": 3, "state": "accepted"}));
        });
        let ctx = test_context(
            &server.url("/api/1.2"),
            &[("pw.username", "jane"), ("pw.password", "secret")],
        );

        let patch = update(&ctx, Resource::Patches, 3, &json!({"state": "accepted"}))
            .await
            .expect("update");
        assert_eq!(patch["state"], "accepted");
        mock.assert();
    }

    #[tokio::test]
    async fn short_filters_are_rejected_without_a_request() {
        let ctx = test_context("http://127.0.0.1:9/api/1.0", &[("pw.project", "demo")]);
        let err = retrieve_filter_ids(&ctx, Resource::People, "submitter", "ab")
            .await
            .expect_err("too short");
        assert_eq!(
            err.display_message(),
            "Filters must be at least 3 characters long"
        );
    }

    #[tokio::test]
    async fn filter_ids_cover_every_match() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/people/")
                .query_param("q", "jane")
                .query_param("project", "demo");
            then.status(200).json_body(json!([{"id": 4}, {"id": 9}]));
        });
        let ctx = test_context(&server.url("/api"), &[("pw.project", "demo")]);

        let ids = retrieve_filter_ids(&ctx, Resource::People, "submitter", "jane")
            .await
            .expect("ids");
        assert_eq!(
            ids,
            vec![filter("submitter", 4), filter("submitter", 9)]
        );
        mock.assert();
    }

    #[tokio::test]
    async fn filter_ids_are_empty_when_nothing_matches() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/1.1/users/");
            then.status(200).json_body(json!([]));
        });
        let ctx = test_context(&server.url("/api/1.1"), &[("pw.project", "demo")]);

        let ids = retrieve_filter_ids(&ctx, Resource::Users, "delegate", "nobody")
            .await
            .expect("ids");
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn unique_resolution_is_strict() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/1.2/users/").query_param("q", "many");
            then.status(200).json_body(json!([{"id": 1}, {"id": 2}]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/1.2/users/").query_param("q", "one");
            then.status(200).json_body(json!([{"id": 5}]));
        });
        let ctx = test_context(&server.url("/api/1.2"), &[("pw.project", "demo")]);

        assert_eq!(
            resolve_unique(&ctx, Resource::Users, "42").await.expect("numeric"),
            "42"
        );
        assert_eq!(
            resolve_unique(&ctx, Resource::Users, "one").await.expect("one"),
            "5"
        );
        assert!(matches!(
            resolve_unique(&ctx, Resource::Users, "many").await,
            Err(CliError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn version_gate_fails_before_network() {
        let ctx = test_context("http://127.0.0.1:9/api/1.1", &[]);
        let err = require_version(&ctx, ApiVersion::V1_2, "needs 1.2").expect_err("gated");
        assert_eq!(err.display_message(), "needs 1.2");
        assert!(require_version(&ctx, ApiVersion::V1_1, "ok").is_ok());
    }

    #[tokio::test]
    async fn download_uses_suggested_name_inside_directory() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/patch/1/mbox/")
                .query_param("series", "*");
            then.status(200)
                .header("content-disposition", "attachment; filename=1-fix.patch")
                .body("From: jane\n");
        });
        let ctx = test_context(&server.url("/api/1.1"), &[]);
        let dir = tempfile::tempdir().expect("tempdir");
        let url = server.url("/patch/1/mbox/");

        let path = download(&ctx, &url, &vec![filter("series", "*")], Some(dir.path()))
            .await
            .expect("download")
            .expect("path");
        assert_eq!(path, dir.path().join("1-fix.patch"));
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "From: jane\n"
        );
        mock.assert();
    }

    #[tokio::test]
    async fn download_without_filename_header_fails() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/series/2/mbox/");
            then.status(200).body("From: jane\n");
        });
        let ctx = test_context(&server.url("/api/1.1"), &[]);

        let err = download(&ctx, &server.url("/series/2/mbox/"), &Vec::new(), None)
            .await
            .expect_err("missing header");
        assert_eq!(
            err.display_message(),
            "Filename was expected but was not provided in response"
        );
    }
}
