//! Command handlers grouped per resource, plus the helpers they share.

pub(crate) mod bundle;
pub(crate) mod patch;
pub(crate) mod series;

use std::path::Path;

use anyhow::anyhow;
use gitpw_config::ApiVersion;
use serde_json::Value;
use tracing::info;

use crate::api::{self, Filters, Resource, filter, optional};
use crate::cli::PageArgs;
use crate::client::{AppContext, CliError, CliResult};

/// Query pairs shared by every list command, after the filters.
pub(crate) fn list_params(name: Option<&str>, page: &PageArgs, sort: &str) -> Filters {
    vec![
        optional("q", name),
        optional("page", page.page),
        optional("per_page", page.limit),
        filter("order", sort),
    ]
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit())
}

/// Submitter filters: ids and (from 1.1) emails go to the server as is;
/// anything else is looked up through `people`.
pub(crate) async fn submitter_filters(ctx: &AppContext, submitters: &[String]) -> CliResult<Filters> {
    let mut params = Filters::new();
    for submitter in submitters {
        if is_numeric(submitter)
            || (ctx.version()? >= ApiVersion::V1_1 && submitter.contains('@'))
        {
            params.push(filter("submitter", submitter));
        } else {
            params.extend(
                api::retrieve_filter_ids(ctx, Resource::People, "submitter", submitter).await?,
            );
        }
    }
    Ok(params)
}

/// User filters (delegate, owner): ids and (from 1.1) usernames go to the
/// server as is; anything else is looked up through `users`.
pub(crate) async fn user_filters(
    ctx: &AppContext,
    key: &str,
    users: &[String],
) -> CliResult<Filters> {
    let mut params = Filters::new();
    for user in users {
        if is_numeric(user) || (ctx.version()? >= ApiVersion::V1_1 && !user.contains('@')) {
            params.push(filter(key, user));
        } else {
            params.extend(api::retrieve_filter_ids(ctx, Resource::Users, key, user).await?);
        }
    }
    Ok(params)
}

/// Text field of a record, or empty when absent.
pub(crate) fn text(record: &Value, key: &str) -> String {
    record.get(key).map(crate::output::cell_text).unwrap_or_default()
}

/// Field of a record, or null when absent.
pub(crate) fn field(record: &Value, key: &str) -> Value {
    record.get(key).cloned().unwrap_or(Value::Null)
}

/// `name (email)` for a person record.
pub(crate) fn person(record: &Value) -> String {
    format!("{} ({})", text(record, "name"), text(record, "email"))
}

/// `id name` with the id left-aligned in four columns.
pub(crate) fn submission_line(record: &Value) -> String {
    let name = text(record, "name");
    let name = if name.is_empty() { "-".to_string() } else { name };
    format!("{:<4} {name}", text(record, "id"))
}

/// Property rows for a repeated field: the label only on the first row.
pub(crate) fn repeated(label: &'static str, records: Option<&Value>) -> Vec<(&'static str, Value)> {
    records
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(index, record)| {
            (
                if index == 0 { label } else { "" },
                Value::String(submission_line(record)),
            )
        })
        .collect()
}

pub(crate) fn yes_no(value: &Value) -> Value {
    Value::String(if value.as_bool().unwrap_or(false) { "yes" } else { "no" }.to_string())
}

/// `mbox` URL of a record.
pub(crate) fn mbox_url(record: &Value) -> CliResult<String> {
    record
        .get("mbox")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CliError::failure(anyhow!("response did not include an mbox URL")))
}

/// Download `url` to a temporary mbox and feed it to `git am`.
pub(crate) async fn apply_mbox(
    ctx: &AppContext,
    url: &str,
    params: &Filters,
    args: &[String],
) -> CliResult<()> {
    let path = api::download(ctx, url, params, None)
        .await?
        .ok_or_else(|| CliError::failure(anyhow!("mbox was not saved to disk")))?;
    ctx.git.am(&path, args)
}

pub(crate) fn log_saved(what: &str, path: Option<&Path>) {
    if let Some(path) = path {
        info!("Downloaded {what} to {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    use crate::client::test_context;

    #[test]
    fn list_params_keep_fixed_order() {
        let params = list_params(None, &PageArgs::default(), "name");
        assert_eq!(
            params,
            vec![
                ("q".to_string(), None),
                ("page".to_string(), None),
                ("per_page".to_string(), None),
                ("order".to_string(), Some("name".to_string())),
            ]
        );
    }

    #[test]
    fn submission_lines_pad_ids() {
        assert_eq!(submission_line(&json!({"id": 12, "name": "fix"})), "12   fix");
        assert_eq!(submission_line(&json!({"id": 3, "name": null})), "3    -");
    }

    #[test]
    fn repeated_rows_label_first_only() {
        let series = json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]);
        let rows = repeated("Series", Some(&series));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "Series");
        assert_eq!(rows[1].0, "");
        assert!(repeated("Series", None).is_empty());
    }

    #[test]
    fn person_combines_name_and_email() {
        let record = json!({"name": "Jane Doe", "email": "jane@example.com"});
        assert_eq!(person(&record), "Jane Doe (jane@example.com)");
    }

    #[tokio::test]
    async fn submitters_use_native_filters_when_supported() {
        let ctx = test_context("http://127.0.0.1:9/api/1.1", &[("pw.project", "demo")]);
        let params = submitter_filters(&ctx, &["7".to_string(), "jane@example.com".to_string()])
            .await
            .expect("native");
        assert_eq!(
            params,
            vec![filter("submitter", "7"), filter("submitter", "jane@example.com")]
        );
    }

    #[tokio::test]
    async fn submitter_names_are_looked_up() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/1.1/people/")
                .query_param("q", "Jane Doe");
            then.status(200).json_body(json!([{"id": 21}]));
        });
        let ctx = test_context(&server.url("/api/1.1"), &[("pw.project", "demo")]);

        let params = submitter_filters(&ctx, &["Jane Doe".to_string()])
            .await
            .expect("lookup");
        assert_eq!(params, vec![filter("submitter", 21)]);
        mock.assert();
    }

    #[tokio::test]
    async fn user_emails_are_looked_up_and_usernames_passed_through() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/1.1/users/")
                .query_param("q", "joe@example.com");
            then.status(200).json_body(json!([{"id": 3}]));
        });
        let ctx = test_context(&server.url("/api/1.1"), &[("pw.project", "demo")]);

        let params = user_filters(
            &ctx,
            "delegate",
            &["joe@example.com".to_string(), "maintainer".to_string()],
        )
        .await
        .expect("users");
        assert_eq!(
            params,
            vec![filter("delegate", 3), filter("delegate", "maintainer")]
        );
        mock.assert();
    }

    #[tokio::test]
    async fn old_servers_look_up_usernames() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/users/").query_param("q", "maintainer");
            then.status(200).json_body(json!([{"id": 8}]));
        });
        let ctx = test_context(&server.url("/api"), &[("pw.project", "demo")]);

        let params = user_filters(&ctx, "owner", &["maintainer".to_string()])
            .await
            .expect("users");
        assert_eq!(params, vec![filter("owner", 8)]);
        mock.assert();
    }
}
