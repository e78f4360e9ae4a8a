//! Torznab indexer endpoint (`GET /indexer/amule/api`).
//!
//! Proxies search queries to the ed2k backend and renders the Torznab XML
//! document shape. Authenticated by API key (admin keys, or the dedicated
//! key from configuration); bypassed when authentication is disabled.

use axum::extract::{Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use quick_xml::escape::escape;
use serde::Deserialize;

use peerdeck_core::{SearchQuery, SearchResult};

use crate::error::ApiError;
use crate::state::SharedContext;

/// Attach the indexer endpoint to the primary router.
#[must_use]
pub(crate) fn mount(router: Router<SharedContext>) -> Router<SharedContext> {
    router.route("/indexer/amule/api", get(indexer))
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct TorznabParams {
    #[serde(default)]
    t: String,
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    apikey: Option<String>,
}

async fn authorize(ctx: &SharedContext, params: &TorznabParams) -> Result<(), ApiError> {
    if !ctx.auth.auth_enabled() {
        return Ok(());
    }
    let Some(supplied) = params.apikey.as_deref().filter(|key| !key.is_empty()) else {
        return Err(ApiError::unauthorized("missing apikey"));
    };
    if ctx
        .torznab_api_key
        .as_deref()
        .is_some_and(|configured| configured == supplied)
    {
        return Ok(());
    }
    ctx.auth.verify_api_key(supplied).await?;
    Ok(())
}

fn xml_response(body: String) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/xml; charset=utf-8"),
    );
    response
}

fn caps_document() -> String {
    concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<caps>\n",
        "  <server title=\"Peerdeck\"/>\n",
        "  <limits max=\"200\" default=\"100\"/>\n",
        "  <searching>\n",
        "    <search available=\"yes\" supportedParams=\"q\"/>\n",
        "    <tv-search available=\"no\" supportedParams=\"q\"/>\n",
        "    <movie-search available=\"no\" supportedParams=\"q\"/>\n",
        "  </searching>\n",
        "  <categories>\n",
        "    <category id=\"8000\" name=\"Other\"/>\n",
        "  </categories>\n",
        "</caps>\n"
    )
    .to_string()
}

fn search_document(results: &[SearchResult]) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <rss version=\"2.0\" xmlns:torznab=\"http://torznab.com/schemas/2015/feed\">\n\
         <channel>\n<title>Peerdeck ed2k</title>\n",
    );
    for result in results {
        let title = escape(result.name.as_str());
        let link = format!(
            "ed2k://|file|{}|{}|{}|/",
            title, result.size, result.hash
        );
        out.push_str("<item>\n");
        out.push_str(&format!("  <title>{title}</title>\n"));
        out.push_str(&format!("  <guid>{}</guid>\n", result.hash));
        out.push_str(&format!("  <size>{}</size>\n", result.size));
        out.push_str(&format!(
            "  <enclosure url=\"{link}\" length=\"{}\" type=\"application/x-ed2k\"/>\n",
            result.size
        ));
        out.push_str(&format!(
            "  <torznab:attr name=\"seeders\" value=\"{}\"/>\n",
            result.complete_sources
        ));
        out.push_str(&format!(
            "  <torznab:attr name=\"peers\" value=\"{}\"/>\n",
            result.sources
        ));
        out.push_str("</item>\n");
    }
    out.push_str("</channel>\n</rss>\n");
    out
}

async fn indexer(
    State(ctx): State<SharedContext>,
    Query(params): Query<TorznabParams>,
) -> Result<Response, ApiError> {
    authorize(&ctx, &params).await?;

    match params.t.as_str() {
        "caps" => Ok(xml_response(caps_document())),
        "search" | "tvsearch" | "movie" => {
            let Some((_, client)) = ctx.ed2k_instance().await else {
                return Ok(xml_response(search_document(&[])));
            };
            let text = params.q.unwrap_or_default();
            if text.is_empty() {
                return Ok(xml_response(search_document(&[])));
            }
            let results = client
                .adapter
                .search(&SearchQuery {
                    text,
                    ..SearchQuery::default()
                })
                .await
                .unwrap_or_default();
            Ok(xml_response(search_document(&results)))
        }
        other => Err(ApiError::bad_request(format!(
            "unsupported torznab function '{other}'"
        ))),
    }
}
