// HTTP API: translates `/sites` requests into bounded cache lookups.

use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response, StatusCode, header};
use url::form_urlencoded;

use crate::orchestrator::BoundedQueryHandler;

pub type ApiResponse = Response<Full<Bytes>>;

const MISSING_SEARCH: &str = "Url Param 'search' is missing";

/// Entry point for every request accepted by the server.
pub async fn handle<B>(
    req: Request<B>,
    queries: BoundedQueryHandler,
) -> Result<ApiResponse, Infallible> {
    let response = match req.uri().path() {
        "/sites" => sites(req.uri().query(), &queries).await,
        _ => text(StatusCode::NOT_FOUND, "not found".to_string()),
    };
    Ok(response)
}

/// GET /sites?search=<term>: known concurrency of every site behind `term`.
async fn sites(query: Option<&str>, queries: &BoundedQueryHandler) -> ApiResponse {
    let Some(term) = search_param(query) else {
        return text(StatusCode::BAD_REQUEST, MISSING_SEARCH.to_string());
    };

    let snapshot = match queries.lookup(&term).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            log::warn!("Lookup for '{term}' failed: {e}");
            return text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    match serde_json::to_vec(&snapshot.sites) {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_else(|_| internal_error()),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// First non-empty `search` value of the query string.
fn search_param(query: Option<&str>) -> Option<String> {
    let query = query?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "search")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn text(status: StatusCode, body: String) -> ApiResponse {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| internal_error())
}

fn internal_error() -> ApiResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
