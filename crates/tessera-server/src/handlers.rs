//! Tessera Request Handlers
//!
//! HTTP handlers for the JSON:API surface. Each handler compiles the query
//! parameters, loads content through the store, and hands the document
//! builder or the denormalizer everything they need for one request.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::state::{account_from_headers, AppState};
use axum::{
    body::{Body, Bytes},
    extract::{OriginalUri, Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tessera_common::{Cacheability, Result, TesseraError};
use tessera_normalizer::{entry_point, DocumentNode, LinkProvider, Primary, Rasterize, RelationshipOp};
use tessera_query::{IncludeTree, MemoryQuery, QueryEngine, QueryParams, SparseFieldsets};
use tessera_resource::{ContentItem, ResourceDescriptor};

/// Media type of every JSON:API request and response document.
pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

// =============================================================================
// Responses
// =============================================================================

/// A rendered JSON:API document with its status and cache headers.
pub struct JsonApiResponse {
    status: StatusCode,
    document: Option<DocumentNode>,
    location: Option<String>,
}

impl JsonApiResponse {
    pub fn ok(document: DocumentNode) -> Self {
        Self {
            status: StatusCode::OK,
            document: Some(document),
            location: None,
        }
    }

    pub fn created(document: DocumentNode, location: Option<String>) -> Self {
        Self {
            status: StatusCode::CREATED,
            document: Some(document),
            location,
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            document: None,
            location: None,
        }
    }
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn cache_headers(headers: &mut HeaderMap, cacheability: &Cacheability) {
    headers.insert(header::CACHE_CONTROL, header_value(&cacheability.max_age.cache_control()));
    headers.insert("x-cache-tags", header_value(&cacheability.tags_header()));
    headers.insert("x-cache-contexts", header_value(&cacheability.contexts_header()));
}

fn document_response(status: StatusCode, document: &DocumentNode) -> Response {
    let body = document.rasterize().to_string();
    let mut response = (status, Body::from(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSONAPI_MEDIA_TYPE));
    cache_headers(headers, document.cacheability());
    response
}

impl IntoResponse for JsonApiResponse {
    fn into_response(self) -> Response {
        let mut response = match &self.document {
            Some(document) => document_response(self.status, document),
            None => self.status.into_response(),
        };
        if let Some(location) = &self.location {
            response.headers_mut().insert(header::LOCATION, header_value(location));
        }
        response
    }
}

/// Request-level failure rendered as a JSON:API error document.
#[derive(Debug)]
pub struct ApiError(pub TesseraError);

impl From<TesseraError> for ApiError {
    fn from(error: TesseraError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_user_error() {
            tracing::debug!("Request rejected: {}", self.0);
        } else {
            tracing::error!("Request failed: {}", self.0);
        }
        let document = DocumentNode::from_error(&self.0);
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        document_response(status, &document)
    }
}

type ApiResult = std::result::Result<JsonApiResponse, ApiError>;

// =============================================================================
// Helpers
// =============================================================================

fn parse_body(body: &Bytes) -> Result<JsonValue> {
    serde_json::from_slice(body)
        .map_err(|e| TesseraError::Parse(format!("The request body is not valid JSON: {}", e)))
}

fn ensure_writable(state: &AppState) -> Result<()> {
    if state.config.api.read_only {
        return Err(TesseraError::MethodNotAllowed(
            "The API is configured as read-only.".to_string(),
        ));
    }
    Ok(())
}

/// Compile the query string against `descriptor`.
fn query_params(state: &AppState, descriptor: &Arc<ResourceDescriptor>, raw: Option<&str>) -> Result<QueryParams> {
    let mut params = QueryParams::parse(raw, &state.config.api)?;
    params.resolve(&state.registry, descriptor)?;
    Ok(params)
}

/// Include tree of a request on an individual resource or relationship.
fn individual_params(state: &AppState, descriptor: &Arc<ResourceDescriptor>, raw: Option<&str>) -> Result<(IncludeTree, SparseFieldsets)> {
    let params = query_params(state, descriptor, raw)?;
    Ok((params.include, params.fields))
}

/// A related document starts from the relationship's targets, so include
/// paths must be valid for at least one relatable type.
fn related_params(
    state: &AppState,
    descriptor: &ResourceDescriptor,
    field: &str,
    raw: Option<&str>,
) -> Result<(IncludeTree, SparseFieldsets)> {
    let params = QueryParams::parse(raw, &state.config.api)?;
    if !params.include.is_empty() {
        let mut outcome = Ok(());
        for target in state.registry.relatable(descriptor, field) {
            outcome = params.include.validate(&state.registry, &target);
            if outcome.is_ok() {
                break;
            }
        }
        outcome?;
    }
    Ok((params.include, params.fields))
}

fn finish(state: &AppState, document: DocumentNode, uri: &OriginalUri) -> DocumentNode {
    let path_and_query = uri.0.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let current = state.links.current(path_and_query);
    let defaults = Cacheability::new().with_max_age(state.config.api.default_max_age);
    let document = document.with_cacheability(&defaults);
    if document.link("self").is_some() {
        document
    } else {
        document.with_link("self", current)
    }
}

fn resource_document(
    state: &AppState,
    item: &ContentItem,
    include: &IncludeTree,
    fields: &SparseFieldsets,
    headers: &HeaderMap,
) -> Result<DocumentNode> {
    let account = account_from_headers(headers);
    state.builder(&account, fields).assemble(Primary::Single(item), include)
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub resource_types: usize,
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        resource_types: state.registry.len(),
    })
}

/// Not found handler.
pub async fn not_found(OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    ApiError(TesseraError::NotFound(format!("No route matches `{}`.", uri.path())))
}

// =============================================================================
// Read Endpoints
// =============================================================================

/// `GET /`: links to every collection.
pub async fn get_entry_point(State(state): State<AppState>, uri: OriginalUri) -> ApiResult {
    let document = entry_point(&state.registry, state.links.as_ref());
    Ok(JsonApiResponse::ok(finish(&state, document, &uri)))
}

/// `GET /<type>`: filtered, sorted, paged collection.
pub async fn get_collection(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    RawQuery(query): RawQuery,
    uri: OriginalUri,
    headers: HeaderMap,
) -> ApiResult {
    let descriptor = state.descriptor(&resource_type)?;
    let params = query_params(&state, &descriptor, query.as_deref())?;

    let mut engine = MemoryQuery::new(state.store.as_ref(), &state.registry, descriptor.clone());
    engine.apply_condition(&params.filter);
    engine.apply_sort(&params.sort);
    engine.apply_range(params.page.offset, params.page.query_limit());
    let window = params.page.split(engine.execute()?);
    let items = state.store.load_multiple(descriptor.entity_type(), &window.items)?;

    let account = account_from_headers(&headers);
    let document = state
        .builder(&account, &params.fields)
        .assemble(Primary::Collection(&items), &params.include)?
        .with_cacheability(&Cacheability::new().with_tag(descriptor.list_cache_tag()));

    let path_and_query = uri.0.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let current = state.links.current(path_and_query);
    let mut document = document.with_link("self", current.clone());
    if window.has_next {
        document = document.with_link("next", state.links.paged(&current, params.page.next()));
    }
    if let Some(prev) = params.page.prev() {
        document = document.with_link("prev", state.links.paged(&current, prev));
    }

    tracing::debug!(
        resource_type = %resource_type,
        count = items.len(),
        has_next = window.has_next,
        "served collection"
    );
    Ok(JsonApiResponse::ok(finish(&state, document, &uri)))
}

/// `GET /<type>/<id>`
pub async fn get_individual(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    uri: OriginalUri,
    headers: HeaderMap,
) -> ApiResult {
    let descriptor = state.descriptor(&resource_type)?;
    let (include, fields) = individual_params(&state, &descriptor, query.as_deref())?;
    let item = state.load_item(&descriptor, &id)?;
    let document = resource_document(&state, &item, &include, &fields, &headers)?;
    Ok(JsonApiResponse::ok(finish(&state, document, &uri)))
}

/// `GET /<type>/<id>/<field>`
pub async fn get_related(
    State(state): State<AppState>,
    Path((resource_type, id, field)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
    uri: OriginalUri,
    headers: HeaderMap,
) -> ApiResult {
    let descriptor = state.descriptor(&resource_type)?;
    let (include, fields) = related_params(&state, &descriptor, &field, query.as_deref())?;
    let item = state.load_item(&descriptor, &id)?;
    let account = account_from_headers(&headers);
    let document = state.builder(&account, &fields).related(&item, &field, &include)?;
    Ok(JsonApiResponse::ok(finish(&state, document, &uri)))
}

/// `GET /<type>/<id>/relationships/<field>`
pub async fn get_relationship(
    State(state): State<AppState>,
    Path((resource_type, id, field)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
    uri: OriginalUri,
    headers: HeaderMap,
) -> ApiResult {
    let descriptor = state.descriptor(&resource_type)?;
    let (include, fields) = individual_params(&state, &descriptor, query.as_deref())?;
    let item = state.load_item(&descriptor, &id)?;
    let account = account_from_headers(&headers);
    let document = state.builder(&account, &fields).relationship(&item, &field, &include)?;
    Ok(JsonApiResponse::ok(finish(&state, document, &uri)))
}

// =============================================================================
// Write Endpoints
// =============================================================================

/// `POST /<type>`
pub async fn create_resource(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    ensure_writable(&state)?;
    let descriptor = state.descriptor(&resource_type)?;
    let body = parse_body(&body)?;
    let account = account_from_headers(&headers);

    let item = state.denormalizer(&account).create(&descriptor, &body)?;
    let document = resource_document(&state, &item, &IncludeTree::new(), &SparseFieldsets::new(), &headers)?;
    let location = state.links.resource(descriptor.public_type(), &item.id).href;

    tracing::info!(resource_type = %resource_type, id = %item.id, "created resource");
    Ok(JsonApiResponse::created(finish(&state, document, &uri), Some(location)))
}

/// `PATCH /<type>/<id>`
pub async fn update_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    ensure_writable(&state)?;
    let descriptor = state.descriptor(&resource_type)?;
    let body = parse_body(&body)?;
    let existing = state.load_item(&descriptor, &id)?;
    let account = account_from_headers(&headers);

    let item = state.denormalizer(&account).update(&descriptor, &existing, &body)?;
    let document = resource_document(&state, &item, &IncludeTree::new(), &SparseFieldsets::new(), &headers)?;
    Ok(JsonApiResponse::ok(finish(&state, document, &uri)))
}

/// `DELETE /<type>/<id>`
pub async fn delete_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult {
    ensure_writable(&state)?;
    let descriptor = state.descriptor(&resource_type)?;
    let existing = state.load_item(&descriptor, &id)?;
    let account = account_from_headers(&headers);

    state.denormalizer(&account).delete(&descriptor, &existing)?;
    tracing::info!(resource_type = %resource_type, id = %id, "deleted resource");
    Ok(JsonApiResponse::no_content())
}

async fn mutate_relationship(
    op: RelationshipOp,
    state: AppState,
    (resource_type, id, field): (String, String, String),
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    ensure_writable(&state)?;
    let descriptor = state.descriptor(&resource_type)?;
    let body = parse_body(&body)?;
    let existing = state.load_item(&descriptor, &id)?;
    let account = account_from_headers(&headers);

    let outcome = state
        .denormalizer(&account)
        .mutate_relationship(op, &descriptor, &existing, &field, &body)?;
    if outcome.is_no_content() {
        return Ok(JsonApiResponse::no_content());
    }

    let fields = SparseFieldsets::new();
    let document = state
        .builder(&account, &fields)
        .relationship(&outcome.item, &field, &IncludeTree::new())?;
    Ok(JsonApiResponse::ok(finish(&state, document, &uri)))
}

/// `POST /<type>/<id>/relationships/<field>`
pub async fn add_relationship(
    State(state): State<AppState>,
    Path(path): Path<(String, String, String)>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    mutate_relationship(RelationshipOp::Add, state, path, uri, headers, body).await
}

/// `PATCH /<type>/<id>/relationships/<field>`
pub async fn replace_relationship(
    State(state): State<AppState>,
    Path(path): Path<(String, String, String)>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    mutate_relationship(RelationshipOp::Replace, state, path, uri, headers, body).await
}

/// `DELETE /<type>/<id>/relationships/<field>`
pub async fn remove_relationship(
    State(state): State<AppState>,
    Path(path): Path<(String, String, String)>,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    mutate_relationship(RelationshipOp::Remove, state, path, uri, headers, body).await
}
